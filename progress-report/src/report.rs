//! Report Data Structures
//!
//! The persisted artifact. Its JSON shape is the only on-disk format and is
//! read back by later runs, so field names and nesting must stay stable.

use progress_ipc::{AlertRecord, Comparison};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Complete cumulative report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Machine that produced the latest run
    #[serde(default)]
    pub machine: MachineProfile,
    /// Labels of every metric ever recorded
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricInfo>,
    /// Results keyed by target id
    #[serde(default)]
    pub targets: BTreeMap<String, TargetResult>,
}

/// Static description of the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineProfile {
    /// URL-safe slug derived from `name`
    #[serde(default)]
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Ordered `[label, value]` pairs
    #[serde(default)]
    pub specs: Vec<[String; 2]>,
}

impl MachineProfile {
    /// Value of the first spec with `label`
    pub fn spec(&self, label: &str) -> Option<&str> {
        self.specs
            .iter()
            .find(|[l, _]| l == label)
            .map(|[_, value]| value.as_str())
    }
}

/// Metric metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricInfo {
    /// Human-readable label
    pub label: String,
}

/// Alert as persisted: `{"metric", "comparison", "value"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Metric id
    pub metric: String,
    /// Comparison operator
    pub comparison: Comparison,
    /// Threshold
    pub value: f64,
}

impl From<AlertRecord> for Alert {
    fn from(record: AlertRecord) -> Self {
        Self {
            metric: record.metric,
            comparison: record.comparison,
            value: record.threshold,
        }
    }
}

/// Result of one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetResult {
    /// Display name at the time of the run
    pub name: String,
    /// Source text of the benchmark
    #[serde(default)]
    pub code: String,
    /// Whether every sample of the last run succeeded
    pub working: bool,
    /// Mean per metric; absent when not working
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "skip_null_means"
    )]
    pub measurements: Option<BTreeMap<String, f64>>,
    /// Alerts declared by the last sample
    #[serde(default)]
    pub alerts: Vec<Alert>,
    /// Fields written by other tools; kept so untouched entries survive a merge
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Non-finite means were written as `null` by serde_json; they are dropped
/// on load so one bad value does not make the whole file unreadable.
fn skip_null_means<'de, D>(deserializer: D) -> Result<Option<BTreeMap<String, f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    let means: Option<BTreeMap<String, Option<f64>>> = Option::deserialize(deserializer)?;
    Ok(means.map(|means| {
        means
            .into_iter()
            .filter_map(|(id, mean)| mean.map(|mean| (id, mean)))
            .collect()
    }))
}

impl TargetResult {
    /// Result of a target whose samples all succeeded
    pub fn working(
        name: impl Into<String>,
        code: impl Into<String>,
        measurements: BTreeMap<String, f64>,
        alerts: Vec<Alert>,
    ) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            working: true,
            measurements: Some(measurements),
            alerts,
            extra: Map::new(),
        }
    }

    /// Result of a target with a failed sample
    pub fn not_working(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            working: false,
            measurements: None,
            alerts: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl Report {
    /// Replace the machine profile (a report reflects the last machine only)
    pub fn set_machine(&mut self, machine: MachineProfile) {
        self.machine = machine;
    }

    /// Insert or relabel a metric
    pub fn upsert_metric(&mut self, id: impl Into<String>, label: impl Into<String>) {
        self.metrics.insert(
            id.into(),
            MetricInfo {
                label: label.into(),
            },
        );
    }

    /// Replace the entry for `id` entirely, returning the previous one
    pub fn replace_target(
        &mut self,
        id: impl Into<String>,
        result: TargetResult,
    ) -> Option<TargetResult> {
        self.targets.insert(id.into(), result)
    }

    /// Label of a metric, if known
    pub fn label(&self, metric: &str) -> Option<&str> {
        self.metrics.get(metric).map(|m| m.label.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_not_working_omits_measurements() {
        let result = TargetResult::not_working("Broken", "fn main() {}");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({"name": "Broken", "code": "fn main() {}", "working": false, "alerts": []})
        );
    }

    #[test]
    fn test_alert_uses_persisted_key_names() {
        let alert = Alert::from(AlertRecord {
            metric: "error-percent".to_string(),
            comparison: Comparison::Gt,
            threshold: 5.0,
        });
        assert_eq!(
            serde_json::to_value(&alert).unwrap(),
            json!({"metric": "error-percent", "comparison": ">", "value": 5.0})
        );
    }

    #[test]
    fn test_legacy_document_parses() {
        // Older reports may hold an empty machine and entries without alerts
        let report: Report = serde_json::from_value(json!({
            "machine": {},
            "metrics": {"time-ms": {"label": "Time (ms)"}},
            "targets": {
                "old": {"name": "Old", "code": "", "working": false}
            }
        }))
        .unwrap();

        assert_eq!(report.machine, MachineProfile::default());
        assert!(report.targets["old"].alerts.is_empty());
        assert_eq!(report.label("time-ms"), Some("Time (ms)"));
    }

    #[test]
    fn test_unknown_target_fields_survive() {
        let original = json!({
            "name": "Old",
            "code": "",
            "working": true,
            "measurements": {"time-ms": 1.5},
            "alerts": [],
            "notes": "kept by another tool"
        });
        let result: TargetResult = serde_json::from_value(original.clone()).unwrap();
        assert_eq!(result.extra["notes"], json!("kept by another tool"));
        assert_eq!(serde_json::to_value(&result).unwrap(), original);
    }

    #[test]
    fn test_null_mean_is_dropped_on_load() {
        let result: TargetResult = serde_json::from_value(json!({
            "name": "Ratio",
            "code": "",
            "working": true,
            "measurements": {"ratio": null, "time-ms": 2.0},
            "alerts": []
        }))
        .unwrap();
        assert_eq!(
            result.measurements,
            Some(BTreeMap::from([("time-ms".to_string(), 2.0)]))
        );
        assert!(result.extra.is_empty());
    }

    #[test]
    fn test_replace_target_leaves_no_residue() {
        let mut report = Report::default();
        let mut old = TargetResult::working(
            "Old",
            "old code",
            BTreeMap::from([("time-ms".to_string(), 3.0)]),
            vec![],
        );
        old.extra.insert("notes".to_string(), json!("stale"));
        report.replace_target("t", old);

        let previous = report.replace_target("t", TargetResult::not_working("New", "new code"));
        assert!(previous.is_some());

        let current = &report.targets["t"];
        assert!(!current.working);
        assert!(current.measurements.is_none());
        assert!(current.extra.is_empty());
        assert_eq!(current.name, "New");
    }

    #[test]
    fn test_machine_spec_lookup() {
        let machine = MachineProfile {
            id: "workstation".to_string(),
            name: "Workstation".to_string(),
            specs: vec![
                ["CPU".to_string(), "Test CPU".to_string()],
                ["OS".to_string(), "Ubuntu".to_string()],
            ],
        };
        assert_eq!(machine.spec("OS"), Some("Ubuntu"));
        assert_eq!(machine.spec("vCPU"), None);
    }
}
