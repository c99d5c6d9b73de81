//! Integration tests for progress-tracker
//!
//! End-to-end runs in-process against a report in a temporary directory.

use progress_tracker::{
    run_targets, Benchmark, InProcessExecutor, IsolationMode, MachineOverrides, MachineProfile,
    Parameters, Recorder, ReportStore, Settings, Target, TargetOutcome, Tracker,
};
use rand::Rng;
use serde_json::{json, Value};
use std::f64::consts::PI;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

const CODE: &str = "// bench source";

fn estimate_pi(points: u64) -> f64 {
    let mut rng = rand::thread_rng();
    let inside = (0..points)
        .filter(|_| {
            let x: f64 = rng.gen_range(-1.0..=1.0);
            let y: f64 = rng.gen_range(-1.0..=1.0);
            x * x + y * y <= 1.0
        })
        .count();
    4.0 * inside as f64 / points as f64
}

fn monte_carlo(rec: &Recorder, params: &Parameters) -> anyhow::Result<()> {
    let points: u64 = params.get("samples")?;

    let estimation = {
        let _timer = rec.time("time-ms", "Time (ms)");
        estimate_pi(points)
    };
    rec.record("estimation", "Estimation", estimation);

    let error_percent = (estimation - PI).abs() / PI * 100.0;
    rec.metric("error-percent", "Error (%)")
        .alert(">", 5)?
        .value(error_percent);
    Ok(())
}

fn mixed(rec: &Recorder, params: &Parameters) -> anyhow::Result<()> {
    match params.get::<String>("mode")?.as_str() {
        "fail" => anyhow::bail!("always fails"),
        "panic" => panic!("always panics"),
        _ => {
            rec.record("value", "Value", params.get::<f64>("value")?);
            Ok(())
        }
    }
}

fn settings(output: &Path) -> Settings {
    Settings {
        samples: 3,
        output: output.to_path_buf(),
        output_indent: Some(2),
        machine: MachineOverrides {
            name: Some("Workstation".to_string()),
            os: Some("Ubuntu".to_string()),
            vcpu: Some("4".to_string()),
        },
        isolation: IsolationMode::InProcess,
        ..Settings::default()
    }
}

fn read_report(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn machine() -> MachineProfile {
    MachineProfile {
        id: "workstation".to_string(),
        name: "Workstation".to_string(),
        specs: vec![],
    }
}

#[test]
fn test_monte_carlo_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("progress.json");
    let benchmark = Benchmark::new(monte_carlo)
        .code(CODE)
        .target(
            Target::new(
                "monte-carlo-pi-1000-samples",
                "Estimating π with Monte Carlo (1000 samples)",
            )
            .param("samples", 1000),
        );

    let outcomes = run_targets(&benchmark, &settings(&output), benchmark.target_list()).unwrap();
    assert!(outcomes[0].is_working());

    let report = read_report(&output);

    let machine = &report["machine"];
    assert_eq!(machine["id"], json!("workstation"));
    assert_eq!(machine["name"], json!("Workstation"));
    let specs = machine["specs"].as_array().unwrap();
    assert_eq!(specs.len(), 4);
    assert!(specs.contains(&json!(["vCPU", "4"])));
    assert!(specs.contains(&json!(["OS", "Ubuntu"])));

    assert_eq!(report["metrics"]["time-ms"], json!({"label": "Time (ms)"}));
    assert_eq!(report["metrics"]["estimation"], json!({"label": "Estimation"}));
    assert_eq!(report["metrics"]["error-percent"], json!({"label": "Error (%)"}));

    let target = &report["targets"]["monte-carlo-pi-1000-samples"];
    assert_eq!(target["working"], json!(true));
    assert_eq!(target["code"], json!(CODE));
    let measurements = target["measurements"].as_object().unwrap();
    for key in ["time-ms", "estimation", "error-percent"] {
        assert!(measurements[key].is_number(), "missing {key}");
    }
    let estimation = measurements["estimation"].as_f64().unwrap();
    assert!((2.0..=4.0).contains(&estimation));

    // Declared once per sample; only the last sample's declaration survives
    assert_eq!(
        target["alerts"],
        json!([{"metric": "error-percent", "comparison": ">", "value": 5.0}])
    );
}

#[test]
fn test_failing_target_does_not_stop_later_targets() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("progress.json");
    let benchmark = Benchmark::new(mixed).code(CODE).targets([
        Target::new("errors", "Errors").param("mode", "fail"),
        Target::new("panics", "Panics").param("mode", "panic"),
        Target::new("fine", "Fine").param("mode", "ok").param("value", 2.5),
    ]);

    let outcomes = run_targets(&benchmark, &settings(&output), benchmark.target_list()).unwrap();
    let working: Vec<bool> = outcomes.iter().map(TargetOutcome::is_working).collect();
    assert_eq!(working, [false, false, true]);

    let report = read_report(&output);
    for id in ["errors", "panics"] {
        let entry = report["targets"][id].as_object().unwrap();
        assert_eq!(entry["working"], json!(false));
        assert!(!entry.contains_key("measurements"));
    }
    assert_eq!(report["targets"]["fine"]["measurements"], json!({"value": 2.5}));
}

#[test]
fn test_rerun_preserves_untouched_targets() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("progress.json");
    let benchmark = Benchmark::new(mixed).code(CODE).targets([
        Target::new("a", "A").param("mode", "ok").param("value", 1),
        Target::new("b", "B").param("mode", "ok").param("value", 2),
    ]);

    let store = || ReportStore::new(&output, None);
    let executor = InProcessExecutor::new(benchmark.bench_fn());

    let mut first = Tracker::new(store(), machine(), executor, CODE, 1).unwrap();
    first.run(benchmark.target_list()).unwrap();

    // Second run only touches `b`, which now fails
    let rerun = [Target::new("b", "B v2").param("mode", "fail")];
    let mut second = Tracker::new(store(), machine(), executor, "// new source", 1).unwrap();
    second.run(&rerun).unwrap();

    let report = read_report(&output);
    assert_eq!(report["targets"]["a"]["measurements"], json!({"value": 1.0}));
    assert_eq!(report["targets"]["a"]["code"], json!(CODE));
    assert_eq!(
        report["targets"]["b"],
        json!({"name": "B v2", "code": "// new source", "working": false, "alerts": []})
    );
    assert_eq!(report["metrics"]["value"], json!({"label": "Value"}));
}

#[test]
fn test_corrupt_report_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("progress.json");
    std::fs::write(&output, "{ definitely not json").unwrap();

    let executor = InProcessExecutor::new(mixed);
    let mut tracker =
        Tracker::new(ReportStore::new(&output, None), machine(), executor, CODE, 2).unwrap();
    tracker
        .run(&[Target::new("fine", "Fine").param("mode", "ok").param("value", 4)])
        .unwrap();

    let report = read_report(&output);
    assert_eq!(report["machine"]["id"], json!("workstation"));
    assert_eq!(report["targets"]["fine"]["measurements"], json!({"value": 4.0}));
}

#[test]
fn test_suite_sample_override() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("progress.json");

    static CALLS: AtomicU32 = AtomicU32::new(0);

    fn counting(rec: &Recorder, _: &Parameters) -> anyhow::Result<()> {
        CALLS.fetch_add(1, Ordering::SeqCst);
        rec.record("one", "One", 1);
        Ok(())
    }

    let benchmark = Benchmark::new(counting).samples(2).targets([
        Target::new("suite", "Suite"),
        Target::new("own", "Own").samples(4),
    ]);

    let outcomes = run_targets(&benchmark, &settings(&output), benchmark.target_list()).unwrap();
    assert!(outcomes.iter().all(TargetOutcome::is_working));
    // Suite override beats the configured 3; the target's own 4 beats both
    assert_eq!(CALLS.load(Ordering::SeqCst), 2 + 4);
    let report = read_report(&output);
    assert_eq!(report["targets"]["suite"]["measurements"]["one"], json!(1.0));
    assert_eq!(report["targets"]["own"]["measurements"]["one"], json!(1.0));
}
