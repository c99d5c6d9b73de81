//! Per-Sample Measurement Registry
//!
//! A [`Recorder`] is created fresh for every sample and handed to the target
//! function. It collects metric labels, recorded values and declared alerts,
//! and is turned into a [`SampleRecord`] once the sample completes.
//!
//! ```ignore
//! fn estimate(rec: &Recorder, params: &Parameters) -> anyhow::Result<()> {
//!     let samples: u32 = params.get("samples")?;
//!     let estimation = {
//!         let _timer = rec
//!             .metric("time-ms", "Time (ms)")
//!             .alert(">", f64::from(samples) * 0.001)?
//!             .time();
//!         estimate_pi(samples)
//!     };
//!     rec.record("estimation", "Estimation", estimation);
//!     Ok(())
//! }
//! ```

use crate::timer::Timer;
use progress_ipc::{
    AlertRecord, Comparison, MetricLabel, MetricValues, SampleRecord, UnknownComparison,
};
use std::cell::RefCell;
use thiserror::Error;

/// Errors raised while declaring a measurement
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeasureError {
    #[error("alert on `{metric}`: {source}")]
    UnknownComparison {
        metric: String,
        #[source]
        source: UnknownComparison,
    },

    #[error("alert on `{metric}`: threshold must be a finite number, got {threshold}")]
    InvalidThreshold { metric: String, threshold: f64 },
}

#[derive(Debug, Default)]
struct RecorderState {
    metrics: Vec<MetricLabel>,
    measurements: Vec<MetricValues>,
    alerts: Vec<AlertRecord>,
}

impl RecorderState {
    fn register(&mut self, id: &str, label: &str) {
        match self.metrics.iter_mut().find(|m| m.id == id) {
            Some(existing) => existing.label = label.to_string(),
            None => self.metrics.push(MetricLabel {
                id: id.to_string(),
                label: label.to_string(),
            }),
        }
        self.values_mut(id);
    }

    fn values_mut(&mut self, id: &str) -> &mut Vec<f64> {
        let index = match self.measurements.iter().position(|m| m.id == id) {
            Some(index) => index,
            None => {
                self.measurements.push(MetricValues {
                    id: id.to_string(),
                    values: Vec::new(),
                });
                self.measurements.len() - 1
            }
        };
        &mut self.measurements[index].values
    }
}

/// Measurement registry for one sample
#[derive(Debug, Default)]
pub struct Recorder {
    state: RefCell<RecorderState>,
}

impl Recorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `label` to metric `id` (last write wins) and return a handle for
    /// recording values, timing a scope or declaring alerts.
    pub fn metric(&self, id: &str, label: &str) -> Metric<'_> {
        self.state.borrow_mut().register(id, label);
        Metric {
            recorder: self,
            id: id.to_string(),
        }
    }

    /// Record one instantaneous value
    pub fn record(&self, id: &str, label: &str, value: impl Into<f64>) {
        self.metric(id, label).value(value);
    }

    /// Start a scoped timer recording milliseconds into `id`
    pub fn time(&self, id: &str, label: &str) -> Timer<'_> {
        self.metric(id, label).time()
    }

    /// Consume the recorder and produce the sample record
    pub fn into_record(self) -> SampleRecord {
        let state = self.state.into_inner();
        SampleRecord {
            metrics: state.metrics,
            measurements: state.measurements,
            alerts: state.alerts,
        }
    }

    pub(crate) fn push_value(&self, id: &str, value: f64) {
        self.state.borrow_mut().values_mut(id).push(value);
    }

    fn push_alert(&self, alert: AlertRecord) {
        self.state.borrow_mut().alerts.push(alert);
    }
}

/// Handle to a registered metric
#[derive(Debug)]
pub struct Metric<'r> {
    recorder: &'r Recorder,
    id: String,
}

impl<'r> Metric<'r> {
    /// Declare an alert threshold on this metric.
    ///
    /// `comparison` must be one of `==, !=, <=, >=, <, >`; integer thresholds
    /// are promoted to `f64`.
    pub fn alert(self, comparison: &str, threshold: impl Into<f64>) -> Result<Self, MeasureError> {
        let alert = self.validate(comparison, threshold.into())?;
        self.recorder.push_alert(alert);
        Ok(self)
    }

    /// Declare several alerts; each is validated and appended in order.
    pub fn alerts<I, S, T>(mut self, alerts: I) -> Result<Self, MeasureError>
    where
        I: IntoIterator<Item = (S, T)>,
        S: AsRef<str>,
        T: Into<f64>,
    {
        for (comparison, threshold) in alerts {
            self = self.alert(comparison.as_ref(), threshold)?;
        }
        Ok(self)
    }

    /// Declare an alert with an already-typed comparison
    pub fn alert_on(self, comparison: Comparison, threshold: impl Into<f64>) -> Result<Self, MeasureError> {
        self.alert(comparison.as_str(), threshold)
    }

    /// Append one value
    pub fn value(self, value: impl Into<f64>) {
        self.recorder.push_value(&self.id, value.into());
    }

    /// Time the enclosing scope
    pub fn time(self) -> Timer<'r> {
        Timer::start(self.recorder, self.id)
    }

    fn validate(&self, comparison: &str, threshold: f64) -> Result<AlertRecord, MeasureError> {
        let comparison = comparison
            .parse::<Comparison>()
            .map_err(|source| MeasureError::UnknownComparison {
                metric: self.id.clone(),
                source,
            })?;

        // JSON cannot carry NaN or infinities
        if !threshold.is_finite() {
            return Err(MeasureError::InvalidThreshold {
                metric: self.id.clone(),
                threshold,
            });
        }

        Ok(AlertRecord {
            metric: self.id.clone(),
            comparison,
            threshold,
        })
    }
}
