//! Tracker
//!
//! Drives the sampling loop for each target and folds the results into the
//! cumulative report.
//!
//! ```text
//! load report ─▶ replace machine ─▶ save
//!                                    │
//!        ┌───────────────────────────┘
//!        ▼
//!   for each target:
//!     sample 1..N ── failure ──▶ not working ─┐
//!        │                                    │
//!        ▼ all succeeded                      │
//!     means per metric ─▶ working ────────────┤
//!                                             ▼
//!                         replace entry, upsert labels, save
//! ```

use crate::executor::SampleExecutor;
use crate::formatting;
use progress_core::{AlertRecord, SampleFailure, SampleOutcome, SampleRecord, Target};
use progress_report::{Alert, MachineProfile, Report, ReportError, ReportStore, TargetResult};
use std::collections::BTreeMap;

/// Final state of one target
#[derive(Debug, Clone, PartialEq)]
pub enum TargetOutcome {
    /// Every sample completed
    Working {
        /// Target id
        id: String,
        /// Mean of every metric that recorded at least one value
        means: BTreeMap<String, f64>,
    },
    /// A sample failed and sampling stopped
    NotWorking {
        /// Target id
        id: String,
        /// 1-based index of the failed sample
        sample: u32,
        /// Why it failed
        failure: SampleFailure,
    },
}

impl TargetOutcome {
    /// Target id
    pub fn id(&self) -> &str {
        match self {
            TargetOutcome::Working { id, .. } | TargetOutcome::NotWorking { id, .. } => id,
        }
    }

    /// Whether the target ended up working
    pub fn is_working(&self) -> bool {
        matches!(self, TargetOutcome::Working { .. })
    }
}

/// Values gathered across the samples of one target
#[derive(Debug, Default)]
struct Accumulator {
    labels: BTreeMap<String, String>,
    /// First-recorded order, kept for display
    values: Vec<(String, Vec<f64>)>,
    alerts: Vec<AlertRecord>,
}

impl Accumulator {
    fn absorb(&mut self, record: SampleRecord) {
        for metric in record.metrics {
            self.labels.insert(metric.id, metric.label);
        }
        for series in record.measurements {
            match self.values.iter_mut().find(|(id, _)| *id == series.id) {
                Some((_, values)) => values.extend(series.values),
                None => self.values.push((series.id, series.values)),
            }
        }
        // Alerts reflect the latest sample only
        self.alerts = record.alerts;
    }

    fn means(&self) -> Vec<(String, f64)> {
        self.values
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(id, values)| (id.clone(), values.iter().sum::<f64>() / values.len() as f64))
            .collect()
    }
}

/// Runs targets and keeps the report on disk current
pub struct Tracker<E> {
    store: ReportStore,
    report: Report,
    executor: E,
    code: String,
    samples: u32,
    suite_samples: Option<u32>,
}

impl<E: SampleExecutor> Tracker<E> {
    /// Load the existing report, stamp it with `machine` and save it once
    pub fn new(
        store: ReportStore,
        machine: MachineProfile,
        executor: E,
        code: impl Into<String>,
        samples: u32,
    ) -> Result<Self, ReportError> {
        let mut report = store.load()?;
        report.set_machine(machine);
        store.save(&report)?;

        Ok(Self {
            store,
            report,
            executor,
            code: code.into(),
            samples,
            suite_samples: None,
        })
    }

    /// Sample count that beats the configured one but not a target's own
    pub fn with_suite_samples(mut self, samples: Option<u32>) -> Self {
        self.suite_samples = samples;
        self
    }

    /// Report as last saved
    pub fn report(&self) -> &Report {
        &self.report
    }

    /// Sample count used for `target`
    pub fn samples_for(&self, target: &Target) -> u32 {
        target
            .samples
            .or(self.suite_samples)
            .unwrap_or(self.samples)
    }

    /// Run `targets` in order, saving the report after each one
    pub fn run(&mut self, targets: &[Target]) -> Result<Vec<TargetOutcome>, ReportError> {
        let mut outcomes = Vec::with_capacity(targets.len());
        for target in targets {
            outcomes.push(self.run_target(target)?);
        }
        println!();
        Ok(outcomes)
    }

    fn run_target(&mut self, target: &Target) -> Result<TargetOutcome, ReportError> {
        let samples = self.samples_for(target);
        tracing::info!(target_id = %target.id, samples, "running target");

        let mut acc = Accumulator::default();
        let mut failed = None;

        for index in 1..=samples {
            println!("{}", formatting::sample_header(index, samples, &target.name));
            let outcome = self.executor.run_sample(target);
            match outcome {
                SampleOutcome::Completed(record) => acc.absorb(record),
                SampleOutcome::Failed(failure) => {
                    println!("{failure}");
                    tracing::warn!(
                        target_id = %target.id,
                        sample = index,
                        kind = %failure.kind,
                        "sample failed, target marked not working"
                    );
                    failed = Some((index, failure));
                }
            }
            println!("{}", formatting::sample_footer(index, samples, &target.name));
            if failed.is_some() {
                break;
            }
        }

        let outcome = match failed {
            Some((sample, failure)) => {
                self.report.replace_target(
                    target.id.clone(),
                    TargetResult::not_working(target.name.clone(), self.code.clone()),
                );
                println!("{}", formatting::not_working_summary(&target.name, samples));
                TargetOutcome::NotWorking {
                    id: target.id.clone(),
                    sample,
                    failure,
                }
            }
            None => {
                for (id, label) in &acc.labels {
                    self.report.upsert_metric(id.clone(), label.clone());
                }

                // JSON has no NaN or infinity; such a mean would be written as null
                let (means, non_finite): (Vec<_>, Vec<_>) = acc
                    .means()
                    .into_iter()
                    .partition(|(_, mean)| mean.is_finite());
                for (metric, mean) in &non_finite {
                    tracing::warn!(
                        target_id = %target.id,
                        metric = %metric,
                        mean = %mean,
                        "non-finite mean is not persisted"
                    );
                }

                let rows: Vec<(String, f64)> = means
                    .iter()
                    .map(|(id, mean)| {
                        let label = self.report.label(id).unwrap_or(id).to_string();
                        (label, *mean)
                    })
                    .collect();

                let means: BTreeMap<String, f64> = means.into_iter().collect();
                let alerts = acc.alerts.into_iter().map(Alert::from).collect();
                self.report.replace_target(
                    target.id.clone(),
                    TargetResult::working(
                        target.name.clone(),
                        self.code.clone(),
                        means.clone(),
                        alerts,
                    ),
                );
                println!("{}", formatting::working_summary(&target.name, samples, &rows));
                TargetOutcome::Working {
                    id: target.id.clone(),
                    means,
                }
            }
        };

        self.store.save(&self.report)?;
        tracing::info!(
            target_id = %target.id,
            working = outcome.is_working(),
            "target finished"
        );
        Ok(outcome)
    }
}
