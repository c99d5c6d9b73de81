//! Single-Sample Execution
//!
//! Runs the bench function once against a fresh [`Recorder`], containing
//! both error returns and panics. Used directly by the in-process executor
//! and by the worker process for isolated execution.

use crate::recorder::Recorder;
use crate::target::{BenchFn, Parameters};
use progress_ipc::{FailureKind, SampleRecord};
use std::any::Any;
use std::fmt;

/// Why a sample did not complete
#[derive(Debug, Clone, PartialEq)]
pub struct SampleFailure {
    /// Failure category
    pub kind: FailureKind,
    /// Human-readable message
    pub message: String,
}

impl SampleFailure {
    /// Build a failure
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for SampleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result of one sample
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// The bench function returned `Ok`
    Completed(SampleRecord),
    /// The bench function failed; nothing it recorded is kept
    Failed(SampleFailure),
}

impl SampleOutcome {
    /// Whether the sample completed
    pub fn is_completed(&self) -> bool {
        matches!(self, SampleOutcome::Completed(_))
    }
}

/// Run `bench` once with `parameters`
pub fn run_sample(bench: BenchFn, parameters: &Parameters) -> SampleOutcome {
    let recorder = Recorder::new();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        bench(&recorder, parameters)
    }));

    match result {
        Ok(Ok(())) => SampleOutcome::Completed(recorder.into_record()),
        Ok(Err(error)) => {
            tracing::debug!(error = %error, "sample returned an error");
            SampleOutcome::Failed(SampleFailure::new(FailureKind::Error, format!("{error:#}")))
        }
        Err(panic) => SampleOutcome::Failed(SampleFailure::new(
            FailureKind::Panic,
            panic_message(panic.as_ref()),
        )),
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
