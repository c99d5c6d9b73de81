#![warn(missing_docs)]
//! Progress Tracker Core - Worker Runtime
//!
//! This crate provides what runs inside a sample:
//! - [`Recorder`], the per-sample measurement registry handed to the bench function
//! - [`Metric`] handles for values and alert declarations
//! - [`Timer`], a scope guard recording elapsed milliseconds
//! - [`Target`] / [`Benchmark`] declarations
//! - [`run_sample`] with panic containment, and the [`WorkerMain`] loop

mod recorder;
mod sample;
mod target;
mod timer;
mod worker;

pub use recorder::{MeasureError, Metric, Recorder};
pub use sample::{run_sample, SampleFailure, SampleOutcome};
pub use target::{BenchFn, Benchmark, BenchmarkError, ParameterError, Parameters, Target};
pub use timer::Timer;
pub use worker::{WorkerError, WorkerExit, WorkerMain};

pub use progress_ipc::{AlertRecord, Comparison, FailureKind, SampleRecord};
