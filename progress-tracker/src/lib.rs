#![warn(missing_docs)]
//! # progress-tracker
//!
//! Runs benchmark targets repeatedly, averages what they record and keeps a
//! cumulative JSON report across runs.
//!
//! - **Process Isolation**: every sample runs in a fresh worker process, so a
//!   crashing target only marks itself "not working"
//! - **Scoped Timers**: [`Timer`] records elapsed milliseconds on drop, even
//!   on early return or panic
//! - **Alerts**: thresholds declared next to a metric are stored with the
//!   result for downstream tools
//! - **Cross-Run Merge**: targets not touched by a run keep their results;
//!   the report is saved after every target
//!
//! ## Quick Start
//!
//! ```ignore
//! use progress_tracker::prelude::*;
//!
//! fn sum(rec: &Recorder, params: &Parameters) -> anyhow::Result<()> {
//!     let n: u64 = params.get("n")?;
//!     let total = {
//!         let _timer = rec.time("time-ms", "Time (ms)");
//!         (0..n).sum::<u64>()
//!     };
//!     rec.record("total", "Total", total as f64);
//!     Ok(())
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     progress_tracker::run(
//!         Benchmark::new(sum)
//!             .code(include_str!("sum.rs"))
//!             .target(Target::new("sum-1m", "Sum of 1M").param("n", 1_000_000)),
//!     )
//! }
//! ```

// Re-export core types
pub use progress_core::{
    run_sample, AlertRecord, BenchFn, Benchmark, BenchmarkError, Comparison, FailureKind,
    MeasureError, Metric, ParameterError, Parameters, Recorder, SampleFailure, SampleOutcome,
    SampleRecord, Target, Timer, WorkerMain,
};

// Re-export report model
pub use progress_report::{
    Alert, MachineProfile, MetricInfo, Report, ReportError, ReportStore, TargetResult,
};

// Re-export the harness
pub use progress_cli::{
    build_profile, machine_id, run_targets, run_with_cli, select_targets, Cli, Commands,
    ConfigError, InProcessExecutor, IsolatedExecutor, IsolationMode, MachineOverrides,
    MachineProbe, ProgressConfig, SampleExecutor, Settings, SupervisorError, SystemProbe,
    TargetOutcome, Tracker,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{Benchmark, Comparison, Parameters, Recorder, Target};
}

/// Run the harness for `benchmark`.
///
/// Call this from your benchmark binary's `main()`:
/// ```ignore
/// fn main() -> anyhow::Result<()> {
///     progress_tracker::run(benchmark())
/// }
/// ```
pub use progress_cli::run;
