//! Sample Executors
//!
//! One executor call runs one sample of a target and returns what it
//! recorded, or why it did not complete.
//!
//! - **In-process (`InProcessExecutor`)**: calls the bench function directly,
//!   containing panics and errors. A crash (abort, segfault) takes the whole
//!   run down. Useful while developing a benchmark.
//!
//! - **Isolated (`IsolatedExecutor`)**: spawns a fresh worker process per
//!   sample, so no state leaks between samples and a crash only fails the
//!   sample. The default.

use crate::supervisor::{SupervisorError, WorkerHandle, WorkerReply};
use progress_core::{run_sample, BenchFn, FailureKind, SampleFailure, SampleOutcome, Target};
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

/// Runs single samples of a target
pub trait SampleExecutor {
    /// Execute one sample of `target`
    fn run_sample(&mut self, target: &Target) -> SampleOutcome;
}

/// Runs samples inside the harness process
#[derive(Debug, Clone, Copy)]
pub struct InProcessExecutor {
    bench: BenchFn,
}

impl InProcessExecutor {
    /// Executor for `bench`
    pub fn new(bench: BenchFn) -> Self {
        Self { bench }
    }
}

impl SampleExecutor for InProcessExecutor {
    fn run_sample(&mut self, target: &Target) -> SampleOutcome {
        run_sample(self.bench, &target.parameters)
    }
}

/// Runs every sample in its own worker process
#[derive(Debug, Clone)]
pub struct IsolatedExecutor {
    binary: PathBuf,
    timeout: Option<Duration>,
}

impl IsolatedExecutor {
    /// Workers re-execute the running binary
    pub fn current(timeout: Option<Duration>) -> Result<Self, SupervisorError> {
        Ok(Self::with_binary(std::env::current_exe()?, timeout))
    }

    /// Workers run `binary`, which must dispatch the worker flag
    pub fn with_binary(binary: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}

impl SampleExecutor for IsolatedExecutor {
    fn run_sample(&mut self, target: &Target) -> SampleOutcome {
        let mut worker = match WorkerHandle::spawn_binary(&self.binary, self.timeout) {
            Ok(worker) => worker,
            Err(e) => return SampleOutcome::Failed(supervisor_failure(e)),
        };

        let reply = worker.run_sample(target);
        let status = worker.shutdown();
        tracing::debug!(target_id = %target.id, pid = worker.hello().pid, ?status, "worker finished");
        settle(reply, status)
    }
}

/// Combine the worker's reply with how the process ended.
///
/// A sample only completes if the worker both sent its record and exited
/// successfully.
fn settle(
    reply: Result<WorkerReply, SupervisorError>,
    status: Result<ExitStatus, SupervisorError>,
) -> SampleOutcome {
    match (reply, status) {
        (Ok(WorkerReply::Completed(record)), Ok(status)) if status.success() => {
            SampleOutcome::Completed(record)
        }
        (Ok(WorkerReply::Completed(_)), Ok(status)) => SampleOutcome::Failed(SampleFailure::new(
            FailureKind::Crash,
            format!("worker sent a result but then failed ({status})"),
        )),
        (Ok(WorkerReply::Completed(_)), Err(e)) => SampleOutcome::Failed(supervisor_failure(e)),
        (Ok(WorkerReply::Failed { kind, message }), _) => {
            SampleOutcome::Failed(SampleFailure::new(kind, message))
        }
        (Err(e @ SupervisorError::Timeout(_)), _) => SampleOutcome::Failed(supervisor_failure(e)),
        (Err(e), Ok(status)) if !status.success() => SampleOutcome::Failed(SampleFailure::new(
            FailureKind::Crash,
            format!("{e} ({status})"),
        )),
        (Err(e), _) => SampleOutcome::Failed(supervisor_failure(e)),
    }
}

fn supervisor_failure(error: SupervisorError) -> SampleFailure {
    let kind = match error {
        SupervisorError::Timeout(_) => FailureKind::Timeout,
        _ => FailureKind::Crash,
    };
    SampleFailure::new(kind, error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::{Parameters, Recorder, SampleRecord};
    use std::os::unix::process::ExitStatusExt;

    fn exit(code: i32) -> ExitStatus {
        ExitStatus::from_raw(code << 8)
    }

    fn record() -> SampleRecord {
        let recorder = Recorder::new();
        recorder.record("value", "Value", 1.0);
        recorder.into_record()
    }

    #[test]
    fn test_in_process_executor_runs_bench() {
        fn bench(rec: &Recorder, params: &Parameters) -> anyhow::Result<()> {
            let n: u32 = params.get("n")?;
            rec.record("n", "N", n);
            Ok(())
        }

        let mut executor = InProcessExecutor::new(bench);
        let outcome = executor.run_sample(&Target::new("t", "T").param("n", 4));
        match outcome {
            SampleOutcome::Completed(record) => assert_eq!(record.measurements[0].values, vec![4.0]),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_in_process_executor_contains_panic() {
        fn bench(_: &Recorder, _: &Parameters) -> anyhow::Result<()> {
            panic!("boom");
        }

        let mut executor = InProcessExecutor::new(bench);
        match executor.run_sample(&Target::new("t", "T")) {
            SampleOutcome::Failed(failure) => assert_eq!(failure.kind, FailureKind::Panic),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_settle_success_needs_clean_exit() {
        let outcome = settle(Ok(WorkerReply::Completed(record())), Ok(exit(0)));
        assert!(outcome.is_completed());

        let outcome = settle(Ok(WorkerReply::Completed(record())), Ok(exit(3)));
        match outcome {
            SampleOutcome::Failed(failure) => assert_eq!(failure.kind, FailureKind::Crash),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_settle_keeps_reported_failure() {
        let outcome = settle(
            Ok(WorkerReply::Failed {
                kind: FailureKind::Error,
                message: "bad input".to_string(),
            }),
            Ok(exit(1)),
        );
        assert_eq!(
            outcome,
            SampleOutcome::Failed(SampleFailure::new(FailureKind::Error, "bad input"))
        );
    }

    #[test]
    fn test_settle_signal_death_is_crash() {
        let killed = ExitStatus::from_raw(libc::SIGSEGV);
        let outcome = settle(
            Err(SupervisorError::Crashed("worker closed its channel".to_string())),
            Ok(killed),
        );
        match outcome {
            SampleOutcome::Failed(failure) => {
                assert_eq!(failure.kind, FailureKind::Crash);
                assert!(failure.message.contains("signal"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_settle_timeout_wins_over_kill_signal() {
        let outcome = settle(
            Err(SupervisorError::Timeout(Duration::from_secs(1))),
            Ok(ExitStatus::from_raw(libc::SIGKILL)),
        );
        match outcome {
            SampleOutcome::Failed(failure) => assert_eq!(failure.kind, FailureKind::Timeout),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_isolated_spawn_failure_is_sample_failure() {
        let mut executor = IsolatedExecutor::with_binary("/nonexistent/worker", None);
        assert!(!executor.run_sample(&Target::new("t", "T")).is_completed());
    }
}
