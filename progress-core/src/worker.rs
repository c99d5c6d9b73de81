//! Worker Process Entry Point
//!
//! Handles the worker side of sample isolation. The tracker re-executes the
//! benchmark binary with `--progress-worker`; the worker announces itself,
//! runs every `Run` command it receives as one sample and reports the sample
//! record (or the failure) back before exiting.
//!
//! On Unix the channel is fd 3/4 (set via `PROGRESS_IPC_FD`) so the bench
//! function keeps stdout/stderr for its own output. Without the variable the
//! worker falls back to stdin/stdout.

use crate::sample::{run_sample, SampleOutcome};
use crate::target::{BenchFn, Parameters};
use progress_ipc::{
    FailureKind, FrameError, FrameReader, FrameWriter, SupervisorCommand, WorkerHello,
    WorkerMessage, IPC_FD_ENV,
};
use thiserror::Error;

#[cfg(unix)]
use std::os::unix::io::FromRawFd;

/// Errors that end the worker loop abnormally
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("IPC error: {0}")]
    Ipc(#[from] FrameError),
}

/// How the worker loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Every sample completed
    Clean,
    /// At least one sample failed
    SampleFailed,
}

impl WorkerExit {
    /// Process exit code the worker should terminate with
    pub fn code(self) -> i32 {
        match self {
            WorkerExit::Clean => 0,
            WorkerExit::SampleFailed => 1,
        }
    }
}

/// IPC transport: either inherited fd pair or stdin/stdout fallback.
enum IpcTransport {
    #[cfg(unix)]
    Fds { read_fd: i32, write_fd: i32 },
    Stdio,
}

fn detect_transport() -> IpcTransport {
    #[cfg(unix)]
    if let Ok(val) = std::env::var(IPC_FD_ENV) {
        let parts: Vec<&str> = val.split(',').collect();
        if parts.len() == 2 {
            if let (Ok(r), Ok(w)) = (parts[0].parse::<i32>(), parts[1].parse::<i32>()) {
                return IpcTransport::Fds {
                    read_fd: r,
                    write_fd: w,
                };
            }
        }
        tracing::warn!(
            value = %val,
            "invalid {IPC_FD_ENV} (expected <read_fd>,<write_fd>), falling back to stdio"
        );
    }
    IpcTransport::Stdio
}

/// Worker main loop
pub struct WorkerMain {
    bench: BenchFn,
    reader: FrameReader<Box<dyn std::io::Read>>,
    writer: FrameWriter<Box<dyn std::io::Write>>,
}

impl WorkerMain {
    /// Create a worker for `bench` on the transport chosen by the supervisor
    pub fn new(bench: BenchFn) -> Self {
        match detect_transport() {
            #[cfg(unix)]
            IpcTransport::Fds { read_fd, write_fd } => {
                // SAFETY: the supervisor dup'ed these descriptors into this
                // process for exclusive use by the worker channel.
                let read_file = unsafe { std::fs::File::from_raw_fd(read_fd) };
                let write_file = unsafe { std::fs::File::from_raw_fd(write_fd) };
                Self::with_channel(bench, Box::new(read_file), Box::new(write_file))
            }
            IpcTransport::Stdio => Self::with_channel(
                bench,
                Box::new(std::io::stdin()),
                Box::new(std::io::stdout()),
            ),
        }
    }

    /// Create a worker over an explicit channel
    pub fn with_channel(
        bench: BenchFn,
        reader: Box<dyn std::io::Read>,
        writer: Box<dyn std::io::Write>,
    ) -> Self {
        Self {
            bench,
            reader: FrameReader::new(reader),
            writer: FrameWriter::new(writer),
        }
    }

    /// Serve commands until `Shutdown` or the supervisor closes the channel
    pub fn run(&mut self) -> Result<WorkerExit, WorkerError> {
        self.writer.write(&WorkerMessage::Hello(WorkerHello::default()))?;

        let mut exit = WorkerExit::Clean;
        loop {
            let command: SupervisorCommand = match self.reader.read() {
                Ok(command) => command,
                Err(FrameError::EndOfStream) => break,
                Err(e) => return Err(e.into()),
            };

            match command {
                SupervisorCommand::Run {
                    target_id,
                    parameters_json,
                } => {
                    if !self.run_one(&target_id, &parameters_json)? {
                        exit = WorkerExit::SampleFailed;
                    }
                }
                SupervisorCommand::Shutdown => break,
            }
        }

        Ok(exit)
    }

    /// Run one sample and report it; returns whether it completed
    fn run_one(&mut self, target_id: &str, parameters_json: &str) -> Result<bool, WorkerError> {
        let parameters = match Parameters::from_json(parameters_json) {
            Ok(parameters) => parameters,
            Err(e) => {
                self.writer.write(&WorkerMessage::Failure {
                    kind: FailureKind::InvalidParameters,
                    message: format!("{target_id}: {e}"),
                })?;
                return Ok(false);
            }
        };

        tracing::debug!(target_id, pid = std::process::id(), "worker running sample");

        match run_sample(self.bench, &parameters) {
            SampleOutcome::Completed(record) => {
                self.writer.write(&WorkerMessage::SampleComplete(record))?;
                Ok(true)
            }
            SampleOutcome::Failed(failure) => {
                self.writer.write(&WorkerMessage::Failure {
                    kind: failure.kind,
                    message: failure.message,
                })?;
                Ok(false)
            }
        }
    }
}
