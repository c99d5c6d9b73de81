#![warn(missing_docs)]
//! Progress Tracker IPC Protocol
//!
//! Binary protocol between the tracker (supervisor) and the short-lived
//! worker processes that each run one sample of a target. Uses rkyv framed
//! messages over inherited pipes.

mod framing;
mod messages;

pub use framing::{FrameError, FrameReader, FrameWriter, MAX_FRAME_LEN};
pub use messages::{
    AlertRecord, Comparison, FailureKind, MetricLabel, MetricValues, SampleRecord,
    SupervisorCommand, UnknownComparison, WorkerHello, WorkerMessage,
};

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u32 = 1;

/// Environment variable carrying the inherited `<read_fd>,<write_fd>` pair
pub const IPC_FD_ENV: &str = "PROGRESS_IPC_FD";

/// Hidden command line flag that turns a harness binary into a worker
pub const WORKER_FLAG: &str = "--progress-worker";
