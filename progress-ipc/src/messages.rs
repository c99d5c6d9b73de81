//! IPC Message Types
//!
//! Everything that crosses the tracker/worker boundary. All messages are
//! rkyv archives validated on read.

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Comparison operator of an alert threshold.
///
/// Serialized (JSON and display) as the operator text.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Archive,
    RkyvSerialize,
    RkyvDeserialize,
    Serialize,
    Deserialize,
)]
#[archive(check_bytes)]
pub enum Comparison {
    /// `==`
    #[serde(rename = "==")]
    Eq,
    /// `!=`
    #[serde(rename = "!=")]
    Ne,
    /// `<=`
    #[serde(rename = "<=")]
    Le,
    /// `>=`
    #[serde(rename = ">=")]
    Ge,
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `>`
    #[serde(rename = ">")]
    Gt,
}

impl Comparison {
    /// All recognized operators, in declaration order
    pub const ALL: [Comparison; 6] = [
        Comparison::Eq,
        Comparison::Ne,
        Comparison::Le,
        Comparison::Ge,
        Comparison::Lt,
        Comparison::Gt,
    ];

    /// Operator text
    pub fn as_str(self) -> &'static str {
        match self {
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
            Comparison::Le => "<=",
            Comparison::Ge => ">=",
            Comparison::Lt => "<",
            Comparison::Gt => ">",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator text that is not one of `==, !=, <=, >=, <, >`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown comparison `{0}` (expected one of ==, !=, <=, >=, <, >)")]
pub struct UnknownComparison(pub String);

impl FromStr for Comparison {
    type Err = UnknownComparison;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Comparison::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownComparison(s.to_string()))
    }
}

/// A threshold declared against a metric during a sample.
///
/// Recorded only; nothing in the harness evaluates it.
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct AlertRecord {
    /// Metric id the alert refers to
    pub metric: String,
    /// Comparison operator
    pub comparison: Comparison,
    /// Threshold the metric is compared against
    pub threshold: f64,
}

/// Label binding of a metric
#[derive(Debug, Clone, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct MetricLabel {
    /// Metric id
    pub id: String,
    /// Human-readable label
    pub label: String,
}

/// Values recorded for one metric, in recording order
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct MetricValues {
    /// Metric id
    pub id: String,
    /// Recorded values
    pub values: Vec<f64>,
}

/// Everything one sample recorded: labels, values and alerts.
///
/// Sent from the worker exactly once per successful sample.
#[derive(Debug, Clone, Default, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct SampleRecord {
    /// Metric labels, in first-registration order
    pub metrics: Vec<MetricLabel>,
    /// Metric values, in first-registration order
    pub measurements: Vec<MetricValues>,
    /// Alerts declared during the sample
    pub alerts: Vec<AlertRecord>,
}

/// Handshake sent by a freshly started worker
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct WorkerHello {
    /// Protocol version for compatibility
    pub protocol_version: u32,
    /// Worker process id (for diagnostics)
    pub pid: u32,
}

impl Default for WorkerHello {
    fn default() -> Self {
        Self {
            protocol_version: crate::PROTOCOL_VERSION,
            pid: std::process::id(),
        }
    }
}

/// Categories of sample failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum FailureKind {
    /// The target panicked (caught)
    Panic,
    /// The target returned an error (including alert declaration errors)
    Error,
    /// Parameters could not be decoded in the worker
    InvalidParameters,
    /// The worker died, exited non-zero or broke the protocol
    Crash,
    /// The worker exceeded the configured timeout
    Timeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Panic => "panic",
            FailureKind::Error => "error",
            FailureKind::InvalidParameters => "invalid parameters",
            FailureKind::Crash => "crash",
            FailureKind::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// Messages sent from Worker to Supervisor
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum WorkerMessage {
    /// Initial handshake
    Hello(WorkerHello),

    /// The sample ran to completion
    SampleComplete(SampleRecord),

    /// The sample failed
    Failure {
        /// Error category
        kind: FailureKind,
        /// Human-readable error message
        message: String,
    },
}

/// Commands sent from Supervisor to Worker
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum SupervisorCommand {
    /// Run one sample of a target
    Run {
        /// Target identifier
        target_id: String,
        /// Target parameters as a JSON object
        parameters_json: String,
    },

    /// Request graceful exit
    Shutdown,
}
