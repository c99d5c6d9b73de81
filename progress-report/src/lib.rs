#![warn(missing_docs)]
//! Progress Report - cumulative benchmark results
//!
//! - `report`: the persisted data model and its merge operations
//! - `store`: tolerant loading and whole-file saving as JSON

mod report;
mod store;

pub use report::{Alert, MachineProfile, MetricInfo, Report, TargetResult};
pub use store::{ReportError, ReportStore};
