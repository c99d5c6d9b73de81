//! JSON persistence of the cumulative report

use crate::report::Report;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Report persistence errors
#[derive(Debug, Error)]
pub enum ReportError {
    /// Reading an existing report failed for a reason other than absence
    #[error("failed to read report {path}: {source}")]
    Read {
        /// Report path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
    /// Writing the report failed
    #[error("failed to write report {path}: {source}")]
    Write {
        /// Report path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
    /// Serialization failed
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Location and formatting of the report file
#[derive(Debug, Clone)]
pub struct ReportStore {
    path: PathBuf,
    indent: Option<usize>,
}

impl ReportStore {
    /// Store at `path`; `indent` of `None` writes compact JSON
    pub fn new(path: impl Into<PathBuf>, indent: Option<usize>) -> Self {
        Self {
            path: path.into(),
            indent,
        }
    }

    /// Report path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the existing report.
    ///
    /// A missing file yields an empty report. A file that is not valid
    /// UTF-8 JSON of the report shape is logged and also yields an empty
    /// report, which the next save overwrites. Only I/O failures are errors.
    pub fn load(&self) -> Result<Report, ReportError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no existing report, starting empty");
                return Ok(Report::default());
            }
            Err(source) => {
                return Err(ReportError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(report) => Ok(report),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "existing report is not valid, starting empty"
                );
                Ok(Report::default())
            }
        }
    }

    /// Serialize `report` using the configured indent
    pub fn render(&self, report: &Report) -> Result<String, ReportError> {
        let bytes = match self.indent {
            None => serde_json::to_vec(report)?,
            Some(width) => {
                let indent = " ".repeat(width);
                let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
                let mut buf = Vec::new();
                let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
                report.serialize(&mut ser)?;
                buf
            }
        };
        // serde_json only emits UTF-8
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Overwrite the file with `report`, creating parent directories
    pub fn save(&self, report: &Report) -> Result<(), ReportError> {
        let text = self.render(report)?;
        let write_err = |source| ReportError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(write_err)?;
            }
        }
        fs::write(&self.path, text).map_err(write_err)?;
        tracing::debug!(path = %self.path.display(), "report saved");
        Ok(())
    }
}
