//! Fatal error conditions for a usage run
//!
//! Anything that should abort the run before output is emitted lives here.
//! Per-record data-quality problems are [`crate::diagnostics::Diagnostic`]s instead.

use std::path::PathBuf;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, UsageError>;

/// Errors that fail an operation or abort a run
#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    /// `gres/gpu` present in an allocation but not a positive integer
    #[error("malformed resource spec {spec:?}: {reason}")]
    MalformedResourceSpec { spec: String, reason: String },

    /// Sanity probe against a known identity failed
    #[error("directory service unavailable: probe for {netid} {detail}")]
    DirectoryServiceUnavailable { netid: String, detail: String },

    /// Too few aggregate rows to trust the accounting export
    #[error("insufficient data: {rows} aggregate rows, at least {minimum} required")]
    InsufficientData { rows: usize, minimum: usize },

    /// A collaborator failed to answer a query
    #[error("{collaborator} query failed: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl UsageError {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// True for the conditions that must abort a run before any output
    pub fn is_fatal_precondition(&self) -> bool {
        matches!(
            self,
            UsageError::DirectoryServiceUnavailable { .. } | UsageError::InsufficientData { .. }
        )
    }
}
