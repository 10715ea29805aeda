// error.rs — Error types for the decision log.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while logging or searching decisions.
#[derive(Debug, Error)]
pub enum DecisionLogError {
    /// Failed to open or create the log file.
    #[error("failed to open decision log at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An entry could not be encoded as JSON. The only way `log` fails.
    #[error("failed to encode decision entry: {0}")]
    Encode(#[from] serde_json::Error),

    /// Writing or fsyncing buffered entries failed. Entries stay buffered
    /// and are retried on the next flush.
    #[error("failed to flush decision log: {source}")]
    FlushFailed { source: std::io::Error },

    /// File rotation failed mid-shuffle.
    #[error("failed to rotate decision log {path}: {source}")]
    RotateFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Reading back entries failed.
    #[error("failed to read decision log {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The logger has already been closed.
    #[error("decision logger is closed")]
    Closed,
}
