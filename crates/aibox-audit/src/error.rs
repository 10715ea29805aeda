// error.rs — Error types for the audit subsystem.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during audit operations.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Filesystem access to the store failed.
    #[error("audit store I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An event or batch could not be encoded or decoded.
    #[error("audit serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A batch with this key has already been persisted. Batches are
    /// immutable; overwrites fail loudly.
    #[error("batch '{key}' already exists and is immutable")]
    ImmutableViolation { key: String },

    /// No batch with this key.
    #[error("batch '{key}' not found")]
    NotFound { key: String },

    /// A batch's stored checksum does not match its entries.
    #[error("batch '{key}' is corrupted: expected checksum {expected}, got {got}")]
    Corrupted {
        key: String,
        expected: String,
        got: String,
    },

    /// The hash chain does not hold at the given global event index.
    #[error("hash chain broken at event {index}: expected {expected}, got {got}")]
    ChainBroken {
        index: usize,
        expected: String,
        got: String,
    },

    /// A streaming sink rejected a batch. Never fatal for append.
    #[error("sink '{sink}' failed: {message}")]
    SinkFailed { sink: String, message: String },
}
