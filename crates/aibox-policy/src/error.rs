// error.rs — Error types for the policy subsystem.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading, validating, or merging policies.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Failed to read a policy file from disk.
    #[error("failed to read policy at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A policy file is not well-formed YAML (or violates the schema in a
    /// way serde detects at parse time, e.g. an out-of-set enum value).
    #[error("failed to parse policy at {path} ({location}): {message}")]
    Parse {
        path: PathBuf,
        location: String,
        message: String,
    },

    /// A required field is missing or a value is outside its closed set.
    #[error("schema violation in {path}: field '{field}': {message}")]
    Schema {
        path: PathBuf,
        field: String,
        message: String,
    },

    /// A tool rule pattern does not compile as a glob. Reported with the
    /// rule index so the offending document line is easy to find.
    #[error("tool rule {index} has invalid pattern '{pattern}': {message}")]
    InvalidPattern {
        index: usize,
        pattern: String,
        message: String,
    },

    /// The tighten-only invariant was broken. Carries every violation found
    /// so a misconfigured child document is fixed in one pass.
    #[error("tighten-only merge failed with {} violation(s): {first}", violations.len(),
            first = violations.first().map(|v| v.to_string()).unwrap_or_default())]
    Merge { violations: Vec<Violation> },

    /// The org policy is absent. The caller decides whether to degrade to
    /// an unenforced session or abort.
    #[error("no effective policy: org policy missing at {path}")]
    NoEffectivePolicy { path: PathBuf },
}

/// One tighten-only violation: a child value that loosens its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Dotted path of the offending field (e.g. `network.allow[git].hosts`).
    pub path_in_document: String,
    pub parent_value: String,
    pub child_value: String,
    pub explanation: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: parent '{}' vs child '{}' ({})",
            self.path_in_document, self.parent_value, self.child_value, self.explanation
        )
    }
}
