// config.rs — Decision logger configuration and path sanitation.

use std::path::PathBuf;
use std::time::Duration;

/// Default decision log location when the caller supplies nothing usable.
pub const DEFAULT_LOG_PATH: &str = "/var/log/aibox/decisions.jsonl";

/// Configuration for one [`crate::DecisionLogger`].
#[derive(Debug, Clone)]
pub struct DecisionLogConfig {
    /// Log file path. Must end in `.jsonl`; see [`sanitize_log_path`].
    pub path: PathBuf,
    /// Rotation threshold in bytes.
    pub max_size: u64,
    /// How many rotated history files to retain.
    pub max_rotated: usize,
    /// Sample rate for `safe` entries: 0 or 1 persists everything,
    /// N >= 2 persists 1 in N. Non-safe entries are never sampled.
    pub sample_safe: u32,
    /// Background flush period.
    pub flush_interval: Duration,
}

impl DecisionLogConfig {
    /// Config with defaults for everything but the path.
    pub fn new(path: impl AsRef<str>) -> Self {
        Self {
            path: sanitize_log_path(path.as_ref()),
            max_size: 10 * 1024 * 1024,
            max_rotated: 5,
            sample_safe: 0,
            flush_interval: Duration::from_secs(3),
        }
    }
}

impl Default for DecisionLogConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_PATH)
    }
}

/// Ensure a usable log path: empty input falls back to the default, and the
/// file name must end in `.jsonl` (appended when missing) so downstream
/// tooling recognizes the format.
pub fn sanitize_log_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return PathBuf::from(DEFAULT_LOG_PATH);
    }
    if trimmed.ends_with(".jsonl") {
        PathBuf::from(trimmed)
    } else {
        PathBuf::from(format!("{}.jsonl", trimmed))
    }
}
