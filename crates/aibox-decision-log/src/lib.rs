//! # aibox-decision-log
//!
//! Append-only decision log for AI-Box policy evaluations.
//!
//! Every policy decision is recorded as a [`DecisionEntry`] — one JSON line
//! in a user-writable log file. Producers call [`DecisionLogger::log`] from
//! any thread; entries buffer in memory under a mutex and a background
//! flusher persists them every few seconds (or on [`DecisionLogger::flush`]).
//! Low-risk (`safe`) entries can be sampled 1-in-N; everything else is
//! persisted 1-for-1. When the current file exceeds the configured size the
//! next flush rotates it into a numbered history (`decisions.jsonl.1`, `.2`,
//! ...) that is never rewritten.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use aibox_decision_log::{DecisionLogConfig, DecisionLogger};
//!
//! let config = DecisionLogConfig::new("/var/log/aibox/decisions.jsonl");
//! let logger = DecisionLogger::open(config).unwrap();
//! // ... logger.log(&entry) from any thread ...
//! logger.close().unwrap();
//! ```

pub mod config;
pub mod entry;
pub mod error;
pub mod logger;
pub mod search;

pub use config::{sanitize_log_path, DecisionLogConfig, DEFAULT_LOG_PATH};
pub use entry::DecisionEntry;
pub use error::DecisionLogError;
pub use logger::DecisionLogger;
pub use search::SearchFilter;
