// batch.rs — Immutable audit batch model.
//
// A batch stores already-serialized event lines, not the events themselves,
// so heterogeneous producers can feed one store as long as they agree on
// the canonical event encoding. The checksum covers the concatenated entry
// bytes; the chain_head records the chain state after the batch's last
// event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aibox_core::hash::sha256_hex;

/// One unit of persisted audit events. Immutable after first persist.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Batch {
    /// Monotonic, time-encoded key. Empty means "generate on append".
    #[serde(default)]
    pub key: String,

    /// Creation time. Absent means "now" at append time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Serialized canonical event lines, in chain order.
    pub entries: Vec<String>,

    /// Chain head after the last event in this batch.
    #[serde(default)]
    pub chain_head: String,

    /// SHA-256 hex over the concatenated entry bytes; set by the store.
    #[serde(default)]
    pub checksum: String,
}

impl Batch {
    /// An empty batch with store-generated key and timestamp.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an explicit key and return self (builder pattern).
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Set an explicit creation time and return self.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Append one serialized event line.
    pub fn push_event(&mut self, line: String) {
        self.entries.push(line);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checksum over the concatenated entry bytes.
    pub fn compute_checksum(entries: &[String]) -> String {
        let mut bytes = Vec::with_capacity(entries.iter().map(String::len).sum());
        for entry in entries {
            bytes.extend_from_slice(entry.as_bytes());
        }
        sha256_hex(&bytes)
    }

    /// Whether the stored checksum matches the entries.
    pub fn checksum_intact(&self) -> bool {
        Self::compute_checksum(&self.entries) == self.checksum
    }

    /// The time-encoded key format used when the caller supplies none.
    pub fn key_for(created_at: DateTime<Utc>) -> String {
        created_at.format("%Y%m%dT%H%M%SZ").to_string()
    }
}
