// id.rs — Sandbox identifier.
//
// One SandboxId is minted per sandbox start and threaded through every
// decision entry, credential association, and audit event produced during
// that sandbox's lifetime.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one sandbox lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SandboxId(pub Uuid);

impl SandboxId {
    /// Mint a new random sandbox id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SandboxId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SandboxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
