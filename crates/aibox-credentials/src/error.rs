// error.rs — Error types for the credential subsystem.
//
// Secret discipline: no variant ever carries a credential value. Messages
// reference credential *types* and provider names only.

use std::path::PathBuf;
use thiserror::Error;

use crate::credential::CredentialType;

/// Errors that can occur during credential operations.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// A provider operation failed (I/O, network, keychain).
    #[error("provider '{provider}' failed during {op}: {message}")]
    Provider {
        provider: String,
        op: String,
        message: String,
    },

    /// A credential was required but absent.
    #[error("no {credential_type} credential available")]
    NotFound { credential_type: CredentialType },

    /// The encrypted credential file is shorter than a GCM nonce.
    #[error("ciphertext too short in {path}")]
    CiphertextTooShort { path: PathBuf },

    /// Authenticated decryption failed — wrong machine/user key, or the
    /// file was corrupted or tampered with.
    #[error("decryption failed for {path}")]
    DecryptionFailed { path: PathBuf },

    /// Filesystem access to the credential store failed.
    #[error("credential store I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The (decrypted) credential store contents could not be encoded or
    /// decoded.
    #[error("credential store serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The operation was aborted by sandbox shutdown.
    #[error("credential operation canceled by shutdown")]
    Canceled,
}
