//! # aibox-credentials
//!
//! Short-lived credential brokering for AI-Box sandboxes.
//!
//! The [`CredentialBroker`] resolves the credential types a sandbox needs
//! from a pluggable [`CredentialProvider`] (OS keychain, encrypted file, or
//! remote secret store), materializes them as `NAME=VALUE` environment
//! injections with a fixed type→name mapping, and revokes minted credentials
//! when the sandbox stops.
//!
//! Secret discipline: credential values never appear in logs, error
//! messages, or `Debug` output — only the credential *type* and *source* are
//! ever rendered.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use aibox_credentials::{CredentialBroker, EncryptedFileProvider};
//!
//! let provider = EncryptedFileProvider::open("/var/lib/aibox/credentials").unwrap();
//! let broker = CredentialBroker::new(Box::new(provider));
//! let env = broker.inject_env_vars().unwrap();
//! // env e.g. ["AIBOX_GIT_TOKEN=..."] — hand to the container runner.
//! ```

pub mod broker;
pub mod credential;
pub mod encrypted_file;
pub mod error;
#[cfg(feature = "keychain")]
pub mod keychain;
pub mod memory;
pub mod provider;
pub mod remote;

pub use broker::CredentialBroker;
pub use credential::{Credential, CredentialStatus, CredentialType, SecretValue};
pub use encrypted_file::EncryptedFileProvider;
pub use error::CredentialError;
#[cfg(feature = "keychain")]
pub use keychain::KeychainProvider;
pub use memory::MemoryProvider;
pub use provider::CredentialProvider;
pub use remote::RemoteSecretStoreProvider;
