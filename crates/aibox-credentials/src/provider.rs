// provider.rs — The credential provider capability set.
//
// Providers are interchangeable behind this trait: the broker neither knows
// nor cares whether a credential came from the OS keychain, an encrypted
// file, or a remote secret service. Selection is external configuration.

use crate::credential::{Credential, CredentialType};
use crate::error::CredentialError;

/// A pluggable credential backend.
pub trait CredentialProvider: Send + Sync {
    /// Display name, used in `Credential::source` and error messages.
    fn name(&self) -> &str;

    /// Fetch a credential. `Ok(None)` means the credential is not
    /// configured — a normal condition, not an error.
    fn get(&self, credential_type: CredentialType) -> Result<Option<Credential>, CredentialError>;

    /// Persist a credential.
    fn store(&self, credential: &Credential) -> Result<(), CredentialError>;

    /// Remove a credential. Deleting an absent credential is a no-op.
    fn delete(&self, credential_type: CredentialType) -> Result<(), CredentialError>;

    /// The credential types currently present in this provider.
    fn list(&self) -> Result<Vec<CredentialType>, CredentialError>;
}
