// keychain.rs — OS keychain provider (feature "keychain").
//
// Backed by the platform secure store through the `keyring` crate: macOS
// Keychain, Windows Credential Manager, or the freedesktop Secret Service.
// Credentials stored here are long-lived user credentials; the keychain
// itself handles at-rest protection, so no expiry metadata is kept.

use keyring::Entry;

use crate::credential::{Credential, CredentialType};
use crate::error::CredentialError;
use crate::provider::CredentialProvider;

const SERVICE: &str = "aibox";

/// Provider backed by the operating system keychain.
pub struct KeychainProvider;

impl KeychainProvider {
    pub fn new() -> Self {
        Self
    }

    fn entry(&self, credential_type: CredentialType) -> Result<Entry, CredentialError> {
        Entry::new(SERVICE, credential_type.as_str()).map_err(|e| self.provider_error("open", e))
    }

    fn provider_error(&self, op: &str, e: keyring::Error) -> CredentialError {
        CredentialError::Provider {
            provider: self.name().to_string(),
            op: op.to_string(),
            message: e.to_string(),
        }
    }
}

impl Default for KeychainProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialProvider for KeychainProvider {
    fn name(&self) -> &str {
        "os-keychain"
    }

    fn get(&self, credential_type: CredentialType) -> Result<Option<Credential>, CredentialError> {
        match self.entry(credential_type)?.get_password() {
            Ok(value) => Ok(Some(Credential::new(credential_type, value, self.name()))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(self.provider_error("get", e)),
        }
    }

    fn store(&self, credential: &Credential) -> Result<(), CredentialError> {
        self.entry(credential.credential_type)?
            .set_password(credential.value.expose())
            .map_err(|e| self.provider_error("store", e))
    }

    fn delete(&self, credential_type: CredentialType) -> Result<(), CredentialError> {
        match self.entry(credential_type)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(self.provider_error("delete", e)),
        }
    }

    fn list(&self) -> Result<Vec<CredentialType>, CredentialError> {
        let mut present = Vec::new();
        for credential_type in CredentialType::ALL {
            if self.get(credential_type)?.is_some() {
                present.push(credential_type);
            }
        }
        Ok(present)
    }
}
