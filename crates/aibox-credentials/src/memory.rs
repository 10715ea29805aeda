// memory.rs — In-memory provider.
//
// Backs tests and ephemeral sandboxes that must not touch any persistent
// store. Nothing is written anywhere; dropping the provider drops the
// secrets.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::credential::{Credential, CredentialType};
use crate::error::CredentialError;
use crate::provider::CredentialProvider;

/// A provider holding credentials in process memory only.
#[derive(Default)]
pub struct MemoryProvider {
    store: Mutex<BTreeMap<CredentialType, Credential>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<CredentialType, Credential>> {
        self.store
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl CredentialProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn get(&self, credential_type: CredentialType) -> Result<Option<Credential>, CredentialError> {
        Ok(self.lock().get(&credential_type).cloned())
    }

    fn store(&self, credential: &Credential) -> Result<(), CredentialError> {
        self.lock()
            .insert(credential.credential_type, credential.clone());
        Ok(())
    }

    fn delete(&self, credential_type: CredentialType) -> Result<(), CredentialError> {
        self.lock().remove(&credential_type);
        Ok(())
    }

    fn list(&self) -> Result<Vec<CredentialType>, CredentialError> {
        Ok(self.lock().keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_get_delete_cycle() {
        let provider = MemoryProvider::new();
        assert!(provider.get(CredentialType::GitToken).unwrap().is_none());

        let cred = Credential::new(CredentialType::GitToken, "tok", provider.name());
        provider.store(&cred).unwrap();
        let fetched = provider.get(CredentialType::GitToken).unwrap().unwrap();
        assert_eq!(fetched.value.expose(), "tok");

        provider.delete(CredentialType::GitToken).unwrap();
        assert!(provider.get(CredentialType::GitToken).unwrap().is_none());
    }

    #[test]
    fn delete_absent_is_a_noop() {
        let provider = MemoryProvider::new();
        assert!(provider.delete(CredentialType::MirrorToken).is_ok());
    }

    #[test]
    fn list_reflects_contents() {
        let provider = MemoryProvider::new();
        provider
            .store(&Credential::new(CredentialType::LlmApiKey, "k", "memory"))
            .unwrap();
        assert_eq!(provider.list().unwrap(), vec![CredentialType::LlmApiKey]);
    }
}
