// broker.rs — The credential broker.
//
// One broker per sandbox start. It resolves every known credential type
// from its provider, hands the container runner a list of NAME=VALUE
// injections, and on sandbox stop deletes whatever was minted for this
// sandbox. Pre-existing long-lived user credentials are never deleted.
//
// Missing credentials are skipped silently (not every user configures every
// type); expired credentials are treated as missing at injection time but
// still reported by validate_credentials so status surfaces can explain
// *why* a credential is absent.

use tracing::{debug, warn};

use aibox_core::CancelToken;

use crate::credential::{Credential, CredentialStatus, CredentialType};
use crate::error::CredentialError;
use crate::provider::CredentialProvider;

/// Broker over one pluggable provider. Instantiate per sandbox lifetime.
pub struct CredentialBroker {
    provider: Box<dyn CredentialProvider>,
    cancel: CancelToken,
}

impl CredentialBroker {
    pub fn new(provider: Box<dyn CredentialProvider>) -> Self {
        Self {
            provider,
            cancel: CancelToken::new(),
        }
    }

    /// Cancellation token checked before each provider round-trip.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The provider's display name.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Resolve every available credential into `NAME=VALUE` injections using
    /// the fixed type→env-name mapping. Missing and expired credentials are
    /// skipped.
    pub fn inject_env_vars(&self) -> Result<Vec<String>, CredentialError> {
        let mut env = Vec::new();
        for credential_type in CredentialType::ALL {
            self.check_cancel()?;
            match self.provider.get(credential_type)? {
                Some(credential) if credential.is_expired() => {
                    debug!(%credential_type, "skipping expired credential");
                }
                Some(credential) => env.push(credential.env_pair()),
                None => {}
            }
        }
        Ok(env)
    }

    /// Store a credential minted for this sandbox. Minted credentials are
    /// deleted again by [`CredentialBroker::revoke_minted`].
    pub fn mint(&self, credential: Credential) -> Result<(), CredentialError> {
        self.check_cancel()?;
        self.provider.store(&credential.minted())
    }

    /// Best-effort revocation on sandbox stop: delete every minted
    /// credential. Provider failures are warned and skipped — revocation
    /// degrades gracefully up to the credential TTL. Returns how many
    /// credentials were revoked.
    pub fn revoke_minted(&self) -> usize {
        let mut revoked = 0;
        for credential_type in CredentialType::ALL {
            if self.cancel.is_canceled() {
                // Shutdown deadline passed; remaining leases age out on TTL.
                warn!(%credential_type, "revocation skipped by shutdown deadline");
                continue;
            }
            let minted = match self.provider.get(credential_type) {
                Ok(Some(credential)) => credential.minted,
                Ok(None) => false,
                Err(e) => {
                    warn!(%credential_type, "revocation lookup failed: {e}");
                    false
                }
            };
            if !minted {
                continue;
            }
            match self.provider.delete(credential_type) {
                Ok(()) => revoked += 1,
                Err(e) => warn!(%credential_type, "revocation failed: {e}"),
            }
        }
        revoked
    }

    /// Presence report per known credential type, without exposing values.
    pub fn validate_credentials(&self) -> Result<Vec<CredentialStatus>, CredentialError> {
        let mut statuses = Vec::with_capacity(CredentialType::ALL.len());
        for credential_type in CredentialType::ALL {
            self.check_cancel()?;
            let status = match self.provider.get(credential_type)? {
                Some(credential) => CredentialStatus {
                    credential_type,
                    present: true,
                    source: Some(credential.source.clone()),
                    expired: credential.is_expired(),
                    expires_in_secs: credential.expires_in().map(|d| d.num_seconds()),
                },
                None => CredentialStatus {
                    credential_type,
                    present: false,
                    source: None,
                    expired: false,
                    expires_in_secs: None,
                },
            };
            statuses.push(status);
        }
        Ok(statuses)
    }

    fn check_cancel(&self) -> Result<(), CredentialError> {
        if self.cancel.is_canceled() {
            Err(CredentialError::Canceled)
        } else {
            Ok(())
        }
    }
}
