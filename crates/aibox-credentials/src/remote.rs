// remote.rs — Remote secret store provider.
//
// Talks to an external secret service over HTTPS. Leased secrets carry an
// expiry derived from the lease duration (default TTL when the service does
// not specify one) and are marked minted, so the broker deletes them on
// sandbox stop. All requests run under a client timeout and check the
// session cancel token first, so shutdown never hangs on a dead service.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use aibox_core::CancelToken;

use crate::credential::{Credential, CredentialType, SecretValue};
use crate::error::CredentialError;
use crate::provider::CredentialProvider;

const DEFAULT_LEASE: Duration = Duration::from_secs(3600);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Provider backed by an external secret service.
pub struct RemoteSecretStoreProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    auth_token: Option<SecretValue>,
    default_lease: Duration,
    cancel: CancelToken,
}

/// Wire format for one secret lease.
#[derive(Debug, Serialize, Deserialize)]
struct SecretLease {
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lease_duration_secs: Option<u64>,
}

impl RemoteSecretStoreProvider {
    pub fn new(base_url: impl Into<String>) -> Result<Self, CredentialError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CredentialError::Provider {
                provider: "remote-secret-store".to_string(),
                op: "init".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
            default_lease: DEFAULT_LEASE,
            cancel: CancelToken::new(),
        })
    }

    /// Bearer token presented to the secret service.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(SecretValue::new(token));
        self
    }

    /// Lease duration applied when the service response omits one.
    pub fn with_default_lease(mut self, lease: Duration) -> Self {
        self.default_lease = lease;
        self
    }

    /// Cancellation token checked before every request.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn secret_url(&self, credential_type: CredentialType) -> String {
        format!("{}/v1/secrets/{}", self.base_url, credential_type.as_str())
    }

    fn check_cancel(&self) -> Result<(), CredentialError> {
        if self.cancel.is_canceled() {
            Err(CredentialError::Canceled)
        } else {
            Ok(())
        }
    }

    fn authorize(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token.expose()),
            None => request,
        }
    }

    fn provider_error(&self, op: &str, message: impl Into<String>) -> CredentialError {
        CredentialError::Provider {
            provider: self.name().to_string(),
            op: op.to_string(),
            message: message.into(),
        }
    }
}

impl CredentialProvider for RemoteSecretStoreProvider {
    fn name(&self) -> &str {
        "remote-secret-store"
    }

    fn get(&self, credential_type: CredentialType) -> Result<Option<Credential>, CredentialError> {
        self.check_cancel()?;
        let response = self
            .authorize(self.client.get(self.secret_url(credential_type)))
            .send()
            .map_err(|e| self.provider_error("get", e.to_string()))?;

        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let lease: SecretLease = response
                    .json()
                    .map_err(|e| self.provider_error("get", e.to_string()))?;
                let lease_duration = lease
                    .lease_duration_secs
                    .map(Duration::from_secs)
                    .unwrap_or(self.default_lease);
                let expires_at = Utc::now()
                    + chrono::Duration::from_std(lease_duration)
                        .unwrap_or_else(|_| chrono::Duration::seconds(3600));
                Ok(Some(
                    Credential::new(credential_type, lease.value, self.name())
                        .with_expiry(expires_at)
                        .minted(),
                ))
            }
            status => Err(self.provider_error("get", format!("service returned {}", status))),
        }
    }

    fn store(&self, credential: &Credential) -> Result<(), CredentialError> {
        self.check_cancel()?;
        let lease = SecretLease {
            value: credential.value.expose().to_string(),
            lease_duration_secs: credential
                .expires_in()
                .map(|d| d.num_seconds().max(0) as u64),
        };
        let response = self
            .authorize(
                self.client
                    .put(self.secret_url(credential.credential_type))
                    .json(&lease),
            )
            .send()
            .map_err(|e| self.provider_error("store", e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.provider_error("store", format!("service returned {}", response.status())))
        }
    }

    fn delete(&self, credential_type: CredentialType) -> Result<(), CredentialError> {
        self.check_cancel()?;
        let response = self
            .authorize(self.client.delete(self.secret_url(credential_type)))
            .send()
            .map_err(|e| self.provider_error("delete", e.to_string()))?;
        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            status => Err(self.provider_error("delete", format!("service returned {}", status))),
        }
    }

    fn list(&self) -> Result<Vec<CredentialType>, CredentialError> {
        self.check_cancel()?;
        let url = format!("{}/v1/secrets", self.base_url);
        let response = self
            .authorize(self.client.get(url))
            .send()
            .map_err(|e| self.provider_error("list", e.to_string()))?;
        if !response.status().is_success() {
            return Err(self.provider_error("list", format!("service returned {}", response.status())));
        }
        let names: Vec<String> = response
            .json()
            .map_err(|e| self.provider_error("list", e.to_string()))?;
        Ok(CredentialType::ALL
            .into_iter()
            .filter(|t| names.iter().any(|n| n == t.as_str()))
            .collect())
    }
}
