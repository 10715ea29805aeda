// credential.rs — Credential data model.
//
// The type → environment variable mapping is fixed and closed: the broker
// sets exactly these variables and nothing else. The secret value lives in a
// SecretValue wrapper whose Debug impl redacts, so a stray {:?} in a log
// line cannot leak it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of credential kinds AI-Box brokers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialType {
    GitToken,
    LlmApiKey,
    MirrorToken,
}

impl CredentialType {
    /// Every known credential type, in injection order.
    pub const ALL: [CredentialType; 3] = [
        CredentialType::GitToken,
        CredentialType::LlmApiKey,
        CredentialType::MirrorToken,
    ];

    /// The fixed environment variable the sandbox receives this type under.
    pub fn env_var(self) -> &'static str {
        match self {
            CredentialType::GitToken => "AIBOX_GIT_TOKEN",
            CredentialType::LlmApiKey => "AIBOX_LLM_API_KEY",
            CredentialType::MirrorToken => "AIBOX_MIRROR_TOKEN",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CredentialType::GitToken => "git-token",
            CredentialType::LlmApiKey => "llm-api-key",
            CredentialType::MirrorToken => "mirror-token",
        }
    }
}

impl std::fmt::Display for CredentialType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An opaque secret. Debug output is always redacted; the raw value is only
/// reachable through [`SecretValue::expose`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw secret. Callers own the discipline of where it goes.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[redacted]")
    }
}

/// One brokered credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub credential_type: CredentialType,
    pub value: SecretValue,
    /// Absent means no expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Display name of the provider that produced this credential.
    pub source: String,
    /// Whether the broker minted this credential (and must delete it on
    /// sandbox stop) as opposed to a pre-existing long-lived user credential.
    #[serde(default)]
    pub minted: bool,
}

impl Credential {
    pub fn new(
        credential_type: CredentialType,
        value: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            credential_type,
            value: SecretValue::new(value),
            expires_at: None,
            source: source.into(),
            minted: false,
        }
    }

    /// Set the expiry and return self (builder pattern).
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Mark as broker-minted and return self.
    pub fn minted(mut self) -> Self {
        self.minted = true;
        self
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(at) if at <= Utc::now())
    }

    /// Remaining lifetime, when an expiry is set and not yet passed.
    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at - Utc::now())
            .filter(|d| *d > Duration::zero())
    }

    /// The `NAME=VALUE` environment injection for this credential.
    pub fn env_pair(&self) -> String {
        format!("{}={}", self.credential_type.env_var(), self.value.expose())
    }
}

/// Presence report for one credential type — values are never included.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatus {
    pub credential_type: CredentialType,
    pub present: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub expired: bool,
    /// Seconds until expiry, when set and in the future.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<i64>,
}
