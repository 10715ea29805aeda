// event.rs — Audit event data model and canonical encoding.
//
// The canonical single-line encoding is part of the verification contract:
// field order is fixed by struct declaration (timestamp first, then
// event_type, then identifiers, then details), details render with sorted
// keys (BTreeMap), timestamps render as RFC 3339 UTC with exactly six
// fractional digits, and there is no insignificant whitespace. Changing any
// of this invalidates every existing chain.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuditError;

/// The closed set of audit event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    SandboxStart,
    SandboxStop,
    NetworkAllow,
    NetworkDeny,
    DnsQuery,
    DnsResponse,
    ToolInvoke,
    ToolApprove,
    ToolDeny,
    CredentialIssue,
    CredentialUse,
    CredentialRotate,
    CredentialRevoke,
    PolicyAllow,
    PolicyDeny,
    LlmRequest,
    LlmResponse,
    FileRead,
    FileWrite,
    MonitorAlert,
    SessionStart,
    SessionEnd,
}

impl AuditEventType {
    /// Every known event type, for exhaustive table checks.
    pub const ALL: [AuditEventType; 22] = [
        AuditEventType::SandboxStart,
        AuditEventType::SandboxStop,
        AuditEventType::NetworkAllow,
        AuditEventType::NetworkDeny,
        AuditEventType::DnsQuery,
        AuditEventType::DnsResponse,
        AuditEventType::ToolInvoke,
        AuditEventType::ToolApprove,
        AuditEventType::ToolDeny,
        AuditEventType::CredentialIssue,
        AuditEventType::CredentialUse,
        AuditEventType::CredentialRotate,
        AuditEventType::CredentialRevoke,
        AuditEventType::PolicyAllow,
        AuditEventType::PolicyDeny,
        AuditEventType::LlmRequest,
        AuditEventType::LlmResponse,
        AuditEventType::FileRead,
        AuditEventType::FileWrite,
        AuditEventType::MonitorAlert,
        AuditEventType::SessionStart,
        AuditEventType::SessionEnd,
    ];
}

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// One structured security event. Field declaration order is the canonical
/// wire order — do not reorder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEvent {
    #[serde(with = "canonical_ts")]
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub sandbox_id: String,
    pub user_id: String,
    /// Which subsystem produced the event (e.g. "policy", "broker").
    pub source: String,
    pub severity: Severity,
    /// Free-form structured payload. Sorted keys keep the encoding canonical.
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
    /// Hash of the previous event in the chain; set by [`crate::HashChain`].
    #[serde(default)]
    pub hash_prev: String,
    /// This event's own chain hash; set by [`crate::HashChain`].
    #[serde(default)]
    pub hash_self: String,
}

impl AuditEvent {
    /// Create an event with the current timestamp and `info` severity.
    pub fn new(
        event_type: AuditEventType,
        sandbox_id: impl Into<String>,
        user_id: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            sandbox_id: sandbox_id.into(),
            user_id: user_id.into(),
            source: source.into(),
            severity: Severity::Info,
            details: BTreeMap::new(),
            hash_prev: String::new(),
            hash_self: String::new(),
        }
    }

    /// Set the severity and return self (builder pattern).
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Add one detail entry and return self.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// The canonical single-line serialization, hash fields included. This
    /// is the byte form stored inside batches.
    pub fn to_line(&self) -> Result<String, AuditError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse an event back from its canonical line.
    pub fn from_line(line: &str) -> Result<Self, AuditError> {
        Ok(serde_json::from_str(line)?)
    }

    /// The canonical serialization *minus both hash fields* — the chain
    /// hash input (concatenated with `hash_prev` by the chain).
    pub fn canonical_for_hash(&self) -> Result<String, AuditError> {
        #[derive(Serialize)]
        struct HashView<'a> {
            #[serde(with = "canonical_ts")]
            timestamp: DateTime<Utc>,
            event_type: AuditEventType,
            sandbox_id: &'a str,
            user_id: &'a str,
            source: &'a str,
            severity: Severity,
            details: &'a BTreeMap<String, serde_json::Value>,
        }
        Ok(serde_json::to_string(&HashView {
            timestamp: self.timestamp,
            event_type: self.event_type,
            sandbox_id: &self.sandbox_id,
            user_id: &self.user_id,
            source: &self.source,
            severity: self.severity,
            details: &self.details,
        })?)
    }
}

/// RFC 3339 UTC with exactly six fractional digits. The fixed precision is
/// part of the canonical-encoding contract.
mod canonical_ts {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
