// document.rs — Policy document data model.
//
// One PolicyDocument per hierarchy level (org, team, project). The org
// document must carry every section; team and project documents may omit
// sections, which then inherit the parent value during merge.
//
// All closed sets (engine, network mode, risk class) are Rust enums so an
// out-of-set value fails at parse time with a location, not deep inside
// evaluation.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Which level of the hierarchy a document belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyLevel {
    Org,
    Team,
    Project,
}

impl std::fmt::Display for PolicyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyLevel::Org => write!(f, "org"),
            PolicyLevel::Team => write!(f, "team"),
            PolicyLevel::Project => write!(f, "project"),
        }
    }
}

/// A single policy document as parsed from disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyDocument {
    /// Document version (semver-ish, informational).
    pub version: String,

    /// Sandbox runtime requirements. Required at org level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimePolicy>,

    /// Network posture and allowlist. Required at org level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkPolicy>,

    /// Ordered tool rules. Child rules are appended after parent rules.
    #[serde(default)]
    pub tools: Vec<ToolRule>,

    /// Credential lifecycle requirements. Required at org level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialPolicy>,

    /// Filesystem deny/write lists. Required at org level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem: Option<FilesystemPolicy>,
}

/// Sandbox runtime selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimePolicy {
    pub engine: RuntimeEngine,
    /// Whether the container runs rootless. Once true at a parent level it
    /// cannot be cleared by a child.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rootless: Option<bool>,
}

/// Isolation engines, ordered by strength: gvisor > kata > runc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEngine {
    Gvisor,
    Kata,
    Runc,
}

impl RuntimeEngine {
    /// Isolation strength. Higher is stronger; children may only move up.
    pub fn strength(self) -> u8 {
        match self {
            RuntimeEngine::Gvisor => 3,
            RuntimeEngine::Kata => 2,
            RuntimeEngine::Runc => 1,
        }
    }
}

impl std::fmt::Display for RuntimeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeEngine::Gvisor => write!(f, "gvisor"),
            RuntimeEngine::Kata => write!(f, "kata"),
            RuntimeEngine::Runc => write!(f, "runc"),
        }
    }
}

/// Network posture for the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkPolicy {
    pub mode: NetworkMode,
    /// Allowlist entries. When a child specifies this list it replaces the
    /// parent's — children may remove or restrict entries, never extend.
    #[serde(default)]
    pub allow: Vec<AllowEntry>,
}

/// Network modes, ordered by strictness: deny-by-default > filtered > open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkMode {
    DenyByDefault,
    Filtered,
    Open,
}

impl NetworkMode {
    /// Restriction strength. Higher is stricter; children may only move up.
    pub fn strictness(self) -> u8 {
        match self {
            NetworkMode::DenyByDefault => 3,
            NetworkMode::Filtered => 2,
            NetworkMode::Open => 1,
        }
    }
}

impl std::fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkMode::DenyByDefault => write!(f, "deny-by-default"),
            NetworkMode::Filtered => write!(f, "filtered"),
            NetworkMode::Open => write!(f, "open"),
        }
    }
}

/// One named allowlist entry: a set of hosts and ports, optionally
/// rate-limited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllowEntry {
    pub id: String,
    #[serde(default)]
    pub hosts: BTreeSet<String>,
    #[serde(default)]
    pub ports: BTreeSet<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,
}

impl AllowEntry {
    /// Whether this entry routes LLM gateway traffic and therefore must
    /// declare a rate limit.
    pub fn is_llm_gateway(&self) -> bool {
        self.id == "llm-gateway" || self.id.starts_with("llm-gateway-")
    }
}

/// Request/token rate caps for an allowlist entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimit {
    pub requests_per_min: u32,
    pub tokens_per_min: u32,
}

/// One ordered tool rule: a glob pattern over the operation command plus the
/// risk class assigned to matching operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolRule {
    /// Glob pattern matched against the operation's command string.
    #[serde(rename = "match")]
    pub pattern: String,
    pub risk_class: RiskClass,
    pub reason: String,
}

/// Risk classification for an operation, ordered by severity:
/// blocked-by-default > review-required > safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskClass {
    Safe,
    ReviewRequired,
    BlockedByDefault,
}

impl RiskClass {
    /// Severity ordering used when several rules match one operation.
    pub fn severity(self) -> u8 {
        match self {
            RiskClass::Safe => 1,
            RiskClass::ReviewRequired => 2,
            RiskClass::BlockedByDefault => 3,
        }
    }
}

impl std::fmt::Display for RiskClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskClass::Safe => write!(f, "safe"),
            RiskClass::ReviewRequired => write!(f, "review-required"),
            RiskClass::BlockedByDefault => write!(f, "blocked-by-default"),
        }
    }
}

/// Credential lifecycle requirements.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CredentialPolicy {
    /// Revoke minted credentials when the sandbox stops. Monotone: once a
    /// parent sets true, a child cannot clear it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoke_on_stop: Option<bool>,
    /// Forbid persisting credentials into the workspace. Monotone like
    /// `revoke_on_stop`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_persist_to_workspace: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_token_ttl: Option<Ttl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_api_key_ttl: Option<Ttl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror_token_ttl: Option<Ttl>,
}

/// Hard ceilings on credential TTLs, by credential kind.
pub const GIT_TOKEN_TTL_CAP: Duration = Duration::from_secs(8 * 3600);
pub const LLM_API_KEY_TTL_CAP: Duration = Duration::from_secs(12 * 3600);
pub const MIRROR_TOKEN_TTL_CAP: Duration = Duration::from_secs(24 * 3600);

/// A credential TTL, written as a humantime string in YAML ("8h", "30m").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ttl(pub Duration);

impl Ttl {
    pub fn as_secs(&self) -> u64 {
        self.0.as_secs()
    }
}

impl Serialize for Ttl {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(self.0).to_string())
    }
}

impl<'de> Deserialize<'de> for Ttl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s)
            .map(Ttl)
            .map_err(serde::de::Error::custom)
    }
}

/// Filesystem deny/write lists. Patterns are absolute path globs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FilesystemPolicy {
    #[serde(default)]
    pub denied_paths: BTreeSet<String>,
    #[serde(default)]
    pub writable_paths: BTreeSet<String>,
}
