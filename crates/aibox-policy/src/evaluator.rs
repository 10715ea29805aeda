// evaluator.rs — Per-operation risk classification.
//
// Every sandboxed operation flows through evaluate() before it runs. The
// evaluator walks the merged tool rules and classifies the operation:
//
//   safe                → allowed, proceeds automatically
//   review-required     → allowed-with-gate, surfaced to an external approver
//   blocked-by-default  → denied
//
// When several rules match, the strictest class wins; the reported rule is
// the first one carrying that class. An operation no rule matches falls to
// review-required ("no rule matched; default gate") — fail-closed, not
// fail-open.

use std::time::{Duration, Instant};

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};

use aibox_core::hash::short_hash;

use crate::document::RiskClass;
use crate::merge::EffectivePolicy;

/// Rule marker reported when no tool rule matched.
pub const DEFAULT_GATE_RULE: &str = "default";

/// Rule marker prefix used by an external approver writing an allow decision
/// back for a previously gated operation.
pub const APPROVAL_RULE_PREFIX: &str = "approval:";

/// One operation submitted for classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRequest {
    /// What kind of operation (e.g. "tool.invoke", "file.write").
    pub action: String,
    /// The command string tool rules match against.
    pub command: String,
    /// The resource the operation touches (path, host, URL).
    pub target: String,
    /// The requesting user.
    pub user: String,
}

impl OperationRequest {
    /// Short content hash over the full input, recorded in decision entries.
    pub fn input_hash(&self) -> String {
        let canonical = format!(
            "{}|{}|{}|{}",
            self.action, self.command, self.target, self.user
        );
        short_hash(canonical.as_bytes())
    }
}

/// The binary outcome recorded in the decision log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Allow => write!(f, "allow"),
            Decision::Deny => write!(f, "deny"),
        }
    }
}

/// Result of classifying one operation.
#[derive(Debug, Clone)]
pub struct DecisionResult {
    /// True only for `safe` — the automated path may proceed unattended.
    pub allowed: bool,
    /// The recorded decision: deny for blocked-by-default, allow otherwise
    /// (review-required is allow-with-gate).
    pub decision: Decision,
    pub risk_class: RiskClass,
    /// The matched rule's pattern, or [`DEFAULT_GATE_RULE`].
    pub rule: String,
    pub reason: String,
    pub policy_version_hash: String,
    pub input_hash: String,
    pub duration: Duration,
}

impl DecisionResult {
    /// Whether this operation waits on an external approver.
    pub fn gated(&self) -> bool {
        self.risk_class == RiskClass::ReviewRequired
    }
}

/// Classify one operation against the effective policy.
pub fn evaluate(policy: &EffectivePolicy, request: &OperationRequest) -> DecisionResult {
    let started = Instant::now();

    let mut strictest: Option<(&crate::document::ToolRule, RiskClass)> = None;
    for rule in &policy.tools {
        if !pattern_matches(&rule.pattern, &request.command) {
            continue;
        }
        match strictest {
            Some((_, class)) if rule.risk_class.severity() <= class.severity() => {}
            _ => strictest = Some((rule, rule.risk_class)),
        }
        // Nothing outranks blocked-by-default; stop scanning.
        if rule.risk_class == RiskClass::BlockedByDefault {
            break;
        }
    }

    let (risk_class, rule, reason) = match strictest {
        Some((rule, class)) => (class, rule.pattern.clone(), rule.reason.clone()),
        None => (
            RiskClass::ReviewRequired,
            DEFAULT_GATE_RULE.to_string(),
            "no rule matched; default gate".to_string(),
        ),
    };

    let decision = match risk_class {
        RiskClass::BlockedByDefault => Decision::Deny,
        RiskClass::Safe | RiskClass::ReviewRequired => Decision::Allow,
    };

    DecisionResult {
        allowed: risk_class == RiskClass::Safe,
        decision,
        risk_class,
        rule,
        reason,
        policy_version_hash: policy.version_hash.clone(),
        input_hash: request.input_hash(),
        duration: started.elapsed(),
    }
}

/// Glob-match a tool rule pattern against a command string.
///
/// Command strings are not paths, so `*` crosses spaces and slashes. An
/// invalid pattern never matches (fail-closed); load-time validation has
/// already rejected such rules.
fn pattern_matches(pattern: &str, command: &str) -> bool {
    let opts = MatchOptions {
        require_literal_separator: false,
        ..Default::default()
    };
    match Pattern::new(pattern) {
        Ok(p) => p.matches_with(command, opts),
        Err(_) => false,
    }
}
