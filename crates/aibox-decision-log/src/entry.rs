// entry.rs — Decision entry data model.
//
// One entry per policy evaluation, serialized as a single JSON line. Field
// names are the canonical record format; optional fields are omitted when
// absent and consumers must tolerate that.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aibox_policy::{Decision, DecisionResult, OperationRequest, RiskClass};

/// A single decision record — one line in the decision log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionEntry {
    /// When the decision was made (UTC).
    pub timestamp: DateTime<Utc>,

    /// Short content hash of the effective policy that produced the decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_version: Option<String>,

    /// Short content hash of the evaluated input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_hash: Option<String>,

    pub action: String,
    pub command: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    pub user: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_id: Option<String>,

    pub decision: Decision,
    pub risk_class: RiskClass,

    /// The rule that decided (a tool rule pattern, `default`, or an
    /// `approval:`-prefixed marker written back by an approver).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl DecisionEntry {
    /// Build an entry from an evaluation result and the request it decided.
    pub fn from_evaluation(request: &OperationRequest, result: &DecisionResult) -> Self {
        Self {
            timestamp: Utc::now(),
            policy_version: Some(result.policy_version_hash.clone()),
            input_hash: Some(result.input_hash.clone()),
            action: request.action.clone(),
            command: request.command.clone(),
            target: Some(request.target.clone()),
            user: request.user.clone(),
            workspace: None,
            sandbox_id: None,
            decision: result.decision,
            risk_class: result.risk_class,
            rule: Some(result.rule.clone()),
            reason: Some(result.reason.clone()),
            duration_ms: Some(result.duration.as_millis() as u64),
        }
    }

    /// Set the workspace path and return self (builder pattern).
    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    /// Set the sandbox id and return self.
    pub fn with_sandbox_id(mut self, sandbox_id: impl Into<String>) -> Self {
        self.sandbox_id = Some(sandbox_id.into());
        self
    }
}
