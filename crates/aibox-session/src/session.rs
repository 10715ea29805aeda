// session.rs — One sandbox lifetime, wired end to end.
//
// Start: load → validate → merge policy, open the logs, mint credential
// injections, audit the start. Evaluate: classify each operation, write the
// decision entry, mirror it into the audit chain. Stop: revoke minted
// credentials best-effort, cancel in-flight I/O, append the final audit
// batch, close the logger. Stop is idempotent.
//
// A missing org policy does not abort the start: the session degrades to
// unenforced (every operation allowed under an explicit marker rule) with a
// warning, since enforcement is best-effort by design. Policy parse,
// schema, and merge failures DO abort — a malformed policy is a security
// posture problem, not a degraded mode.

use std::sync::Mutex;

use tracing::warn;

use aibox_audit::{AuditEvent, AuditEventType, AuditStore, Batch, HashChain, Severity};
use aibox_core::{CancelToken, SandboxId};
use aibox_credentials::{CredentialBroker, CredentialProvider, CredentialStatus};
use aibox_decision_log::{DecisionEntry, DecisionLogger};
use aibox_policy::{
    evaluate, load_hierarchy, merge, Decision, DecisionResult, EffectivePolicy, OperationRequest,
    PolicyError, RiskClass, APPROVAL_RULE_PREFIX,
};

use crate::config::SessionConfig;
use crate::error::SessionError;

/// Rule marker recorded when the session runs without an effective policy.
pub const UNENFORCED_RULE: &str = "unenforced";

/// The audit source name this crate stamps on its events.
const AUDIT_SOURCE: &str = "session";

/// The security core, instantiated for exactly one sandbox lifetime.
pub struct SandboxSession {
    id: SandboxId,
    user: String,
    workspace: String,
    policy: Option<EffectivePolicy>,
    policy_warnings: Vec<String>,
    logger: DecisionLogger,
    store: AuditStore,
    broker: CredentialBroker,
    cancel: CancelToken,
    env: Vec<String>,
    audit: Mutex<AuditState>,
    stopped: Mutex<bool>,
}

struct AuditState {
    chain: HashChain,
    pending: Vec<String>,
    /// Store-wide batch ordinal: existing batches at start plus everything
    /// this session appended. Part of the batch key so keys sort in chain
    /// order even when sessions share a store within one second.
    next_seq: u64,
}

impl SandboxSession {
    /// Start a session: load and merge policy, open logger and store, mint
    /// credential injections, and persist the start events.
    pub fn start(
        config: SessionConfig,
        provider: Box<dyn CredentialProvider>,
    ) -> Result<Self, SessionError> {
        let id = SandboxId::new();
        let cancel = CancelToken::new();

        let (policy, policy_warnings) = match load_hierarchy(
            &config.org_policy,
            config.team_policy.as_deref(),
            config.project_policy.as_deref(),
        ) {
            Ok(hierarchy) => {
                let effective = merge(
                    &hierarchy.org,
                    hierarchy.team.as_ref(),
                    hierarchy.project.as_ref(),
                )?;
                let warnings = hierarchy
                    .warnings
                    .iter()
                    .map(|w| format!("{}: {}", w.level, w.message))
                    .collect();
                (Some(effective), warnings)
            }
            Err(PolicyError::NoEffectivePolicy { path }) => {
                warn!(
                    "org policy missing at {}; proceeding unenforced",
                    path.display()
                );
                (
                    None,
                    vec![format!(
                        "org policy missing at {}; enforcement disabled",
                        path.display()
                    )],
                )
            }
            Err(e) => return Err(e.into()),
        };

        let logger = DecisionLogger::open(config.decision_log.clone())?;
        let store = AuditStore::open(&config.audit_dir)?;

        // Resume the chain from the store's last batch so verification
        // holds across successive sessions over the same directory.
        let existing_keys = store.list(None, None)?;
        let chain = match existing_keys.last() {
            Some(last_key) => HashChain::with_head(store.read(last_key)?.chain_head),
            None => HashChain::new(),
        };
        let next_seq = existing_keys.len() as u64;

        let broker = CredentialBroker::new(provider).with_cancel_token(cancel.clone());
        let env = match broker.inject_env_vars() {
            Ok(env) => env,
            Err(e) => {
                // Credentials are optional; a dead provider degrades the
                // sandbox to credential-less rather than blocking the start.
                warn!("credential injection failed: {e}");
                Vec::new()
            }
        };

        let session = Self {
            id,
            user: config.user,
            workspace: config.workspace.display().to_string(),
            policy,
            policy_warnings,
            logger,
            store,
            broker,
            cancel,
            env,
            audit: Mutex::new(AuditState {
                chain,
                pending: Vec::new(),
                next_seq,
            }),
            stopped: Mutex::new(false),
        };

        let policy_hash = session
            .policy
            .as_ref()
            .map(|p| p.version_hash.clone())
            .unwrap_or_else(|| UNENFORCED_RULE.to_string());
        session.audit_event(
            AuditEvent::new(AuditEventType::SessionStart, session.id.to_string(), &session.user, AUDIT_SOURCE)
                .with_detail("policy_version", policy_hash)
                .with_detail("workspace", session.workspace.clone()),
        )?;
        for pair in &session.env {
            let name = pair.split('=').next().unwrap_or_default().to_string();
            session.audit_event(
                AuditEvent::new(
                    AuditEventType::CredentialIssue,
                    session.id.to_string(),
                    &session.user,
                    AUDIT_SOURCE,
                )
                .with_detail("env_var", name)
                .with_detail("provider", session.broker.provider_name()),
            )?;
        }
        session.flush_audit()?;

        Ok(session)
    }

    pub fn sandbox_id(&self) -> SandboxId {
        self.id
    }

    /// The `NAME=VALUE` injections for the container runner.
    pub fn env_vars(&self) -> &[String] {
        &self.env
    }

    /// The merged policy, or None when running unenforced.
    pub fn effective_policy(&self) -> Option<&EffectivePolicy> {
        self.policy.as_ref()
    }

    /// Validation warnings gathered at start (empty tools lists, missing
    /// org policy).
    pub fn policy_warnings(&self) -> &[String] {
        &self.policy_warnings
    }

    /// Classify one operation, record the decision, and mirror it into the
    /// audit chain.
    pub fn evaluate(&self, request: &OperationRequest) -> Result<DecisionResult, SessionError> {
        let result = match &self.policy {
            Some(policy) => evaluate(policy, request),
            None => unenforced_result(request),
        };

        let entry = DecisionEntry::from_evaluation(request, &result)
            .with_workspace(&self.workspace)
            .with_sandbox_id(self.id.to_string());
        self.logger.log(&entry)?;

        let event_type = match result.decision {
            Decision::Allow => AuditEventType::PolicyAllow,
            Decision::Deny => AuditEventType::PolicyDeny,
        };
        let severity = match result.decision {
            Decision::Deny => Severity::Warning,
            Decision::Allow => Severity::Info,
        };
        self.audit_event(
            AuditEvent::new(event_type, self.id.to_string(), &request.user, AUDIT_SOURCE)
                .with_severity(severity)
                .with_detail("command", request.command.clone())
                .with_detail("risk_class", result.risk_class.to_string())
                .with_detail("rule", result.rule.clone()),
        )?;

        Ok(result)
    }

    /// Write back an approver's decision for a previously gated entry: an
    /// `allow` entry under the `approval:` rule marker, plus the audit
    /// event.
    pub fn record_approval(
        &self,
        gated: &DecisionEntry,
        approver: impl Into<String>,
    ) -> Result<DecisionEntry, SessionError> {
        let approver = approver.into();
        let mut entry = gated.clone();
        entry.timestamp = chrono::Utc::now();
        entry.decision = Decision::Allow;
        entry.rule = Some(format!(
            "{}{}",
            APPROVAL_RULE_PREFIX,
            gated.rule.as_deref().unwrap_or(UNENFORCED_RULE)
        ));
        entry.reason = Some(format!("approved by {approver}"));
        self.logger.log(&entry)?;

        self.audit_event(
            AuditEvent::new(
                AuditEventType::ToolApprove,
                self.id.to_string(),
                approver,
                AUDIT_SOURCE,
            )
            .with_detail("command", entry.command.clone()),
        )?;
        Ok(entry)
    }

    /// Chain an arbitrary collaborator event (network allow/deny, DNS, file
    /// access, monitor alerts) into the session's audit stream.
    pub fn record_event(&self, event: AuditEvent) -> Result<(), SessionError> {
        self.audit_event(event)
    }

    /// Append all pending audit events as one immutable batch. Returns the
    /// batch key, or None when nothing was pending.
    pub fn flush_audit(&self) -> Result<Option<String>, SessionError> {
        let mut state = self.audit_lock();
        if state.pending.is_empty() {
            return Ok(None);
        }

        let mut batch = Batch::new().with_key(self.batch_key(state.next_seq));
        batch.entries = std::mem::take(&mut state.pending);
        batch.chain_head = state.chain.head().to_string();

        match self.store.append(batch) {
            Ok(key) => {
                state.next_seq += 1;
                Ok(Some(key))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Credential presence report, value-free.
    pub fn validate_credentials(&self) -> Result<Vec<CredentialStatus>, SessionError> {
        Ok(self.broker.validate_credentials()?)
    }

    /// Direct access to the decision logger (search, read_entry).
    pub fn decision_log(&self) -> &DecisionLogger {
        &self.logger
    }

    /// Direct access to the audit store (read, list, verify).
    pub fn audit_store(&self) -> &AuditStore {
        &self.store
    }

    /// Stop the session: revoke minted credentials best-effort, cancel
    /// in-flight I/O, persist the final audit batch, and close the logger.
    /// Idempotent; never deadlocks.
    pub fn stop(&self) -> Result<(), SessionError> {
        {
            let mut stopped = self
                .stopped
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if *stopped {
                return Ok(());
            }
            *stopped = true;
        }

        // Revocation first, while provider I/O is still permitted; each call
        // is bounded by the provider's own request deadline.
        let revoked = self.broker.revoke_minted();

        // Anything still in flight is now abandoned rather than awaited.
        self.cancel.cancel();

        if revoked > 0 {
            if let Err(e) = self.audit_event(
                AuditEvent::new(
                    AuditEventType::CredentialRevoke,
                    self.id.to_string(),
                    &self.user,
                    AUDIT_SOURCE,
                )
                .with_detail("revoked", revoked),
            ) {
                warn!("failed to audit credential revocation: {e}");
            }
        }
        if let Err(e) = self.audit_event(
            AuditEvent::new(
                AuditEventType::SessionEnd,
                self.id.to_string(),
                &self.user,
                AUDIT_SOURCE,
            )
            .with_detail("revoked_credentials", revoked),
        ) {
            warn!("failed to audit session end: {e}");
        }
        if let Err(e) = self.flush_audit() {
            warn!("failed to append final audit batch: {e}");
        }

        self.logger.close()?;
        Ok(())
    }

    fn audit_event(&self, mut event: AuditEvent) -> Result<(), SessionError> {
        let mut state = self.audit_lock();
        state.chain.chain(&mut event)?;
        let line = event.to_line()?;
        state.pending.push(line);
        Ok(())
    }

    /// Time-prefixed keys sort chronologically; the store-wide ordinal
    /// breaks same-second ties in chain order and the sandbox id fragment
    /// keeps concurrent sessions collision-free.
    fn batch_key(&self, seq: u64) -> String {
        let id = self.id.to_string();
        let short = &id[..8];
        format!(
            "{}-{:06}-{}",
            Batch::key_for(chrono::Utc::now()),
            seq,
            short
        )
    }

    fn audit_lock(&self) -> std::sync::MutexGuard<'_, AuditState> {
        self.audit
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Classification used when no org policy exists: everything proceeds under
/// an explicit marker rule, because enforcement is best-effort and there is
/// nothing to enforce.
fn unenforced_result(request: &OperationRequest) -> DecisionResult {
    DecisionResult {
        allowed: true,
        decision: Decision::Allow,
        risk_class: RiskClass::Safe,
        rule: UNENFORCED_RULE.to_string(),
        reason: "no org policy; enforcement disabled".to_string(),
        policy_version_hash: String::new(),
        input_hash: request.input_hash(),
        duration: std::time::Duration::ZERO,
    }
}
