// error.rs — Error type for session orchestration.
//
// The session surfaces everything that affects the security posture of a
// sandbox start (policy parse/validate/merge failures abort); recoverable
// conditions (credential injection trouble, sink failures, best-effort
// revocation) are warned and degraded inside the session instead.

use thiserror::Error;

/// Errors that can occur while starting, driving, or stopping a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Policy(#[from] aibox_policy::PolicyError),

    #[error(transparent)]
    DecisionLog(#[from] aibox_decision_log::DecisionLogError),

    #[error(transparent)]
    Credential(#[from] aibox_credentials::CredentialError),

    #[error(transparent)]
    Audit(#[from] aibox_audit::AuditError),
}
