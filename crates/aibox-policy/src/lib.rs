//! # aibox-policy
//!
//! Hierarchical policy engine for AI-Box sandboxes.
//!
//! Policies are loaded from up to three YAML documents (org required, team
//! and project optional) and merged under a *tighten-only* invariant: a child
//! level may only further restrict its parents, never relax them. Any
//! loosening attempt fails the merge with a [`Violation`] naming the parent
//! and child values — the merge never silently repairs.
//!
//! The merged [`EffectivePolicy`] carries a stable content hash and is
//! immutable for the sandbox's lifetime. Per-operation risk classification
//! runs through [`evaluate`], which walks the merged tool rules and returns
//! a [`DecisionResult`] suitable for logging.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use aibox_policy::{load_document, merge, PolicyLevel};
//!
//! let org = load_document("/etc/aibox/org.yaml", PolicyLevel::Org).unwrap();
//! let effective = merge(&org, None, None).unwrap();
//! println!("policy hash {}", effective.version_hash);
//! ```

pub mod canonical;
pub mod document;
pub mod error;
pub mod evaluator;
pub mod loader;
pub mod merge;
pub mod validate;

pub use document::{
    AllowEntry, CredentialPolicy, FilesystemPolicy, NetworkMode, NetworkPolicy, PolicyDocument,
    PolicyLevel, RateLimit, RiskClass, RuntimeEngine, RuntimePolicy, ToolRule, Ttl,
};
pub use error::{PolicyError, Violation};
pub use evaluator::{
    evaluate, Decision, DecisionResult, OperationRequest, APPROVAL_RULE_PREFIX, DEFAULT_GATE_RULE,
};
pub use loader::{load_document, load_hierarchy, PolicyHierarchy};
pub use merge::{merge, EffectivePolicy};
pub use validate::{validate, ValidationWarning};
