//! # aibox-session
//!
//! Sandbox-lifetime orchestration of the AI-Box security core.
//!
//! A [`SandboxSession`] wires the four core components together for exactly
//! one sandbox lifetime: on start it loads and merges the policy hierarchy,
//! opens the decision logger and audit store, and asks the credential broker
//! for the environment injections the container runner needs. During the
//! sandbox's life every operation flows through [`SandboxSession::evaluate`],
//! which classifies, logs, and audits it. On stop the session revokes minted
//! credentials best-effort, flushes and closes the logs, and appends the
//! final audit batch. Stop is idempotent and never deadlocks.
//!
//! Sessions are plain values — instantiate as many as you like in parallel
//! (each with its own directories); there is no process-global state.

pub mod config;
pub mod error;
pub mod session;

pub use config::SessionConfig;
pub use error::SessionError;
pub use session::{SandboxSession, UNENFORCED_RULE};
