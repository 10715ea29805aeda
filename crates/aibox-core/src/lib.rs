//! # aibox-core
//!
//! Shared primitives for the AI-Box security core.
//!
//! Every other `aibox-*` crate builds on three small pieces defined here:
//! SHA-256 hashing helpers (all content hashes in AI-Box are SHA-256,
//! hex-encoded), the [`SandboxId`] identifier that ties policy decisions,
//! credentials, and audit events to one sandbox lifetime, and the
//! [`CancelToken`] that lets a shutting-down session abort long I/O
//! operations cooperatively.

pub mod cancel;
pub mod hash;
pub mod id;

pub use cancel::CancelToken;
pub use id::SandboxId;
