//! # aibox-audit
//!
//! Tamper-evident audit persistence for AI-Box.
//!
//! Security events are chained — each [`AuditEvent`]'s `hash_self` covers
//! its canonical serialization plus the previous event's hash, starting from
//! a published genesis constant — and persisted in immutable, checksummed
//! [`Batch`] files. [`AuditStore::verify`] re-reads everything and reports
//! both failure modes: a batch checksum mismatch (bulk tamper) and a hash
//! chain break (in-place edit with a recomputed checksum).
//!
//! Streaming sinks (HTTP and friends) are secondary: the local immutable
//! store is authoritative and sink failures never block an append.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use aibox_audit::{AuditEvent, AuditEventType, AuditStore, Batch, HashChain};
//!
//! let store = AuditStore::open("/var/lib/aibox/audit").unwrap();
//! let mut chain = HashChain::new();
//! let mut event = AuditEvent::new(AuditEventType::SessionStart, "sb-1", "dev", "aibox");
//! chain.chain(&mut event).unwrap();
//!
//! let mut batch = Batch::new();
//! batch.push_event(event.to_line().unwrap());
//! batch.chain_head = chain.head().to_string();
//! let key = store.append(batch).unwrap();
//! println!("persisted batch {key}");
//! ```

pub mod batch;
pub mod chain;
pub mod error;
pub mod event;
pub mod retention;
pub mod sink;
pub mod store;

pub use batch::Batch;
pub use chain::{genesis_hash, HashChain, GENESIS_SEED};
pub use error::AuditError;
pub use event::{AuditEvent, AuditEventType, Severity};
pub use retention::min_retention_years;
pub use sink::{EventSink, HttpSink};
pub use store::{AuditStore, VerifyReport};
