// cancel.rs — Cooperative cancellation token.
//
// Sandbox shutdown must never deadlock: long operations (provider network
// calls, flush loops) check this token at their suspension points and bail
// out with a Canceled-class error. In-memory operations complete quickly and
// never check it.
//
// Tokens are cheap to clone; all clones observe the same flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cooperative cancellation flag shared between a session and the
/// components it drives.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    canceled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, un-canceled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. All clones observe the change.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}
