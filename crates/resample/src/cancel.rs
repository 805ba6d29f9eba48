//! Cooperative cancellation for long-running pixel operations

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::error::ResampleError;

/// Shared cancellation flag
///
/// Operations check `is_cancelled()` between units of work and stop early
/// once it is set. Clones share the same flag.
///
/// # Example
///
/// ```
/// use tessera_resample::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
///
/// token.cancel();
/// assert!(worker_token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token in the non-cancelled state
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. Idempotent; every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once cancellation was requested, for use with `?`
    /// between units of work.
    pub fn check(&self) -> Result<(), ResampleError> {
        if self.is_cancelled() {
            Err(ResampleError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Clear the flag so the token can be reused. Affects all clones.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
