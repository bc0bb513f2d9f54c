use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation handle for a running solve.
///
/// Tokens are cheap to clone; all clones observe the same flag, so a caller
/// can hand one clone to the solver and keep another to cancel from a
/// different thread. The solver checks the flag at every anchor step and
/// candidate branch and returns [`SolveError::Cancelled`] without reporting
/// a partial selection.
///
/// [`SolveError::Cancelled`]: crate::error::SolveError::Cancelled
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that will never be cancelled, for callers without a timeout.
    pub fn never() -> Self {
        Self::default()
    }

    /// Request cancellation. All clones of this token observe the request.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
