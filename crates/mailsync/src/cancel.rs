//! Cooperative cancellation shared by every stage of a run

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A monotonic cancellation flag
///
/// Clones share the same flag. Once cancelled it stays cancelled; work in
/// flight is never interrupted, only checked at safe points.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();
        assert!(clone.is_cancelled());

        // Stays cancelled
        token.cancel();
        assert!(token.is_cancelled());
    }
}
