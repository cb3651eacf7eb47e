//! Cooperative cancellation for long-running rebuilds.

use crate::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How many items a loop processes between cancellation checks.
pub const CANCEL_CHECK_INTERVAL: usize = 256;

/// Shared flag checked between items of a rebuild. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Returns `Err(Error::Cancelled)` once the token has been cancelled.
    pub fn check(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Like [`check`](Self::check) but only reads the flag every
    /// [`CANCEL_CHECK_INTERVAL`] iterations.
    pub fn check_sparse(&self, iteration: usize) -> Result<(), Error> {
        if iteration % CANCEL_CHECK_INTERVAL == 0 {
            self.check()
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(token.check().is_ok());

        other.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_sparse_check_skips_between_intervals() {
        let token = CancelToken::new();
        token.cancel();
        assert!(token.check_sparse(1).is_ok());
        assert!(token.check_sparse(CANCEL_CHECK_INTERVAL).is_err());
    }
}
