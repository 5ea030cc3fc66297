//! Cooperative cancellation for CPU-bound scans.
//!
//! Scans run on the blocking pool and cannot be aborted from outside, so they
//! poll a [`CancellationToken`] while iterating.
//!
//! ## Sparse Checking
//!
//! For loops over large snapshots, `is_cancelled_sparse()` only checks every
//! 1,024 iterations to keep the token's lock off the hot path.

use tokio_util::sync::CancellationToken;

/// How often long-running loops should check whether execution was cancelled.
/// Using a power of 2 allows efficient modulo via bitwise AND.
pub const CANCEL_CHECK_INTERVAL: usize = 0x400; // 1,024

/// A scan-side view of a cancellation token.
#[derive(Clone, Debug, Default)]
pub struct ScanCancel {
    token: CancellationToken,
}

impl ScanCancel {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// A token that nothing ever cancels.
    pub fn noop() -> Self {
        Self::default()
    }

    /// Returns `Some(())` while still active, `None` once cancelled.
    /// This enables use with the `?` operator for early returns.
    #[inline]
    pub fn is_cancelled(&self) -> Option<()> {
        if self.token.is_cancelled() {
            None
        } else {
            Some(())
        }
    }

    /// Only consults the token every `CANCEL_CHECK_INTERVAL` iterations.
    #[inline]
    pub fn is_cancelled_sparse(&self, counter: usize) -> Option<()> {
        if counter & (CANCEL_CHECK_INTERVAL - 1) == 0 {
            self.is_cancelled()
        } else {
            Some(())
        }
    }
}
