//! Block height source.
//!
//! Subscriptions are metered in blocks. Components read the height through
//! [`BlockClock`] so tests and simulations can drive it by hand.

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of the current block height.
pub trait BlockClock: Send + Sync {
    /// The current block number.
    fn current_block(&self) -> u64;
}

/// A clock advanced explicitly by calling [`ManualClock::mine`].
#[derive(Debug, Default)]
pub struct ManualClock {
    height: AtomicU64,
}

impl ManualClock {
    /// Create a clock at the given height.
    #[must_use]
    pub const fn at(height: u64) -> Self {
        Self {
            height: AtomicU64::new(height),
        }
    }

    /// Advance by `blocks` and return the new height.
    pub fn mine(&self, blocks: u64) -> u64 {
        self.height.fetch_add(blocks, Ordering::SeqCst) + blocks
    }
}

impl BlockClock for ManualClock {
    fn current_block(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }
}
