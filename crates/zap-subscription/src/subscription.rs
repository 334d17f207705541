//! Subscription records and proration.

use serde::{Deserialize, Serialize};
use zap_core::{Address, Endpoint, Metadata};

/// A block-based subscription. One dot pays for one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Provider serving the feed.
    pub provider: Address,
    /// Paying subscriber.
    pub subscriber: Address,
    /// Endpoint subscribed to.
    pub endpoint: Endpoint,
    /// Dots escrowed up front.
    pub total_dots: u64,
    /// Block the subscription started in.
    pub start_block: u64,
    /// Endpoint parameters, updated by `pass_params`.
    pub params: Vec<String>,
    /// Subscriber metadata.
    pub metadata: Metadata,
    /// Whether the subscription is still running.
    pub active: bool,
    /// Block the subscription was ended in.
    pub ended_block: Option<u64>,
}

/// How a subscription's escrow splits between the parties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Dots owed to the provider.
    pub consumed: u64,
    /// Dots owed back to the subscriber.
    pub unused: u64,
}

impl Subscription {
    /// Settlement if the subscription ended at block `current`.
    ///
    /// The start block counts as used, so ending in the start block still
    /// consumes one dot. Consumption never exceeds `total_dots`.
    #[must_use]
    pub fn settlement_at(&self, current: u64) -> Settlement {
        let elapsed = current.saturating_sub(self.start_block).saturating_add(1);
        let consumed = elapsed.min(self.total_dots);
        Settlement {
            consumed,
            unused: self.total_dots - consumed,
        }
    }

    /// Block after which every escrowed dot is consumed.
    #[must_use]
    pub fn last_paid_block(&self) -> u64 {
        self.start_block
            .saturating_add(self.total_dots)
            .saturating_sub(1)
    }
}
