//! Error types for subscriptions.

use thiserror::Error;
use zap_core::{Address, EndpointKey};
use zap_ledger::LedgerError;

/// Result type alias for subscription operations.
pub type SubscriptionResult<T> = std::result::Result<T, SubscriptionError>;

/// Errors that can occur managing subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// The subscriber already has an active subscription to this endpoint.
    #[error("{subscriber} already subscribed to {endpoint}")]
    AlreadyActive {
        /// The subscriber.
        subscriber: Address,
        /// The endpoint.
        endpoint: EndpointKey,
    },

    /// There is no active subscription to act on.
    #[error("{subscriber} has no active subscription to {endpoint}")]
    NoActiveSubscription {
        /// The subscriber.
        subscriber: Address,
        /// The endpoint.
        endpoint: EndpointKey,
    },

    /// The caller is neither party to the subscription.
    #[error("unauthorized: {caller} is not a party to this subscription")]
    Unauthorized {
        /// The rejected caller.
        caller: Address,
    },

    /// Dot count was zero.
    #[error("invalid dot count: {0}")]
    InvalidDotCount(String),

    /// The ledger rejected the escrow movement.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}
