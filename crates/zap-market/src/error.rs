//! Unified error type across marketplace components.

use thiserror::Error;
use zap_core::CoreError;
use zap_dispatch::DispatchError;
use zap_ledger::LedgerError;
use zap_subscription::SubscriptionError;

/// Result type alias for marketplace operations.
pub type MarketResult<T> = std::result::Result<T, MarketError>;

/// Any error a marketplace component can raise.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarketError {
    /// Configuration, curve or arithmetic error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Ledger error.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Query dispatch error.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Subscription error.
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
}
