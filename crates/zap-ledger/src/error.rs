//! Error types for ledger operations.

use thiserror::Error;
use zap_core::{Address, Amount, CoreError, EndpointKey};

/// Result type alias for ledger operations.
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur in ledger operations.
///
/// Every failing operation leaves balances and issuance untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// No curve is registered for the endpoint.
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(EndpointKey),

    /// The registry already holds a curve for the endpoint.
    #[error("curve already defined for {0}")]
    CurveExists(EndpointKey),

    /// The curve cannot be removed while dots are issued against it.
    #[error("curve for {key} is in use: {issued} dots issued")]
    CurveInUse {
        /// The endpoint.
        key: EndpointKey,
        /// Dots currently issued.
        issued: u64,
    },

    /// The token collaborator rejected a transfer.
    #[error("insufficient funds: {account} cannot move {required}")]
    InsufficientFunds {
        /// Account whose transfer was rejected.
        account: Address,
        /// Amount that was requested.
        required: Amount,
    },

    /// The holder's bound balance is too small.
    #[error("insufficient dots: {holder} has {available}, needs {required}")]
    InsufficientDots {
        /// The holder.
        holder: Address,
        /// Bound (un-escrowed) dots available.
        available: u64,
        /// Dots requested.
        required: u64,
    },

    /// The holder's escrowed balance is too small.
    #[error("insufficient escrow: {holder} has {available} escrowed, needs {required}")]
    InsufficientEscrow {
        /// The holder.
        holder: Address,
        /// Escrowed dots available.
        available: u64,
        /// Dots requested.
        required: u64,
    },

    /// The caller lacks the role the operation requires.
    #[error("unauthorized: {caller} is not {required}")]
    Unauthorized {
        /// The rejected caller.
        caller: Address,
        /// Description of the required role.
        required: String,
    },

    /// Dot count was zero or otherwise unusable.
    #[error("invalid dot count: {0}")]
    InvalidDotCount(String),

    /// Pricing or arithmetic failure.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl LedgerError {
    /// Create an unauthorized error.
    #[must_use]
    pub fn unauthorized(caller: &Address, required: impl Into<String>) -> Self {
        Self::Unauthorized {
            caller: caller.clone(),
            required: required.into(),
        }
    }
}
