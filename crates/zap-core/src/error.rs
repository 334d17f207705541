//! Error types for zap-core.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Errors raised by the marketplace primitives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Invalid token amount (overflow, underflow, or malformed).
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Invalid address or endpoint identifier.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Curve definition was rejected at creation.
    #[error("invalid curve: {reason}")]
    InvalidCurve {
        /// Why the curve was rejected.
        reason: String,
    },

    /// The requested position lies outside every piece of the curve.
    #[error("curve undefined at dot position {position} (dot limit {limit})")]
    CurveUndefined {
        /// Requested issuance position.
        position: u64,
        /// Last position the curve prices.
        limit: u64,
    },

    /// Price arithmetic exceeded 128 bits.
    #[error("price overflow: {0}")]
    Overflow(String),

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(String),
}

impl CoreError {
    /// Create an invalid curve error.
    #[must_use]
    pub fn invalid_curve(reason: impl Into<String>) -> Self {
        Self::InvalidCurve {
            reason: reason.into(),
        }
    }

    /// Create an overflow error.
    #[must_use]
    pub fn overflow(context: impl Into<String>) -> Self {
        Self::Overflow(context.into())
    }
}
