//! Error types for query dispatch.

use thiserror::Error;
use zap_core::{Address, QueryId};
use zap_ledger::LedgerError;

/// Result type alias for dispatch operations.
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

/// Errors that can occur dispatching, answering or canceling queries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// No query with this id was ever issued.
    #[error("unknown query: {0}")]
    UnknownQuery(QueryId),

    /// The query was already answered.
    #[error("{0} already fulfilled")]
    AlreadyFulfilled(QueryId),

    /// The query was already canceled.
    #[error("{0} already canceled")]
    AlreadyCanceled(QueryId),

    /// The caller is not the party allowed to act on the query.
    #[error("unauthorized: {caller} is not the {required} of {id}")]
    Unauthorized {
        /// The rejected caller.
        caller: Address,
        /// The party the operation requires.
        required: &'static str,
        /// The query.
        id: QueryId,
    },

    /// The ledger rejected the escrow movement.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}
