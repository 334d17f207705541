//! Query records and their lifecycle.
//!
//! ```text
//! Pending ──respond──> Fulfilled
//!    │
//!    └────cancel────> Canceled
//! ```
//!
//! Each query leaves `Pending` exactly once; both end states are terminal.

use std::fmt;

use serde::{Deserialize, Serialize};
use zap_core::{Address, Endpoint, QueryId, QueryResponse};

use crate::error::{DispatchError, DispatchResult};

/// Lifecycle state of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    /// Waiting for the provider; one dot is escrowed.
    Pending,
    /// Answered; the escrowed dot went to the provider.
    Fulfilled,
    /// Withdrawn; the escrowed dot went back to the requester.
    Canceled,
}

impl QueryStatus {
    /// Whether the query can still be answered or canceled.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Fulfilled => "fulfilled",
            Self::Canceled => "canceled",
        };
        write!(f, "{s}")
    }
}

/// A dispatched query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Unique identifier.
    pub id: QueryId,
    /// Provider expected to answer.
    pub provider: Address,
    /// Holder who paid the escrowed dot.
    pub requester: Address,
    /// Endpoint queried.
    pub endpoint: Endpoint,
    /// Query text.
    pub query: String,
    /// Endpoint parameters.
    pub params: Vec<String>,
    /// Current state.
    pub status: QueryStatus,
    /// Block the query was dispatched in.
    pub created_block: u64,
    /// Block the query left `Pending`, if it has.
    pub settled_block: Option<u64>,
    /// The provider's answer, once fulfilled.
    pub response: Option<QueryResponse>,
}

impl Query {
    /// Fail unless the query is still pending.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyFulfilled` or `AlreadyCanceled`.
    pub fn ensure_pending(&self) -> DispatchResult<()> {
        match self.status {
            QueryStatus::Pending => Ok(()),
            QueryStatus::Fulfilled => Err(DispatchError::AlreadyFulfilled(self.id)),
            QueryStatus::Canceled => Err(DispatchError::AlreadyCanceled(self.id)),
        }
    }

    /// Fail unless `caller` is the provider.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized`.
    pub fn ensure_provider(&self, caller: &Address) -> DispatchResult<()> {
        if caller == &self.provider {
            Ok(())
        } else {
            Err(DispatchError::Unauthorized {
                caller: caller.clone(),
                required: "provider",
                id: self.id,
            })
        }
    }

    /// Fail unless `caller` is the requester.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized`.
    pub fn ensure_requester(&self, caller: &Address) -> DispatchResult<()> {
        if caller == &self.requester {
            Ok(())
        } else {
            Err(DispatchError::Unauthorized {
                caller: caller.clone(),
                required: "requester",
                id: self.id,
            })
        }
    }

    pub(crate) fn fulfill(&mut self, response: QueryResponse, block: u64) {
        self.status = QueryStatus::Fulfilled;
        self.settled_block = Some(block);
        self.response = Some(response);
    }

    pub(crate) fn cancel(&mut self, block: u64) {
        self.status = QueryStatus::Canceled;
        self.settled_block = Some(block);
    }
}
