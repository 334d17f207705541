//! The query dispatcher.
//!
//! A query escrows one of the requester's dots. Answering it releases the
//! dot to the provider; canceling returns it to the requester. Queries do not
//! expire.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};
use zap_core::{Address, BlockClock, Endpoint, EventSink, MarketEvent, QueryId, QueryResponse};
use zap_ledger::Ledger;

use crate::error::{DispatchError, DispatchResult};
use crate::query::{Query, QueryStatus};

/// Dots escrowed per query.
pub const DOTS_PER_QUERY: u64 = 1;

#[derive(Debug)]
struct DispatchState {
    next_id: u64,
    queries: BTreeMap<QueryId, Query>,
}

impl Default for DispatchState {
    fn default() -> Self {
        Self {
            next_id: 1,
            queries: BTreeMap::new(),
        }
    }
}

/// Routes queries between requesters and providers.
pub struct Dispatch {
    agent: Address,
    ledger: Arc<Ledger>,
    clock: Arc<dyn BlockClock>,
    events: Arc<dyn EventSink>,
    state: Mutex<DispatchState>,
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatch")
            .field("agent", &self.agent)
            .field("queries", &self.state.lock().queries.len())
            .finish_non_exhaustive()
    }
}

impl Dispatch {
    /// Create a dispatcher acting on the ledger as escrow agent `agent`.
    #[must_use]
    pub fn new(
        agent: Address,
        ledger: Arc<Ledger>,
        clock: Arc<dyn BlockClock>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            agent,
            ledger,
            clock,
            events,
            state: Mutex::new(DispatchState::default()),
        }
    }

    /// Escrow identity this dispatcher uses on the ledger.
    #[must_use]
    pub fn agent(&self) -> &Address {
        &self.agent
    }

    /// Dispatch a query, escrowing one of `requester`'s dots.
    ///
    /// # Errors
    ///
    /// Propagates ledger errors, typically `InsufficientDots` or
    /// `UnknownEndpoint`.
    pub fn query(
        &self,
        requester: &Address,
        provider: &Address,
        endpoint: &Endpoint,
        query: impl Into<String>,
        params: Vec<String>,
    ) -> DispatchResult<QueryId> {
        let query = query.into();
        let mut state = self.state.lock();

        self.ledger
            .escrow_dots(&self.agent, requester, provider, endpoint, DOTS_PER_QUERY)?;

        let id = QueryId(state.next_id);
        state.next_id += 1;
        let created_block = self.clock.current_block();

        info!(%id, requester = %requester, provider = %provider, endpoint = %endpoint, "query dispatched");
        self.events.emit(MarketEvent::Incoming {
            id,
            provider: provider.clone(),
            requester: requester.clone(),
            endpoint: endpoint.clone(),
            query: query.clone(),
            params: params.clone(),
        });

        state.queries.insert(
            id,
            Query {
                id,
                provider: provider.clone(),
                requester: requester.clone(),
                endpoint: endpoint.clone(),
                query,
                params,
                status: QueryStatus::Pending,
                created_block,
                settled_block: None,
                response: None,
            },
        );
        Ok(id)
    }

    /// Answer a pending query. The escrowed dot goes to the provider.
    ///
    /// # Errors
    ///
    /// - `UnknownQuery` if `id` was never issued
    /// - `Unauthorized` if `caller` is not the query's provider
    /// - `AlreadyFulfilled` / `AlreadyCanceled` if the query is settled
    pub fn respond(
        &self,
        caller: &Address,
        id: QueryId,
        response: QueryResponse,
    ) -> DispatchResult<()> {
        let mut state = self.state.lock();
        let query = state
            .queries
            .get_mut(&id)
            .ok_or(DispatchError::UnknownQuery(id))?;
        query.ensure_provider(caller)?;
        query.ensure_pending()?;

        self.ledger.release_dots(
            &self.agent,
            &query.requester,
            &query.provider,
            &query.endpoint,
            DOTS_PER_QUERY,
        )?;
        query.fulfill(response.clone(), self.clock.current_block());

        info!(%id, provider = %caller, "query fulfilled");
        self.events.emit(MarketEvent::Fulfilled { id, response });
        Ok(())
    }

    /// Withdraw a pending query. The escrowed dot goes back to the requester.
    ///
    /// # Errors
    ///
    /// - `UnknownQuery` if `id` was never issued
    /// - `Unauthorized` if `caller` is not the requester
    /// - `AlreadyFulfilled` / `AlreadyCanceled` if the query is settled
    pub fn cancel_query(&self, caller: &Address, id: QueryId) -> DispatchResult<()> {
        let mut state = self.state.lock();
        let query = state
            .queries
            .get_mut(&id)
            .ok_or(DispatchError::UnknownQuery(id))?;
        query.ensure_requester(caller)?;
        query.ensure_pending()?;

        self.ledger.return_dots(
            &self.agent,
            &query.requester,
            &query.provider,
            &query.endpoint,
            DOTS_PER_QUERY,
        )?;
        query.cancel(self.clock.current_block());

        info!(%id, requester = %caller, "query canceled");
        self.events.emit(MarketEvent::Canceled { id });
        Ok(())
    }

    /// Snapshot of a query.
    #[must_use]
    pub fn get_query(&self, id: QueryId) -> Option<Query> {
        self.state.lock().queries.get(&id).cloned()
    }

    /// Status of a query.
    #[must_use]
    pub fn status(&self, id: QueryId) -> Option<QueryStatus> {
        self.state.lock().queries.get(&id).map(|q| q.status)
    }

    /// Pending queries addressed to `provider`, oldest first.
    #[must_use]
    pub fn pending_for_provider(&self, provider: &Address) -> Vec<Query> {
        let pending: Vec<Query> = self
            .state
            .lock()
            .queries
            .values()
            .filter(|q| q.status.is_pending() && &q.provider == provider)
            .cloned()
            .collect();
        debug!(provider = %provider, count = pending.len(), "listed pending queries");
        pending
    }

    /// Number of queries ever dispatched.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.state.lock().queries.len()
    }
}
