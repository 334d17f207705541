//! Subscription lifecycle.
//!
//! Initiating a subscription escrows all of its dots at once. Ending it,
//! by either party, splits the escrow: one dot per block elapsed goes to the
//! provider, the remainder goes back to the subscriber. Both halves settle in
//! a single ledger call.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use zap_core::{
    Address, BlockClock, Endpoint, EndpointKey, EventSink, HolderKey, MarketEvent, Metadata,
};
use zap_ledger::Ledger;

use crate::error::{SubscriptionError, SubscriptionResult};
use crate::subscription::{Settlement, Subscription};

/// Runs block-based subscriptions against the ledger.
pub struct SubscriptionManager {
    agent: Address,
    ledger: Arc<Ledger>,
    clock: Arc<dyn BlockClock>,
    events: Arc<dyn EventSink>,
    subscriptions: Mutex<HashMap<HolderKey, Subscription>>,
}

impl std::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("agent", &self.agent)
            .field("subscriptions", &self.subscriptions.lock().len())
            .finish_non_exhaustive()
    }
}

fn key(provider: &Address, subscriber: &Address, endpoint: &Endpoint) -> HolderKey {
    EndpointKey::new(provider, endpoint).holder(subscriber)
}

impl SubscriptionManager {
    /// Create a manager acting on the ledger as escrow agent `agent`.
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
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Escrow identity this manager uses on the ledger.
    #[must_use]
    pub fn agent(&self) -> &Address {
        &self.agent
    }

    /// Start a subscription, escrowing `total_dots` of the subscriber's dots.
    ///
    /// # Errors
    ///
    /// - `InvalidDotCount` if `total_dots` is zero
    /// - `AlreadyActive` if an active subscription exists
    /// - ledger errors such as `InsufficientDots` or `UnknownEndpoint`
    pub fn initiate_subscription(
        &self,
        provider: &Address,
        subscriber: &Address,
        endpoint: &Endpoint,
        params: Vec<String>,
        metadata: Metadata,
        total_dots: u64,
    ) -> SubscriptionResult<Subscription> {
        if total_dots == 0 {
            return Err(SubscriptionError::InvalidDotCount(
                "subscription needs at least one dot".to_string(),
            ));
        }
        let key = key(provider, subscriber, endpoint);
        let mut subscriptions = self.subscriptions.lock();
        if subscriptions.get(&key).is_some_and(|s| s.active) {
            return Err(SubscriptionError::AlreadyActive {
                subscriber: subscriber.clone(),
                endpoint: key.endpoint_key(),
            });
        }

        self.ledger
            .escrow_dots(&self.agent, subscriber, provider, endpoint, total_dots)?;

        let subscription = Subscription {
            provider: provider.clone(),
            subscriber: subscriber.clone(),
            endpoint: endpoint.clone(),
            total_dots,
            start_block: self.clock.current_block(),
            params,
            metadata,
            active: true,
            ended_block: None,
        };

        info!(
            provider = %provider,
            subscriber = %subscriber,
            endpoint = %endpoint,
            total_dots,
            start_block = subscription.start_block,
            paid_through = subscription.last_paid_block(),
            "subscription initiated"
        );
        self.events.emit(MarketEvent::SubscriptionInitiated {
            provider: provider.clone(),
            subscriber: subscriber.clone(),
            endpoint: endpoint.clone(),
            total_dots,
            start_block: subscription.start_block,
            params: subscription.params.clone(),
            metadata: subscription.metadata.clone(),
        });

        subscriptions.insert(key, subscription.clone());
        Ok(subscription)
    }

    /// End an active subscription and settle its escrow.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` if `caller` is neither provider nor subscriber
    /// - `NoActiveSubscription` if there is nothing to end
    /// - ledger errors if settlement fails
    pub fn end_subscription(
        &self,
        caller: &Address,
        provider: &Address,
        subscriber: &Address,
        endpoint: &Endpoint,
    ) -> SubscriptionResult<Settlement> {
        if caller != provider && caller != subscriber {
            warn!(caller = %caller, provider = %provider, subscriber = %subscriber, "rejected subscription end");
            return Err(SubscriptionError::Unauthorized {
                caller: caller.clone(),
            });
        }
        let key = key(provider, subscriber, endpoint);
        let mut subscriptions = self.subscriptions.lock();
        let subscription = subscriptions
            .get_mut(&key)
            .filter(|s| s.active)
            .ok_or_else(|| SubscriptionError::NoActiveSubscription {
                subscriber: subscriber.clone(),
                endpoint: key.endpoint_key(),
            })?;

        let current = self.clock.current_block();
        let settlement = subscription.settlement_at(current);
        self.ledger.settle_escrow(
            &self.agent,
            subscriber,
            provider,
            endpoint,
            settlement.consumed,
            settlement.unused,
        )?;
        subscription.active = false;
        subscription.ended_block = Some(current);

        info!(
            provider = %provider,
            subscriber = %subscriber,
            endpoint = %endpoint,
            consumed = settlement.consumed,
            unused = settlement.unused,
            ended_by = %caller,
            "subscription ended"
        );
        self.events.emit(MarketEvent::SubscriptionEnded {
            provider: provider.clone(),
            subscriber: subscriber.clone(),
            endpoint: endpoint.clone(),
            consumed: settlement.consumed,
            unused: settlement.unused,
            ended_by: caller.clone(),
        });
        Ok(settlement)
    }

    /// Forward new endpoint parameters to the provider of an active subscription.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveSubscription` if `subscriber` has no active
    /// subscription to the endpoint.
    pub fn pass_params(
        &self,
        subscriber: &Address,
        provider: &Address,
        endpoint: &Endpoint,
        params: Vec<String>,
    ) -> SubscriptionResult<()> {
        let key = key(provider, subscriber, endpoint);
        let mut subscriptions = self.subscriptions.lock();
        let subscription = subscriptions
            .get_mut(&key)
            .filter(|s| s.active)
            .ok_or_else(|| SubscriptionError::NoActiveSubscription {
                subscriber: subscriber.clone(),
                endpoint: key.endpoint_key(),
            })?;
        subscription.params.clone_from(&params);

        debug!(subscriber = %subscriber, endpoint = %key.endpoint_key(), count = params.len(), "params passed");
        self.events.emit(MarketEvent::ParamsPassed {
            provider: provider.clone(),
            subscriber: subscriber.clone(),
            endpoint: endpoint.clone(),
            params,
        });
        Ok(())
    }

    /// The latest subscription record for the triple, active or ended.
    #[must_use]
    pub fn subscription(
        &self,
        provider: &Address,
        subscriber: &Address,
        endpoint: &Endpoint,
    ) -> Option<Subscription> {
        self.subscriptions
            .lock()
            .get(&key(provider, subscriber, endpoint))
            .cloned()
    }

    /// What ending the subscription now would settle.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveSubscription` if there is no active subscription.
    pub fn settlement_preview(
        &self,
        provider: &Address,
        subscriber: &Address,
        endpoint: &Endpoint,
    ) -> SubscriptionResult<Settlement> {
        let key = key(provider, subscriber, endpoint);
        self.subscriptions
            .lock()
            .get(&key)
            .filter(|s| s.active)
            .map(|s| s.settlement_at(self.clock.current_block()))
            .ok_or_else(|| SubscriptionError::NoActiveSubscription {
                subscriber: subscriber.clone(),
                endpoint: key.endpoint_key(),
            })
    }

    /// Active subscriptions served by `provider`.
    #[must_use]
    pub fn active_for_provider(&self, provider: &Address) -> Vec<Subscription> {
        let mut active: Vec<Subscription> = self
            .subscriptions
            .lock()
            .values()
            .filter(|s| s.active && &s.provider == provider)
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            (a.start_block, &a.subscriber, &a.endpoint).cmp(&(b.start_block, &b.subscriber, &b.endpoint))
        });
        active
    }
}
