//! Marketplace assembly.
//!
//! Every component receives its collaborators through its constructor;
//! nothing is looked up or rebound after [`Market::new`] returns.

use std::sync::Arc;

use tracing::{info, warn};
use zap_core::{
    Address, Amount, BlockClock, EventSink, ManualClock, MarketConfig, RecordingEventSink,
};
use zap_dispatch::Dispatch;
use zap_ledger::{InMemoryRegistry, InMemoryToken, Ledger, Registry, Roles, Token};
use zap_subscription::SubscriptionManager;

use crate::error::MarketResult;

/// A wired marketplace: one ledger shared by the dispatcher and the
/// subscription manager.
#[derive(Debug)]
pub struct Market {
    config: MarketConfig,
    ledger: Arc<Ledger>,
    dispatch: Dispatch,
    subscriptions: SubscriptionManager,
}

impl Market {
    /// Build a marketplace from `config` and its external collaborators.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::Core` if the configuration is invalid.
    pub fn new(
        config: MarketConfig,
        token: Arc<dyn Token>,
        registry: Arc<dyn Registry>,
        clock: Arc<dyn BlockClock>,
        events: Arc<dyn EventSink>,
    ) -> MarketResult<Self> {
        config.validate()?;

        let ledger = Arc::new(Ledger::new(
            config.custody.clone(),
            token,
            registry,
            config.pricing.engine(),
            Roles::from_config(&config),
            Arc::clone(&events),
        ));
        let dispatch = Dispatch::new(
            config.dispatch_agent.clone(),
            Arc::clone(&ledger),
            Arc::clone(&clock),
            Arc::clone(&events),
        );
        let subscriptions = SubscriptionManager::new(
            config.subscription_agent.clone(),
            Arc::clone(&ledger),
            clock,
            events,
        );

        info!(
            custody = %config.custody,
            pricing = %config.pricing,
            escrow_agents = config.escrow_agents().len(),
            "market assembled"
        );
        Ok(Self {
            config,
            ledger,
            dispatch,
            subscriptions,
        })
    }

    /// The configuration this market was built from.
    #[must_use]
    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// The dot ledger.
    #[must_use]
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// The query dispatcher.
    #[must_use]
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// The subscription manager.
    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }
}

/// A self-contained marketplace over in-memory collaborators, with handles to
/// each of them.
#[derive(Debug)]
pub struct LocalMarket {
    /// The wired marketplace.
    pub market: Market,
    /// Token balances.
    pub token: Arc<InMemoryToken>,
    /// Endpoint registrations.
    pub registry: Arc<InMemoryRegistry>,
    /// Block height, advanced by hand.
    pub clock: Arc<ManualClock>,
    /// Every event emitted, in order.
    pub events: Arc<RecordingEventSink>,
}

impl LocalMarket {
    /// Build a local marketplace starting at block `height`.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::Core` if the configuration is invalid.
    pub fn new(config: MarketConfig, height: u64) -> MarketResult<Self> {
        let token = Arc::new(InMemoryToken::new());
        let registry = Arc::new(InMemoryRegistry::new());
        let clock = Arc::new(ManualClock::at(height));
        let events = Arc::new(RecordingEventSink::new());
        let market = Market::new(
            config,
            token.clone(),
            registry.clone(),
            clock.clone(),
            events.clone(),
        )?;
        Ok(Self {
            market,
            token,
            registry,
            clock,
            events,
        })
    }

    /// Mint `amount` tokens to `who` and approve the ledger to spend them.
    ///
    /// Returns `false` and leaves the allowance untouched if minting would
    /// overflow the token supply.
    #[must_use]
    pub fn fund(&self, who: &Address, amount: Amount) -> bool {
        if !self.token.mint(who, amount) {
            warn!(who = %who, amount = %amount, "funding rejected: supply overflow");
            return false;
        }
        let custody = self.market.ledger().custody();
        let allowance = self
            .token
            .allowance(who, custody)
            .checked_add(amount)
            .unwrap_or(Amount::MAX);
        self.token.approve(who, custody, allowance);
        true
    }
}
