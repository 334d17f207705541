//! Integration test crate for the Zap marketplace.
//!
//! The tests live under `tests/`. This library only holds the scenario
//! helpers they share.

#![forbid(unsafe_code)]

use tracing_subscriber::EnvFilter;
use zap_core::{Address, Amount, Curve, Endpoint, MarketConfig, PricingMode};
use zap_market::{LocalMarket, MarketResult};

/// Tokens every funded test account starts with.
pub const STARTING_BALANCE: u128 = 1_000_000_000_000_000;

/// Route `tracing` output to the test harness. Filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A local market with one registered endpoint.
pub struct Scenario {
    /// The market and its in-memory collaborators.
    pub local: LocalMarket,
    /// Provider owning the endpoint.
    pub provider: Address,
    /// The registered endpoint.
    pub endpoint: Endpoint,
}

impl Scenario {
    /// Register `curve` for `oracle/prices` on a fresh market at block 1.
    ///
    /// # Errors
    ///
    /// Fails if the market or the endpoint cannot be set up.
    pub fn new(curve: Curve, pricing: PricingMode) -> MarketResult<Self> {
        init_tracing();
        let config = MarketConfig {
            pricing,
            ..MarketConfig::default()
        };
        let local = LocalMarket::new(config, 1)?;
        let provider = Address::new("oracle");
        let endpoint = Endpoint::new("prices");
        local
            .registry
            .initiate_endpoint(&provider, &endpoint, curve, None)?;
        Ok(Self {
            local,
            provider,
            endpoint,
        })
    }

    /// A funded account named `name`.
    pub fn account(&self, name: &str) -> Address {
        let who = Address::new(name);
        assert!(
            self.local.fund(&who, Amount::from(STARTING_BALANCE)),
            "funding {name} overflowed the token supply"
        );
        who
    }

    /// `who`'s bound dots on the scenario endpoint.
    pub fn bound(&self, who: &Address) -> u64 {
        self.local
            .market
            .ledger()
            .bound_dots(who, &self.provider, &self.endpoint)
    }

    /// `who`'s escrowed dots on the scenario endpoint.
    pub fn escrowed(&self, who: &Address) -> u64 {
        self.local
            .market
            .ledger()
            .escrowed_dots(who, &self.provider, &self.endpoint)
    }

    /// Kinds of every event emitted so far.
    pub fn event_kinds(&self) -> Vec<&'static str> {
        self.local
            .events
            .events()
            .iter()
            .map(zap_core::MarketEvent::kind)
            .collect()
    }
}
