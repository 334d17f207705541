//! # zap-market
//!
//! Assembles a complete Zap oracle marketplace from a [`MarketConfig`].
//!
//! [`Market::new`] wires one [`Ledger`](zap_ledger::Ledger) to a
//! [`Dispatch`](zap_dispatch::Dispatch) and a
//! [`SubscriptionManager`](zap_subscription::SubscriptionManager), granting
//! each its escrow-agent role from the configuration. [`LocalMarket`] does
//! the same over in-memory collaborators.
//!
//! ## Example
//!
//! ```rust
//! use zap_core::{Address, Amount, Curve, Endpoint, Formula, MarketConfig};
//! use zap_market::LocalMarket;
//!
//! let local = LocalMarket::new(MarketConfig::default(), 1)?;
//! let provider = Address::new("oracle");
//! let endpoint = Endpoint::new("prices");
//! local.registry.initiate_endpoint(&provider, &endpoint, Curve::single(Formula::constant(1), 100)?, None)?;
//!
//! let alice = Address::new("alice");
//! assert!(local.fund(&alice, Amount::from(10u64)));
//! local.market.ledger().bond(&alice, &provider, &endpoint, 2)?;
//! let id = local.market.dispatch().query(&alice, &provider, &endpoint, "BTC", vec![])?;
//! assert_eq!(id.0, 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod market;

pub use error::{MarketError, MarketResult};
pub use market::{LocalMarket, Market};
