//! # zap-core
//!
//! Primitives for the Zap data-oracle marketplace.
//!
//! This crate provides:
//!
//! - [`Address`], [`Endpoint`]: participant and data-feed identifiers
//! - [`Amount`]: 128-bit token amounts with checked arithmetic
//! - [`Curve`]: validated piecewise bonding curves
//! - [`PricingEngine`]: pluggable pricing strategies over a curve
//! - [`BlockClock`]: block height source for subscriptions
//! - [`MarketEvent`], [`EventSink`]: records for off-chain observers
//! - [`MarketConfig`]: startup configuration
//!
//! ## Example
//!
//! ```rust
//! use zap_core::{Curve, Formula, PricingEngine, StandardPricing};
//!
//! // 2x² on positions 1..=100
//! let curve = Curve::single(Formula::quadratic(0, 2), 100)?;
//! let cost = StandardPricing.cost_of_run(&curve, 1, 5)?;
//! assert_eq!(cost.base_units(), 110);
//! # Ok::<(), zap_core::CoreError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod address;
pub mod amount;
pub mod clock;
pub mod config;
pub mod curve;
pub mod error;
pub mod events;
pub mod pricing;

pub use address::{Address, Endpoint, EndpointKey, HolderKey};
pub use amount::Amount;
pub use clock::{BlockClock, ManualClock};
pub use config::MarketConfig;
pub use curve::{Curve, Formula, Piece};
pub use error::{CoreError, CoreResult};
pub use events::{
    EventRecord, EventSink, MarketEvent, Metadata, NoopEventSink, QueryId, QueryResponse,
    RecordingEventSink, TracingEventSink,
};
pub use pricing::{ClosedFormPricing, PricingEngine, PricingMode, StandardPricing};
