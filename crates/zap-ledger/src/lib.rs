//! # zap-ledger
//!
//! The dot ledger of the Zap oracle marketplace.
//!
//! Consumers bond tokens to a provider's endpoint and receive dots priced by
//! the endpoint's bonding curve. Dots can be unbonded for a refund, or put in
//! escrow by an authorized agent and then released to the provider or
//! returned to the holder.
//!
//! The ledger depends on two collaborators, injected as trait objects:
//!
//! - [`Token`] moves fungible value ([`InMemoryToken`] for local use)
//! - [`Registry`] resolves endpoint curves and brokers ([`InMemoryRegistry`])
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use zap_core::{Address, Amount, Curve, Endpoint, Formula, NoopEventSink, StandardPricing};
//! use zap_ledger::{InMemoryRegistry, InMemoryToken, Ledger, Roles};
//!
//! let token = Arc::new(InMemoryToken::new());
//! let registry = Arc::new(InMemoryRegistry::new());
//! let provider = Address::new("oracle");
//! let endpoint = Endpoint::new("prices");
//! registry.initiate_endpoint(&provider, &endpoint, Curve::single(Formula::quadratic(0, 2), 100)?, None)?;
//!
//! let ledger = Ledger::new(
//!     Address::new("custody"),
//!     token.clone(),
//!     registry,
//!     Arc::new(StandardPricing),
//!     Roles::new(),
//!     Arc::new(NoopEventSink),
//! );
//!
//! let alice = Address::new("alice");
//! token.mint(&alice, Amount::from(1_000u64));
//! token.approve(&alice, ledger.custody(), Amount::from(1_000u64));
//!
//! let receipt = ledger.bond(&alice, &provider, &endpoint, 5)?;
//! assert_eq!(receipt.cost, Amount::from(110u64));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod ledger;
pub mod registry;
pub mod roles;
pub mod token;

pub use error::{LedgerError, LedgerResult};
pub use ledger::{BondReceipt, Ledger, UnbondReceipt};
pub use registry::{EndpointRecord, InMemoryRegistry, Registry};
pub use roles::{Role, Roles};
pub use token::{InMemoryToken, Token};
