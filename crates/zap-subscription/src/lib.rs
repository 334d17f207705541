//! # zap-subscription
//!
//! Prepaid, block-based subscriptions for the Zap oracle marketplace.
//!
//! A subscriber escrows `N` dots up front to receive a feed for `N` blocks.
//! Either party may end the subscription early; the provider keeps one dot
//! per elapsed block and the rest is returned.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod manager;
pub mod subscription;

pub use error::{SubscriptionError, SubscriptionResult};
pub use manager::SubscriptionManager;
pub use subscription::{Settlement, Subscription};
