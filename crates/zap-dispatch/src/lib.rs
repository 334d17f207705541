//! # zap-dispatch
//!
//! Asynchronous request/response queries for the Zap oracle marketplace.
//!
//! A requester spends one bonded dot per query. The dot sits in escrow until
//! the provider answers ([`Dispatch::respond`], dot released to the provider)
//! or the requester withdraws ([`Dispatch::cancel_query`], dot returned).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod dispatch;
pub mod error;
pub mod query;

pub use dispatch::{DOTS_PER_QUERY, Dispatch};
pub use error::{DispatchError, DispatchResult};
pub use query::{Query, QueryStatus};
