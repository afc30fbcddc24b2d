//! Duplicate-call collapsing.
//!
//! # Responsibilities
//! - Process-wide single-flight: identical concurrent calls share one
//!   execution ([`InflightRegistry`])
//! - Unit-of-work memoization: repeated identical calls within one
//!   caller-owned scope replay the first result ([`MemoMap`])
//!
//! # Design Decisions
//! - Both registries store `Shared` futures keyed by string, so a
//!   follower that arrives mid-flight awaits the same execution rather
//!   than racing a second one. Errors replay to every waiter, which is
//!   why [`Error`](crate::error::Error) is `Clone`.
//! - Single-flight entries evict themselves when the call settles;
//!   memo entries live as long as the map the caller holds.

pub mod inflight;
pub mod memo;

pub use inflight::InflightRegistry;
pub use memo::MemoMap;

use futures_util::future::{BoxFuture, Shared};

use crate::pipeline::Outcome;

pub(crate) type SharedCall = Shared<BoxFuture<'static, Outcome>>;
