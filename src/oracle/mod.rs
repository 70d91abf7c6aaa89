//! Oracle module for price feeds.
//!
//! The core reads collateral prices through the [`PriceOracle`] trait and
//! enforces staleness itself. [`PriceRouter`] is the in-memory oracle used by
//! tests and embedders that push prices directly.

pub mod price_feed;

pub use price_feed::*;
