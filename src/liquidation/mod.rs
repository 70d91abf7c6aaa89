//! Liquidation of undercollateralized positions.
//!
//! - `engine`: mark / unmark / liquidate state machine and the max-burn formula
//! - `sourcing`: pure functions deciding how much collateral moves, from
//!   staked or locked sources, and how it splits between marker and liquidator

pub mod engine;
pub mod sourcing;

pub use engine::*;
pub use sourcing::*;
