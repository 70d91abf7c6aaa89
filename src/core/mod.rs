//! Core modules for the Athos protocol.
//!
//! This module contains the fundamental building blocks:
//! - Identifier types and configuration
//! - Collateral, locked-reward and debt-share ledgers
//! - Position valuation and the mint/burn gateway
//! - Signed period rewards
//! - Token collaborator interface

pub mod build_burn;
pub mod collateral;
pub mod config;
pub mod debt;
pub mod position;
pub mod reward_system;
pub mod rewards;
pub mod token;
pub mod types;

pub use build_burn::*;
pub use collateral::*;
pub use config::*;
pub use debt::*;
pub use position::*;
pub use reward_system::*;
pub use rewards::*;
pub use token::*;
pub use types::*;
