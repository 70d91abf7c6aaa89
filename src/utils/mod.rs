//! Utility modules for the Athos core.
//!
//! This module contains shared utilities used across the protocol:
//! - Constants and default parameters
//! - Fixed-point (wad) arithmetic
//! - Validation helpers
//! - Signing keys and signatures for reward claims

pub mod constants;
pub mod crypto;
pub mod math;
pub mod validation;

pub use constants::*;
pub use crypto::*;
pub use math::*;
pub use validation::*;
