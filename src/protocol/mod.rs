//! Protocol module - Core state machine and orchestration.
//!
//! [`Protocol`] ties the ledgers to the token, price and access
//! collaborators and runs every user-facing operation atomically.

pub mod events;
pub mod operations;
pub mod state_machine;

pub use events::*;
pub use operations::*;
pub use state_machine::*;
