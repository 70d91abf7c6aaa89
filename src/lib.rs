//! # Athos Core
//!
//! Accounting core of a multi-collateral synthetic asset protocol. Users stake
//! collateral, build synthetic USD debt against it and get liquidated when
//! their collateralization ratio falls too far.
//!
//! ## Architecture
//!
//! - **Core**: identifiers, configuration and the ledgers (collateral,
//!   locked rewards, debt shares) plus the mint/burn gateway
//! - **Rewards**: signer-attested period rewards locked or paid on claim
//! - **Liquidation**: marking, the max-burn formula and collateral sourcing
//!   from staked and locked balances
//! - **Oracle**: price lookup with staleness checks
//! - **Access**: capability registry gating ledger mutations
//! - **Protocol**: the orchestrator running every operation atomically
//!
//! All amounts are 18-decimal fixed-point [`U256`](primitive_types::U256)
//! values. Intermediate products use 512 bits and every division floors.
//!
//! ## Example
//!
//! ```rust,ignore
//! use athos::prelude::*;
//!
//! let mut protocol = Protocol::new(config, tokens, oracle, access)?;
//! protocol.stake(&alice, &ath, wad(1000))?;
//! protocol.build(&alice, &ath, wad(20))?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod access;
pub mod core;
pub mod error;
pub mod liquidation;
pub mod oracle;
pub mod protocol;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::access::{AccessControl, AccessController, Capability};
    pub use crate::core::{
        build_burn::{BuildBurnGateway, DebtChange},
        collateral::CollateralLedger,
        config::{DomainParams, ProtocolConfig, RewardSchedule},
        debt::DebtLedger,
        position::Position,
        reward_system::{RewardClaim, RewardSystem},
        rewards::{RewardEntry, RewardLocker},
        token::{DebtValuation, InMemoryTokens, TokenGateway, TransferError},
        types::{Account, CurrencyKey, Timestamp},
    };
    pub use crate::error::{Error, Result};
    pub use crate::liquidation::{
        engine::{LiquidationEngine, LiquidationMark, LiquidationOutcome},
        sourcing::{CollateralSplit, LiquidationAmounts},
    };
    pub use crate::oracle::price_feed::{PriceData, PriceOracle, PriceRouter};
    pub use crate::protocol::{
        events::{EventLog, ProtocolEvent},
        operations::{OperationResult, ProtocolOperation},
        state_machine::{InMemoryProtocol, LedgerState, Protocol},
    };
    pub use crate::utils::crypto::{PrivateKey, PublicKey, Signature};
    pub use crate::utils::math::{format_wad, parse_wad, wad};
    pub use primitive_types::U256;
}

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol name
pub const PROTOCOL_NAME: &str = "Athos";
