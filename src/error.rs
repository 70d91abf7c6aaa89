//! Error types for the Athos accounting core.
//!
//! Every public operation returns [`Result`]. A failed operation leaves all
//! ledgers exactly as they were before the call.

use primitive_types::U256;
use thiserror::Error;

use crate::core::token::TransferError;

/// Result type alias for Athos operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Athos core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Validation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Amount is zero or otherwise malformed
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Invalid input parameter
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Overflow in calculation
    #[error("Arithmetic overflow in {operation}")]
    Overflow {
        /// Operation that overflowed
        operation: String,
    },

    /// Underflow in calculation
    #[error("Arithmetic underflow in {operation}")]
    Underflow {
        /// Operation that underflowed
        operation: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Collateral Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Currency no longer accepts stakes
    #[error("Currency {0} is closed")]
    CurrencyClosed(String),

    /// Currency was never registered
    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    /// Currency has no collateral domain (no debt pool / ratios)
    #[error("No collateral domain configured for {0}")]
    UnknownDomain(String),

    /// Not enough collateral for the requested operation
    #[error("Insufficient collateral: required {required}, available {available}")]
    InsufficientCollateral {
        /// Required collateral amount
        required: U256,
        /// Available collateral amount
        available: U256,
    },

    /// Remaining stake would be dust below the currency minimum
    #[error("Remaining collateral {remaining} below minimum {minimum}")]
    BelowMinimumCollateral {
        /// Balance that would remain
        remaining: U256,
        /// Currency minimum
        minimum: U256,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Debt Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Build would exceed the build capacity
    #[error("Build amount too large: requested {requested}, available {available}")]
    BuildTooLarge {
        /// Requested USD amount
        requested: U256,
        /// Remaining build capacity
        available: U256,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Liquidation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Position is not below the liquidation ratio
    #[error("Position {0} is not undercollateralized")]
    NotUndercollateralized(String),

    /// Position has not recovered to the build ratio
    #[error("Position {0} is still undercollateralized")]
    StillUndercollateralized(String),

    /// Position already carries a mark
    #[error("Position {0} is already marked")]
    AlreadyMarked(String),

    /// Position carries no mark
    #[error("Position {0} is not marked")]
    NotMarked(String),

    /// Liquidation delay has not elapsed yet
    #[error("Liquidation delay not elapsed: liquidatable at {ready_at}, now {now}")]
    DelayNotElapsed {
        /// Earliest liquidation timestamp
        ready_at: u64,
        /// Current timestamp
        now: u64,
    },

    /// Requested burn exceeds the amount that restores the build ratio
    #[error("Burn amount too large: requested {requested}, max {max}")]
    BurnTooLarge {
        /// Requested burn amount
        requested: U256,
        /// Maximum burn amount
        max: U256,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Reward Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Reward entry absent, already consumed, or owned by someone else
    #[error("Reward entry {0} not found")]
    EntryNotFound(u64),

    /// Listed locked entries cannot cover the locked draw
    #[error("Insufficient locked collateral: required {required}, available {available}")]
    InsufficientLockedCollateral {
        /// Amount that had to come from locked entries
        required: U256,
        /// Amount the listed entries hold
        available: U256,
    },

    /// Reward entry still vesting
    #[error("Unlock time {unlock_time} not reached (now {now})")]
    UnlockTimeNotReached {
        /// Entry unlock time
        unlock_time: u64,
        /// Current timestamp
        now: u64,
    },

    /// Swapped entries do not preserve the total amount
    #[error("Reward amount mismatch: removed {removed}, added {added}")]
    RewardAmountMismatch {
        /// Total of removed entries
        removed: U256,
        /// Total of new entries
        added: U256,
    },

    /// No rewarder account is configured to fund unlocks
    #[error("Rewarder account not set")]
    RewarderNotSet,

    /// Claim signatures do not match the configured reward signers
    #[error("Invalid reward signature for period {0}")]
    InvalidSignature(u64),

    /// Reward period is still running
    #[error("Reward period {period_id} not ended (current period {current})")]
    PeriodNotEnded {
        /// Claimed period
        period_id: u64,
        /// Period containing the current time
        current: u64,
    },

    /// Claim window of the period has passed
    #[error("Reward for period {period_id} expired (current period {current})")]
    RewardExpired {
        /// Claimed period
        period_id: u64,
        /// Period containing the current time
        current: u64,
    },

    /// Recipient's native position is above the build ratio
    #[error("Position {0} is below the target collateral ratio")]
    BelowTargetRatio(String),

    /// Period reward already claimed by this recipient
    #[error("Reward for period {period_id} already claimed by {account}")]
    RewardAlreadyClaimed {
        /// Recipient
        account: String,
        /// Claimed period
        period_id: u64,
    },

    /// No fee pool account is configured to pay fee rewards
    #[error("Fee pool account not set")]
    FeePoolNotSet,

    // ═══════════════════════════════════════════════════════════════════
    // Oracle Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Price is stale (not updated recently)
    #[error("Price for {currency} is stale: last update {last_update}s ago, max allowed {max_age}s")]
    StalePrice {
        /// Currency symbol
        currency: String,
        /// Seconds since last update
        last_update: u64,
        /// Maximum allowed age in seconds
        max_age: u64,
    },

    /// Oracle has no price for the currency
    #[error("No price available for {0}")]
    PriceNotFound(String),

    // ═══════════════════════════════════════════════════════════════════
    // Authorization & External Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Caller lacks the required capability
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Token collaborator rejected a transfer
    #[error("Token transfer failed: {0}")]
    TransferFailed(#[from] TransferError),

    /// Key or signature handling failed
    #[error("Cryptographic error in {operation}: {details}")]
    CryptoError {
        /// Operation that failed
        operation: String,
        /// Error details
        details: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Protocol & Internal Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invariant violation detected
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl Error {
    /// Returns true if resubmitting later may succeed without changing the input
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InsufficientCollateral { .. }
                | Error::StalePrice { .. }
                | Error::DelayNotElapsed { .. }
                | Error::UnlockTimeNotReached { .. }
                | Error::StillUndercollateralized(_)
                | Error::NotUndercollateralized(_)
                | Error::TransferFailed(_)
                | Error::PeriodNotEnded { .. }
                | Error::BelowTargetRatio(_)
        )
    }

    /// Returns true if this is a critical error requiring immediate attention
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Error::InvariantViolation(_) | Error::Overflow { .. } | Error::Underflow { .. }
        )
    }

    /// Returns the error code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // Validation errors: 1xxx
            Error::InvalidAmount(_) => 1001,
            Error::InvalidParameter { .. } => 1002,
            Error::Overflow { .. } => 1003,
            Error::Underflow { .. } => 1004,

            // Collateral errors: 2xxx
            Error::CurrencyClosed(_) => 2001,
            Error::UnknownCurrency(_) => 2002,
            Error::UnknownDomain(_) => 2003,
            Error::InsufficientCollateral { .. } => 2004,
            Error::BelowMinimumCollateral { .. } => 2005,

            // Debt errors: 3xxx
            Error::BuildTooLarge { .. } => 3001,

            // Liquidation errors: 4xxx
            Error::NotUndercollateralized(_) => 4001,
            Error::StillUndercollateralized(_) => 4002,
            Error::AlreadyMarked(_) => 4003,
            Error::NotMarked(_) => 4004,
            Error::DelayNotElapsed { .. } => 4005,
            Error::BurnTooLarge { .. } => 4006,

            // Reward errors: 5xxx
            Error::EntryNotFound(_) => 5001,
            Error::InsufficientLockedCollateral { .. } => 5002,
            Error::UnlockTimeNotReached { .. } => 5003,
            Error::RewardAmountMismatch { .. } => 5004,
            Error::RewarderNotSet => 5005,
            Error::InvalidSignature(_) => 5006,
            Error::PeriodNotEnded { .. } => 5007,
            Error::RewardExpired { .. } => 5008,
            Error::BelowTargetRatio(_) => 5009,
            Error::RewardAlreadyClaimed { .. } => 5010,
            Error::FeePoolNotSet => 5011,

            // Oracle errors: 6xxx
            Error::StalePrice { .. } => 6001,
            Error::PriceNotFound(_) => 6002,

            // Authorization & external errors: 7xxx
            Error::Unauthorized(_) => 7001,
            Error::TransferFailed(_) => 7002,
            Error::CryptoError { .. } => 7003,

            // Protocol & internal errors: 9xxx
            Error::Config(_) => 9001,
            Error::InvariantViolation(_) => 9002,
            Error::Serialization(_) => 9003,
            Error::Deserialization(_) => 9004,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_unique() {
        let codes = vec![
            Error::InvalidAmount("".into()).code(),
            Error::CurrencyClosed("".into()).code(),
            Error::InsufficientCollateral { required: U256::zero(), available: U256::zero() }.code(),
            Error::BuildTooLarge { requested: U256::zero(), available: U256::zero() }.code(),
            Error::BurnTooLarge { requested: U256::zero(), max: U256::zero() }.code(),
            Error::EntryNotFound(1).code(),
            Error::NotMarked("".into()).code(),
            Error::AlreadyMarked("".into()).code(),
            Error::StalePrice { currency: "".into(), last_update: 0, max_age: 0 }.code(),
            Error::Unauthorized("".into()).code(),
            Error::InvalidSignature(1).code(),
            Error::PeriodNotEnded { period_id: 1, current: 1 }.code(),
            Error::RewardExpired { period_id: 1, current: 4 }.code(),
            Error::RewardAlreadyClaimed { account: "".into(), period_id: 1 }.code(),
            Error::CryptoError { operation: "".into(), details: "".into() }.code(),
            Error::TransferFailed(TransferError::Rejected("".into())).code(),
            Error::InvariantViolation("".into()).code(),
        ];

        let mut unique_codes = codes.clone();
        unique_codes.sort();
        unique_codes.dedup();

        assert_eq!(codes.len(), unique_codes.len(), "Error codes must be unique");
    }

    #[test]
    fn test_error_display() {
        let err = Error::BurnTooLarge {
            requested: U256::from(1001u64),
            max: U256::from(1000u64),
        };
        assert!(err.to_string().contains("1001"));
        assert!(err.to_string().contains("1000"));
    }

    #[test]
    fn test_transfer_error_is_surfaced_verbatim() {
        let inner = TransferError::Rejected("allowance exhausted".into());
        let err: Error = inner.clone().into();
        assert_eq!(err, Error::TransferFailed(inner));
        assert!(err.to_string().contains("allowance exhausted"));
    }

    #[test]
    fn test_classification() {
        assert!(Error::DelayNotElapsed { ready_at: 10, now: 5 }.is_recoverable());
        assert!(!Error::EntryNotFound(3).is_recoverable());
        assert!(Error::Overflow { operation: "test".into() }.is_critical());
        assert!(!Error::NotMarked("test".into()).is_critical());
    }
}
