//! Input validation utilities for the Athos core.
//!
//! This module provides validation functions to ensure inputs meet
//! protocol requirements before any ledger is touched.

use std::collections::BTreeSet;

use primitive_types::U256;

use crate::error::{Error, Result};
use crate::utils::constants::*;
use crate::utils::math::UNIT;

// ═══════════════════════════════════════════════════════════════════════════════
// AMOUNT VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate that an amount is non-zero
pub fn validate_non_zero(amount: U256, name: &str) -> Result<()> {
    if amount.is_zero() {
        return Err(Error::InvalidAmount(format!("{} must be greater than zero", name)));
    }
    Ok(())
}

/// Validate a reward entry fits the locker's packed representation
pub fn validate_reward_entry(amount: U256, unlock_time: u64) -> Result<()> {
    validate_non_zero(amount, "reward amount")?;

    if amount.bits() > REWARD_AMOUNT_BITS {
        return Err(Error::Overflow {
            operation: format!("reward amount {} exceeds {} bits", amount, REWARD_AMOUNT_BITS),
        });
    }

    if unlock_time > MAX_UNLOCK_TIME {
        return Err(Error::Overflow {
            operation: format!("unlock time {} exceeds {} bits", unlock_time, UNLOCK_TIME_BITS),
        });
    }

    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// RATIO VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate that a ratio lies in `(0, 1]`
pub fn validate_ratio_bounds(ratio: U256, name: &str) -> Result<()> {
    if ratio.is_zero() || ratio > UNIT {
        return Err(Error::InvalidParameter {
            name: name.into(),
            reason: format!("ratio {} outside (0, 1]", crate::utils::math::format_wad(ratio)),
        });
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate a price timestamp is not stale
///
/// Timestamps ahead of `current_time` count as fresh.
pub fn validate_price_freshness(
    currency: &str,
    updated_at: u64,
    current_time: u64,
    max_age: u64,
) -> Result<()> {
    let age = current_time.saturating_sub(updated_at);
    if age > max_age {
        return Err(Error::StalePrice {
            currency: currency.into(),
            last_update: age,
            max_age,
        });
    }
    Ok(())
}

/// Validate a price is usable as a divisor
pub fn validate_price(currency: &str, price: U256) -> Result<()> {
    if price.is_zero() {
        return Err(Error::InvalidParameter {
            name: format!("price of {}", currency),
            reason: "price cannot be zero".into(),
        });
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// BATCH VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate that parallel argument lists have the same length
pub fn validate_same_length(name: &str, lengths: &[usize]) -> Result<()> {
    if lengths.windows(2).any(|w| w[0] != w[1]) {
        return Err(Error::InvalidParameter {
            name: name.into(),
            reason: format!("length mismatch {:?}", lengths),
        });
    }
    Ok(())
}

/// Validate that a list of entry ids has no duplicates
pub fn validate_unique_ids(ids: &[u64]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(*id) {
            return Err(Error::InvalidParameter {
                name: "entry_ids".into(),
                reason: format!("entry {} listed more than once", id),
            });
        }
    }
    Ok(())
}
