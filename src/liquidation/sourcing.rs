//! Collateral sourcing for liquidations.
//!
//! Pure functions: given the burn amount, price and the liquidated account's
//! staked balance and locked entries, work out how much collateral moves,
//! where it comes from and who receives which part. Nothing here touches a
//! ledger.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::core::config::DomainParams;
use crate::core::rewards::RewardEntry;
use crate::core::types::Timestamp;
use crate::error::{Error, Result};
use crate::utils::math::*;

// ═══════════════════════════════════════════════════════════════════════════════
// AMOUNTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Collateral owed for a given burn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationAmounts {
    /// Collateral worth the burnt debt
    pub principal: U256,
    /// Reward for the account that marked the position
    pub marker_reward: U256,
    /// Reward for the liquidator on top of the principal
    pub liquidator_reward: U256,
}

impl LiquidationAmounts {
    /// Principal plus both rewards
    pub fn total(&self) -> Result<U256> {
        safe_add(safe_add(self.principal, self.marker_reward)?, self.liquidator_reward)
    }
}

/// Convert a USD burn into collateral units and rewards
pub fn liquidation_amounts(burn_amount: U256, price: U256, params: &DomainParams) -> Result<LiquidationAmounts> {
    let principal = divide_decimal(burn_amount, price)?;
    Ok(LiquidationAmounts {
        principal,
        marker_reward: multiply_decimal(principal, params.marker_reward_ratio)?,
        liquidator_reward: multiply_decimal(principal, params.liquidator_reward_ratio)?,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// STAKED / LOCKED SPLIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Where the collateral comes from and who receives it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CollateralSplit {
    /// Taken from staked collateral
    pub staked_sourced: U256,
    /// Taken from locked reward entries
    pub locked_sourced: U256,
    /// Principal covered by staked collateral
    pub principal_from_staked: U256,
    /// Principal covered by locked collateral
    pub principal_from_locked: U256,
    /// Marker reward paid from staked collateral
    pub marker_from_staked: U256,
    /// Marker reward paid from locked collateral
    pub marker_from_locked: U256,
    /// Liquidator reward paid from staked collateral
    pub liquidator_reward_from_staked: U256,
    /// Liquidator reward paid from locked collateral
    pub liquidator_reward_from_locked: U256,
}

impl CollateralSplit {
    /// Staked collateral credited to the liquidator
    pub fn liquidator_staked(&self) -> Result<U256> {
        safe_add(self.principal_from_staked, self.liquidator_reward_from_staked)
    }

    /// Locked collateral credited to the liquidator
    pub fn liquidator_locked(&self) -> Result<U256> {
        safe_add(self.principal_from_locked, self.liquidator_reward_from_locked)
    }
}

/// Split the owed collateral between staked and locked sources
///
/// Staked collateral pays the principal first; whatever staked collateral is
/// left over pays the rewards in proportion `marker : liquidator`. Locked
/// collateral covers the rest.
pub fn split_collateral(amounts: &LiquidationAmounts, staked: U256) -> Result<CollateralSplit> {
    let total = amounts.total()?;
    let staked_sourced = staked.min(total);
    let locked_sourced = safe_sub(total, staked_sourced)?;

    let principal_from_staked = staked_sourced.min(amounts.principal);
    let principal_from_locked = safe_sub(amounts.principal, principal_from_staked)?;

    let reward_from_staked = safe_sub(staked_sourced, principal_from_staked)?;
    let reward_total = safe_add(amounts.marker_reward, amounts.liquidator_reward)?;
    let marker_from_staked = if reward_total.is_zero() {
        U256::zero()
    } else {
        safe_mul_div(reward_from_staked, amounts.marker_reward, reward_total)?
    };
    let liquidator_reward_from_staked = safe_sub(reward_from_staked, marker_from_staked)?;

    Ok(CollateralSplit {
        staked_sourced,
        locked_sourced,
        principal_from_staked,
        principal_from_locked,
        marker_from_staked,
        marker_from_locked: safe_sub(amounts.marker_reward, marker_from_staked)?,
        liquidator_reward_from_staked,
        liquidator_reward_from_locked: safe_sub(amounts.liquidator_reward, liquidator_reward_from_staked)?,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOCKED ENTRY DRAW
// ═══════════════════════════════════════════════════════════════════════════════

/// Consumption of one source entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDraw {
    /// Source entry id
    pub entry_id: u64,
    /// Unlock time inherited by the new entries
    pub unlock_time: Timestamp,
    /// Amount taken from the source entry
    pub taken: U256,
    /// Amount left in the source entry
    pub remaining: U256,
    /// Part of `taken` going to the marker
    pub marker_amount: U256,
    /// Part of `taken` going to the liquidator
    pub liquidator_amount: U256,
}

/// Draw `locked_sourced` from `entries` strictly in order
///
/// The marker's share of each draw follows a running floor of
/// `taken_so_far * marker_locked / locked_sourced`, so the per-recipient
/// totals come out exact and no share exceeds its source entry. Entries past
/// the point where the draw is covered are not consumed.
pub fn draw_locked_entries(
    entries: &[RewardEntry],
    locked_sourced: U256,
    marker_locked: U256,
) -> Result<Vec<EntryDraw>> {
    if locked_sourced.is_zero() {
        return Ok(Vec::new());
    }
    if marker_locked > locked_sourced {
        return Err(Error::InvalidParameter {
            name: "marker_locked".into(),
            reason: format!("{} exceeds locked draw {}", marker_locked, locked_sourced),
        });
    }

    let mut available = U256::zero();
    for entry in entries {
        available = safe_add(available, entry.amount)?;
    }
    if available < locked_sourced {
        return Err(Error::InsufficientLockedCollateral {
            required: locked_sourced,
            available,
        });
    }

    let mut draws = Vec::new();
    let mut drawn = U256::zero();
    let mut marker_so_far = U256::zero();

    for entry in entries {
        if drawn == locked_sourced {
            break;
        }
        let taken = entry.amount.min(safe_sub(locked_sourced, drawn)?);
        if taken.is_zero() {
            continue;
        }
        drawn = safe_add(drawn, taken)?;

        let marker_cumulative = safe_mul_div(drawn, marker_locked, locked_sourced)?;
        let marker_amount = safe_sub(marker_cumulative, marker_so_far)?;
        marker_so_far = marker_cumulative;

        draws.push(EntryDraw {
            entry_id: entry.id,
            unlock_time: entry.unlock_time,
            taken,
            remaining: safe_sub(entry.amount, taken)?,
            marker_amount,
            liquidator_amount: safe_sub(taken, marker_amount)?,
        });
    }

    Ok(draws)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Account;
    use crate::utils::constants::ACCOUNT_LENGTH;

    fn raw(value: &str) -> U256 {
        U256::from_dec_str(value).unwrap()
    }

    fn scenario_amounts() -> LiquidationAmounts {
        // Burn $10 at $0.035 under default rewards
        liquidation_amounts(wad(10), parse_wad("0.035").unwrap(), &DomainParams::default()).unwrap()
    }

    fn entry(id: u64, amount: U256, unlock_time: Timestamp) -> RewardEntry {
        RewardEntry {
            id,
            owner: Account::new([0x02; ACCOUNT_LENGTH]),
            amount,
            unlock_time,
        }
    }

    #[test]
    fn test_liquidation_amounts() {
        let amounts = scenario_amounts();
        assert_eq!(amounts.principal, raw("285714285714285714285"));
        assert_eq!(amounts.marker_reward, raw("14285714285714285714"));
        assert_eq!(amounts.liquidator_reward, raw("28571428571428571428"));
        assert_eq!(amounts.total().unwrap(), raw("328571428571428571427"));
    }

    #[test]
    fn test_split_all_from_staked() {
        let amounts = scenario_amounts();
        let split = split_collateral(&amounts, wad(1000)).unwrap();
        assert_eq!(split.locked_sourced, U256::zero());
        assert_eq!(split.principal_from_staked, amounts.principal);
        assert_eq!(split.marker_from_staked, amounts.marker_reward);
        assert_eq!(split.liquidator_reward_from_staked, amounts.liquidator_reward);
    }

    #[test]
    fn test_split_staked_covers_principal_and_some_reward() {
        let split = split_collateral(&scenario_amounts(), wad(300)).unwrap();
        assert_eq!(split.locked_sourced, raw("28571428571428571427"));
        assert_eq!(split.marker_from_staked, raw("4761904761904761905"));
        assert_eq!(split.liquidator_reward_from_staked, raw("9523809523809523810"));
        assert_eq!(split.marker_from_locked, raw("9523809523809523809"));
        assert_eq!(split.liquidator_locked().unwrap(), raw("19047619047619047618"));
    }

    #[test]
    fn test_split_staked_short_of_principal() {
        let split = split_collateral(&scenario_amounts(), wad(200)).unwrap();
        assert_eq!(split.principal_from_staked, wad(200));
        assert_eq!(split.principal_from_locked, raw("85714285714285714285"));
        assert_eq!(split.marker_from_staked, U256::zero());
        assert_eq!(split.liquidator_staked().unwrap(), wad(200));
        assert_eq!(split.liquidator_locked().unwrap(), raw("114285714285714285713"));
    }

    #[test]
    fn test_zero_rewards() {
        let params = DomainParams::default().with_rewards(U256::zero(), U256::zero());
        let amounts = liquidation_amounts(wad(10), parse_wad("0.5").unwrap(), &params).unwrap();
        let split = split_collateral(&amounts, wad(100)).unwrap();
        assert_eq!(split.staked_sourced, wad(20));
        assert_eq!(split.marker_from_staked, U256::zero());
    }

    #[test]
    fn test_draw_single_entry() {
        let split = split_collateral(&scenario_amounts(), wad(200)).unwrap();
        let draws = draw_locked_entries(&[entry(1, wad(800), 77)], split.locked_sourced, split.marker_from_locked).unwrap();

        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].unlock_time, 77);
        assert_eq!(draws[0].marker_amount, raw("14285714285714285714"));
        assert_eq!(draws[0].liquidator_amount, raw("114285714285714285713"));
        assert_eq!(draws[0].remaining, wad(800) - split.locked_sourced);
    }

    #[test]
    fn test_draw_many_entries_totals_exact() {
        let split = split_collateral(&scenario_amounts(), U256::zero()).unwrap();
        let entries: Vec<_> = (1..=20).map(|id| entry(id, wad(40), 1000 + id)).collect();
        let draws = draw_locked_entries(&entries, split.locked_sourced, split.marker_from_locked).unwrap();

        // 328.57 needs nine entries of 40
        assert_eq!(draws.len(), 9);
        assert!(draws[..8].iter().all(|d| d.remaining.is_zero()));

        let mut marker = U256::zero();
        let mut liquidator = U256::zero();
        for draw in &draws {
            assert!(draw.marker_amount <= draw.taken);
            assert_eq!(draw.marker_amount + draw.liquidator_amount, draw.taken);
            marker = marker + draw.marker_amount;
            liquidator = liquidator + draw.liquidator_amount;
        }
        assert_eq!(marker, split.marker_from_locked);
        assert_eq!(liquidator, split.liquidator_locked().unwrap());
    }

    #[test]
    fn test_draw_insufficient() {
        let result = draw_locked_entries(&[entry(1, wad(10), 0), entry(2, wad(5), 0)], wad(20), wad(1));
        assert_eq!(
            result,
            Err(Error::InsufficientLockedCollateral {
                required: wad(20),
                available: wad(15),
            })
        );
    }

    #[test]
    fn test_draw_nothing_needed() {
        let draws = draw_locked_entries(&[entry(1, wad(10), 0)], U256::zero(), U256::zero()).unwrap();
        assert!(draws.is_empty());
    }
}
