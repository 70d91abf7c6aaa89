//! Liquidation engine.
//!
//! Positions move through two states per domain: unmarked, and marked by
//! some account at some time. A marked position that is still below the
//! liquidation ratio once the delay has passed can be liquidated: its debt is
//! written off against the pool and its collateral, first staked then locked,
//! goes to the liquidator and the marker.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::core::collateral::CollateralLedger;
use crate::core::config::DomainParams;
use crate::core::debt::DebtLedger;
use crate::core::position::Position;
use crate::core::rewards::{RewardEntry, RewardLocker};
use crate::core::types::{Account, CurrencyKey, Timestamp};
use crate::error::{Error, Result};
use crate::liquidation::sourcing::*;
use crate::utils::math::*;
use crate::utils::validation::validate_unique_ids;

// ═══════════════════════════════════════════════════════════════════════════════
// MARKS
// ═══════════════════════════════════════════════════════════════════════════════

/// Mark recorded against an undercollateralized position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationMark {
    /// Account that marked the position
    pub marker: Account,
    /// When the mark was placed
    pub marked_at: Timestamp,
}

impl LiquidationMark {
    /// Earliest liquidation time for a given delay
    pub fn ready_at(&self, delay_secs: u64) -> Timestamp {
        self.marked_at.saturating_add(delay_secs)
    }
}

/// Debt that brings the position back to the build ratio after penalties
///
/// `(debt - value * build) / (1 - (1 + liquidator + marker) * build)`, zero
/// when the position is already within the build ratio.
pub fn max_burn(position: &Position, params: &DomainParams) -> Result<U256> {
    let supported = multiply_decimal(position.collateral_value()?, params.build_ratio)?;
    if position.debt <= supported {
        return Ok(U256::zero());
    }
    let numerator = position.debt - supported;
    let denominator = safe_sub(UNIT, multiply_decimal(params.penalty_factor()?, params.build_ratio)?)?;
    divide_decimal(numerator, denominator)
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Ledgers a liquidation writes to
pub struct LiquidationLedgers<'a> {
    /// Staked balances
    pub collateral: &'a mut CollateralLedger,
    /// Locked reward entries
    pub rewards: &'a mut RewardLocker,
    /// Debt pool of the liquidated domain
    pub debt: &'a mut DebtLedger,
}

/// Inputs of a liquidation call
#[derive(Debug, Clone, Copy)]
pub struct LiquidationRequest<'a> {
    /// Collateral domain
    pub domain: &'a CurrencyKey,
    /// Liquidated account
    pub account: &'a Account,
    /// Account receiving principal and liquidator reward
    pub liquidator: &'a Account,
    /// USD debt to burn; `None` burns the maximum
    pub burn_amount: Option<U256>,
    /// Locked entries of `account` to draw from, in order
    pub locked_entry_ids: &'a [u64],
    /// Fresh collateral price
    pub price: U256,
    /// Current value of the domain's debt pool
    pub total_value: U256,
    /// Current time
    pub now: Timestamp,
    /// Whether locked rewards count in this domain
    pub native: bool,
}

/// Locked collateral moved out of one source entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedTransfer {
    /// What was taken and how it was split
    pub draw: EntryDraw,
    /// New entry of the marker, if its share was non-zero
    pub marker_entry_id: Option<u64>,
    /// New entry of the liquidator, if its share was non-zero
    pub liquidator_entry_id: Option<u64>,
}

/// Result of a liquidation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationOutcome {
    /// Collateral domain
    pub domain: CurrencyKey,
    /// Liquidated account
    pub account: Account,
    /// Liquidator
    pub liquidator: Account,
    /// Marker
    pub marker: Account,
    /// USD debt written off
    pub burn_amount: U256,
    /// Maximum burn at the time of liquidation
    pub max_burn: U256,
    /// Debt shares removed from the account
    pub shares_removed: U256,
    /// Principal and rewards
    pub amounts: LiquidationAmounts,
    /// Staked / locked breakdown
    pub split: CollateralSplit,
    /// Locked entries consumed
    pub locked_transfers: Vec<LockedTransfer>,
    /// Whether the mark was removed
    pub mark_cleared: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Marks per domain and the liquidation state machine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationEngine {
    marks: BTreeMap<CurrencyKey, BTreeMap<Account, LiquidationMark>>,
}

impl LiquidationEngine {
    /// Create an engine with no marks
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark of an account in a domain
    pub fn mark_of(&self, domain: &CurrencyKey, account: &Account) -> Option<&LiquidationMark> {
        self.marks.get(domain).and_then(|marks| marks.get(account))
    }

    /// Check if an account is marked in a domain
    pub fn is_marked(&self, domain: &CurrencyKey, account: &Account) -> bool {
        self.mark_of(domain, account).is_some()
    }

    /// Marked accounts of a domain
    pub fn marked_accounts<'a>(&'a self, domain: &CurrencyKey) -> impl Iterator<Item = (&'a Account, &'a LiquidationMark)> + 'a {
        self.marks.get(domain).into_iter().flat_map(|marks| marks.iter())
    }

    /// Number of marks across all domains
    pub fn mark_count(&self) -> usize {
        self.marks.values().map(BTreeMap::len).sum()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // MARK / UNMARK
    // ═══════════════════════════════════════════════════════════════════════════

    /// Mark a position that is strictly below the liquidation ratio
    pub fn mark(
        &mut self,
        domain: &CurrencyKey,
        account: &Account,
        marker: &Account,
        position: &Position,
        params: &DomainParams,
        now: Timestamp,
    ) -> Result<LiquidationMark> {
        if self.is_marked(domain, account) {
            return Err(Error::AlreadyMarked(account.to_string()));
        }
        if !position.is_undercollateralized(params.liquidation_ratio)? {
            return Err(Error::NotUndercollateralized(account.to_string()));
        }

        let mark = LiquidationMark {
            marker: *marker,
            marked_at: now,
        };
        self.marks.entry(domain.clone()).or_default().insert(*account, mark);

        info!(%domain, %account, %marker, marked_at = now, "position marked for liquidation");
        Ok(mark)
    }

    /// Remove the mark of a position back within the build ratio
    pub fn unmark(
        &mut self,
        domain: &CurrencyKey,
        account: &Account,
        position: &Position,
        params: &DomainParams,
    ) -> Result<LiquidationMark> {
        if !self.is_marked(domain, account) {
            return Err(Error::NotMarked(account.to_string()));
        }
        if !position.is_within_build_ratio(params.build_ratio)? {
            return Err(Error::StillUndercollateralized(account.to_string()));
        }

        let mark = self.clear_mark(domain, account)?;
        info!(%domain, %account, "position unmarked");
        Ok(mark)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIQUIDATE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Liquidate a marked position
    ///
    /// Validates everything before the first ledger write. The caller is
    /// responsible for rolling back the ledgers if a later step fails.
    pub fn liquidate(
        &mut self,
        request: LiquidationRequest<'_>,
        params: &DomainParams,
        ledgers: LiquidationLedgers<'_>,
    ) -> Result<LiquidationOutcome> {
        let LiquidationRequest {
            domain,
            account,
            liquidator,
            ..
        } = request;

        let mark = *self
            .mark_of(domain, account)
            .ok_or_else(|| Error::NotMarked(account.to_string()))?;
        let ready_at = mark.ready_at(params.liquidation_delay_secs);
        if request.now < ready_at {
            return Err(Error::DelayNotElapsed {
                ready_at,
                now: request.now,
            });
        }

        let position = Position::from_ledgers(
            ledgers.collateral,
            ledgers.rewards,
            ledgers.debt,
            domain,
            account,
            request.price,
            request.total_value,
            request.native,
        )?;
        if !position.is_undercollateralized(params.liquidation_ratio)? {
            return Err(Error::NotUndercollateralized(account.to_string()));
        }

        let max = max_burn(&position, params)?;
        let burn_amount = request.burn_amount.unwrap_or(max);
        if burn_amount.is_zero() {
            return Err(Error::InvalidAmount("liquidation burn amount is zero".into()));
        }
        if burn_amount > max {
            return Err(Error::BurnTooLarge {
                requested: burn_amount,
                max,
            });
        }

        let amounts = liquidation_amounts(burn_amount, request.price, params)?;
        let split = split_collateral(&amounts, position.staked)?;
        let sources = resolve_entries(ledgers.rewards, account, request.locked_entry_ids, request.native)?;
        if !request.native && !split.locked_sourced.is_zero() {
            return Err(Error::InsufficientLockedCollateral {
                required: split.locked_sourced,
                available: U256::zero(),
            });
        }
        let draws = draw_locked_entries(&sources, split.locked_sourced, split.marker_from_locked)?;

        // Staked collateral
        ledgers
            .collateral
            .transfer_staked(account, liquidator, domain, split.liquidator_staked()?)?;
        ledgers
            .collateral
            .transfer_staked(account, &mark.marker, domain, split.marker_from_staked)?;

        // Locked collateral, one new pair per consumed entry
        let mut locked_transfers = Vec::with_capacity(draws.len());
        for draw in draws {
            ledgers.rewards.reduce_entry(account, draw.entry_id, draw.taken)?;
            let marker_entry_id = if draw.marker_amount.is_zero() {
                None
            } else {
                Some(ledgers.rewards.add(&mark.marker, draw.marker_amount, draw.unlock_time)?)
            };
            let liquidator_entry_id = if draw.liquidator_amount.is_zero() {
                None
            } else {
                Some(ledgers.rewards.add(liquidator, draw.liquidator_amount, draw.unlock_time)?)
            };
            locked_transfers.push(LockedTransfer {
                draw,
                marker_entry_id,
                liquidator_entry_id,
            });
        }

        let shares_removed = ledgers.debt.write_off(account, burn_amount, request.total_value)?;

        let mark_cleared = burn_amount == max;
        if mark_cleared {
            self.clear_mark(domain, account)?;
        }

        info!(
            %domain,
            %account,
            %liquidator,
            %burn_amount,
            principal = %amounts.principal,
            from_staked = %split.staked_sourced,
            from_locked = %split.locked_sourced,
            mark_cleared,
            "position liquidated"
        );

        Ok(LiquidationOutcome {
            domain: domain.clone(),
            account: *account,
            liquidator: *liquidator,
            marker: mark.marker,
            burn_amount,
            max_burn: max,
            shares_removed,
            amounts,
            split,
            locked_transfers,
            mark_cleared,
        })
    }

    fn clear_mark(&mut self, domain: &CurrencyKey, account: &Account) -> Result<LiquidationMark> {
        let marks = self
            .marks
            .get_mut(domain)
            .ok_or_else(|| Error::NotMarked(account.to_string()))?;
        let mark = marks
            .remove(account)
            .ok_or_else(|| Error::NotMarked(account.to_string()))?;
        if marks.is_empty() {
            self.marks.remove(domain);
        }
        debug!(%domain, %account, "mark cleared");
        Ok(mark)
    }
}

/// Look up the listed entries; every id must be unique, live and owned
fn resolve_entries(
    rewards: &RewardLocker,
    owner: &Account,
    entry_ids: &[u64],
    native: bool,
) -> Result<Vec<RewardEntry>> {
    if !native && !entry_ids.is_empty() {
        return Err(Error::InvalidParameter {
            name: "locked_entry_ids".into(),
            reason: "locked rewards only back the native domain".into(),
        });
    }
    validate_unique_ids(entry_ids)?;
    entry_ids
        .iter()
        .map(|id| rewards.live_entry(owner, *id).cloned())
        .collect()
}
