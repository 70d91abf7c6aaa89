//! Collateral ledger.
//!
//! Tracks staked collateral per (account, currency) and per-currency
//! registration data. Token custody lives with the token collaborator; this
//! ledger only books balances. Locked reward collateral is tracked by the
//! reward locker and combined here through the pure helpers at the bottom of
//! the module.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::core::types::{Account, CurrencyKey};
use crate::error::{Error, Result};
use crate::utils::math::*;
use crate::utils::validation::validate_non_zero;

// ═══════════════════════════════════════════════════════════════════════════════
// CURRENCY INFO
// ═══════════════════════════════════════════════════════════════════════════════

/// Registration data of a collateral currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyInfo {
    /// Reference to the token contract or ledger
    pub token_ref: String,
    /// Smallest non-zero balance a redeem may leave behind
    pub min_collateral: U256,
    /// Sum of all staked balances
    pub total_staked: U256,
    /// Closed currencies accept no new stakes
    pub closed: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Staked collateral per account and currency
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralLedger {
    currencies: BTreeMap<CurrencyKey, CurrencyInfo>,
    staked: BTreeMap<CurrencyKey, BTreeMap<Account, U256>>,
}

impl CollateralLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CURRENCY REGISTRY
    // ═══════════════════════════════════════════════════════════════════════════

    /// Register or update a currency; existing totals are preserved
    pub fn update_token_info(
        &mut self,
        currency: &CurrencyKey,
        token_ref: &str,
        min_collateral: U256,
        closed: bool,
    ) {
        let info = self
            .currencies
            .entry(currency.clone())
            .or_insert_with(|| CurrencyInfo {
                token_ref: String::new(),
                min_collateral: U256::zero(),
                total_staked: U256::zero(),
                closed: false,
            });
        info.token_ref = token_ref.to_string();
        info.min_collateral = min_collateral;
        info.closed = closed;

        debug!(%currency, token_ref, %min_collateral, closed, "collateral currency updated");
    }

    /// Registration data of a currency
    pub fn currency_info(&self, currency: &CurrencyKey) -> Result<&CurrencyInfo> {
        self.currencies
            .get(currency)
            .ok_or_else(|| Error::UnknownCurrency(currency.to_string()))
    }

    /// Check that a currency is registered and open
    pub fn ensure_accepts_stake(&self, currency: &CurrencyKey) -> Result<()> {
        if self.currency_info(currency)?.closed {
            return Err(Error::CurrencyClosed(currency.to_string()));
        }
        Ok(())
    }

    /// Registered currencies
    pub fn currencies(&self) -> impl Iterator<Item = (&CurrencyKey, &CurrencyInfo)> {
        self.currencies.iter()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BALANCES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Book a new stake; rejects closed and unknown currencies
    pub fn stake(&mut self, account: &Account, currency: &CurrencyKey, amount: U256) -> Result<U256> {
        self.ensure_accepts_stake(currency)?;
        validate_non_zero(amount, "stake amount")?;
        self.credit(account, currency, amount)
    }

    /// Book a stake funded by an unlocked reward; closed currencies accept it
    pub fn stake_from_unlocked_reward(
        &mut self,
        account: &Account,
        currency: &CurrencyKey,
        amount: U256,
    ) -> Result<U256> {
        if account.is_zero() {
            return Err(Error::InvalidParameter {
                name: "account".into(),
                reason: "cannot be the zero account".into(),
            });
        }
        self.currency_info(currency)?;
        validate_non_zero(amount, "unlocked reward")?;
        self.credit(account, currency, amount)
    }

    /// Remove staked collateral (redeem or liquidation)
    pub fn unstake(&mut self, account: &Account, currency: &CurrencyKey, amount: U256) -> Result<U256> {
        let available = self.staked_of(account, currency);
        if amount > available {
            return Err(Error::InsufficientCollateral {
                required: amount,
                available,
            });
        }

        let info = self
            .currencies
            .get_mut(currency)
            .ok_or_else(|| Error::UnknownCurrency(currency.to_string()))?;
        info.total_staked = safe_sub(info.total_staked, amount)?;

        let remaining = available - amount;
        self.set_staked(account, currency, remaining);
        debug!(%account, %currency, %amount, %remaining, "collateral unstaked");
        Ok(remaining)
    }

    /// Move staked collateral between accounts; works on closed currencies
    pub fn transfer_staked(
        &mut self,
        from: &Account,
        to: &Account,
        currency: &CurrencyKey,
        amount: U256,
    ) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        self.unstake(from, currency, amount)?;
        self.credit(to, currency, amount)?;
        Ok(())
    }

    /// Staked balance of an account
    pub fn staked_of(&self, account: &Account, currency: &CurrencyKey) -> U256 {
        self.staked
            .get(currency)
            .and_then(|balances| balances.get(account))
            .copied()
            .unwrap_or_default()
    }

    /// Total staked in a currency
    pub fn total_staked(&self, currency: &CurrencyKey) -> U256 {
        self.currencies
            .get(currency)
            .map(|info| info.total_staked)
            .unwrap_or_default()
    }

    /// Verify per-currency totals match the sum of balances
    pub fn check_invariant(&self) -> Result<()> {
        for (currency, info) in &self.currencies {
            let mut sum = U256::zero();
            if let Some(balances) = self.staked.get(currency) {
                for amount in balances.values() {
                    sum = safe_add(sum, *amount)?;
                }
            }
            if sum != info.total_staked {
                return Err(Error::InvariantViolation(format!(
                    "{} staked sum {} != total {}",
                    currency, sum, info.total_staked
                )));
            }
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INTERNAL
    // ═══════════════════════════════════════════════════════════════════════════

    fn credit(&mut self, account: &Account, currency: &CurrencyKey, amount: U256) -> Result<U256> {
        let balance = safe_add(self.staked_of(account, currency), amount)?;
        let info = self
            .currencies
            .get_mut(currency)
            .ok_or_else(|| Error::UnknownCurrency(currency.to_string()))?;
        info.total_staked = safe_add(info.total_staked, amount)?;
        self.set_staked(account, currency, balance);
        debug!(%account, %currency, %amount, %balance, "collateral staked");
        Ok(balance)
    }

    fn set_staked(&mut self, account: &Account, currency: &CurrencyKey, amount: U256) {
        let balances = self.staked.entry(currency.clone()).or_default();
        if amount.is_zero() {
            balances.remove(account);
        } else {
            balances.insert(*account, amount);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALUATION HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// USD value of `staked + locked` at `price`
pub fn collateral_value(staked: U256, locked: U256, price: U256) -> Result<U256> {
    multiply_decimal(safe_add(staked, locked)?, price)
}

/// Maximum total debt the collateral supports at the build ratio
pub fn build_capacity(staked: U256, locked: U256, price: U256, build_ratio: U256) -> Result<U256> {
    multiply_decimal(collateral_value(staked, locked, price)?, build_ratio)
}

/// Collateral units needed to back `debt` at the build ratio
pub fn required_backing(debt: U256, build_ratio: U256, price: U256) -> Result<U256> {
    if debt.is_zero() {
        return Ok(U256::zero());
    }
    divide_decimal(divide_decimal(debt, build_ratio)?, price)
}

/// Staked collateral free to leave
///
/// Locked collateral is credited toward the backing requirement first; the
/// rest of the requirement restricts staked collateral.
pub fn redeemable_amount(staked: U256, locked: U256, required_backing: U256) -> U256 {
    let credited_locked = locked.min(required_backing);
    let restricted = required_backing - credited_locked;
    staked.saturating_sub(restricted)
}

/// Check a redeem of `amount` against the redeemable amount and the dust rule
pub fn check_redeem(staked: U256, amount: U256, redeemable: U256, min_collateral: U256) -> Result<()> {
    validate_non_zero(amount, "redeem amount")?;
    if amount > redeemable {
        return Err(Error::InsufficientCollateral {
            required: amount,
            available: redeemable,
        });
    }
    let remaining = staked - amount;
    if !remaining.is_zero() && remaining < min_collateral {
        return Err(Error::BelowMinimumCollateral {
            remaining,
            minimum: min_collateral,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::ACCOUNT_LENGTH;

    fn account(n: u8) -> Account {
        Account::new([n; ACCOUNT_LENGTH])
    }

    fn ath() -> CurrencyKey {
        CurrencyKey::new("ATH").unwrap()
    }

    fn ledger() -> CollateralLedger {
        let mut ledger = CollateralLedger::new();
        ledger.update_token_info(&ath(), "ath-token", wad(1), false);
        ledger
    }

    #[test]
    fn test_stake_and_unstake() {
        let mut ledger = ledger();
        ledger.stake(&account(1), &ath(), wad(1000)).unwrap();
        ledger.stake(&account(2), &ath(), wad(500)).unwrap();
        assert_eq!(ledger.total_staked(&ath()), wad(1500));

        let remaining = ledger.unstake(&account(1), &ath(), wad(400)).unwrap();
        assert_eq!(remaining, wad(600));
        assert_eq!(ledger.total_staked(&ath()), wad(1100));
        assert!(ledger.check_invariant().is_ok());
    }

    #[test]
    fn test_unstake_below_zero_is_an_error() {
        let mut ledger = ledger();
        ledger.stake(&account(1), &ath(), wad(10)).unwrap();
        assert!(matches!(
            ledger.unstake(&account(1), &ath(), wad(11)),
            Err(Error::InsufficientCollateral { .. })
        ));
        assert_eq!(ledger.staked_of(&account(1), &ath()), wad(10));
    }

    #[test]
    fn test_stake_rejects_closed_and_unknown() {
        let mut ledger = ledger();
        ledger.stake(&account(1), &ath(), wad(10)).unwrap();
        ledger.update_token_info(&ath(), "ath-token", wad(1), true);

        assert!(matches!(
            ledger.stake(&account(1), &ath(), wad(1)),
            Err(Error::CurrencyClosed(_))
        ));
        // Existing position survives closing
        assert_eq!(ledger.staked_of(&account(1), &ath()), wad(10));
        assert_eq!(ledger.total_staked(&ath()), wad(10));

        let wbtc = CurrencyKey::new("WBTC").unwrap();
        assert!(matches!(
            ledger.stake(&account(1), &wbtc, wad(1)),
            Err(Error::UnknownCurrency(_))
        ));
    }

    #[test]
    fn test_stake_from_unlocked_reward() {
        let mut ledger = ledger();
        ledger.update_token_info(&ath(), "ath-token", wad(1), true);

        assert_eq!(ledger.stake_from_unlocked_reward(&account(1), &ath(), wad(10)).unwrap(), wad(10));
        assert!(matches!(
            ledger.stake_from_unlocked_reward(&Account::zero(), &ath(), wad(10)),
            Err(Error::InvalidParameter { .. })
        ));
        let eth = CurrencyKey::new("ETH").unwrap();
        assert!(matches!(
            ledger.stake_from_unlocked_reward(&account(1), &eth, wad(10)),
            Err(Error::UnknownCurrency(_))
        ));
        assert!(ledger.check_invariant().is_ok());
    }

    #[test]
    fn test_stake_zero_rejected() {
        let mut ledger = ledger();
        assert!(matches!(
            ledger.stake(&account(1), &ath(), U256::zero()),
            Err(Error::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_transfer_staked_on_closed_currency() {
        let mut ledger = ledger();
        ledger.stake(&account(1), &ath(), wad(10)).unwrap();
        ledger.update_token_info(&ath(), "ath-token", wad(1), true);

        ledger.transfer_staked(&account(1), &account(2), &ath(), wad(4)).unwrap();
        assert_eq!(ledger.staked_of(&account(2), &ath()), wad(4));
        assert_eq!(ledger.total_staked(&ath()), wad(10));
    }

    #[test]
    fn test_redeemable_saturation() {
        let staked = wad(9000);
        let backing = wad(5000);

        assert_eq!(redeemable_amount(staked, U256::zero(), backing), wad(4000));
        assert_eq!(redeemable_amount(staked, wad(4000), backing), wad(8000));
        assert_eq!(redeemable_amount(staked, wad(5000), backing), wad(9000));
        assert_eq!(redeemable_amount(staked, wad(9000), backing), wad(9000));
        // Backing above staked leaves nothing
        assert_eq!(redeemable_amount(wad(100), U256::zero(), backing), U256::zero());
    }

    #[test]
    fn test_required_backing_and_capacity() {
        let price = parse_wad("0.035").unwrap();
        let build_ratio = parse_wad("0.2").unwrap();

        // 1000 staked at $0.035 with ratio 0.2 supports $7 of debt
        assert_eq!(build_capacity(wad(1000), U256::zero(), price, build_ratio).unwrap(), wad(7));
        assert_eq!(required_backing(wad(7), build_ratio, price).unwrap(), wad(1000));
        assert_eq!(required_backing(U256::zero(), build_ratio, price).unwrap(), U256::zero());
    }

    #[test]
    fn test_check_redeem_dust_rule() {
        let min = wad(1);
        assert!(check_redeem(wad(10), wad(10), wad(10), min).is_ok());
        assert!(check_redeem(wad(10), wad(9), wad(10), min).is_ok());
        assert!(matches!(
            check_redeem(wad(10), wad(10) - U256::one(), wad(10), min),
            Err(Error::BelowMinimumCollateral { .. })
        ));
        assert!(matches!(
            check_redeem(wad(10), wad(6), wad(5), min),
            Err(Error::InsufficientCollateral { .. })
        ));
    }
}
