//! Debt-share ledger.
//!
//! Each collateral domain owns one [`DebtLedger`]. Issuers hold shares of a
//! pool whose USD value is supplied by the caller at every call; an account's
//! debt is its share fraction of that value. Shares are minted on issuance,
//! destroyed on burn and write-off, and never move between accounts.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::core::types::Account;
use crate::error::{Error, Result};
use crate::utils::math::*;
use crate::utils::validation::validate_non_zero;

// ═══════════════════════════════════════════════════════════════════════════════
// DEBT LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Proportional ownership of a shared debt pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtLedger {
    /// Sum of all issued shares
    total_shares: U256,
    /// Shares per account (zero balances are removed)
    shares: BTreeMap<Account, U256>,
}

impl DebtLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // MUTATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Mint shares worth `usd_amount` against a pool currently worth `total_value`
    ///
    /// The first issuance into an empty pool prices one share at 1 USD.
    /// Returns the number of shares minted.
    pub fn issue(&mut self, account: &Account, usd_amount: U256, total_value: U256) -> Result<U256> {
        validate_non_zero(usd_amount, "issue amount")?;

        let minted = if self.total_shares.is_zero() || total_value.is_zero() {
            usd_amount
        } else {
            safe_mul_div(usd_amount, self.total_shares, total_value)?
        };

        let held = self.shares_of(account);
        let new_total = safe_add(self.total_shares, minted)?;
        let new_held = safe_add(held, minted)?;
        self.set_shares(account, new_held);
        self.total_shares = new_total;

        debug!(%account, %usd_amount, %minted, "debt shares issued");
        Ok(minted)
    }

    /// Destroy shares worth `usd_amount`, clamped to the account's holding
    ///
    /// Returns the number of shares burnt.
    pub fn burn(&mut self, account: &Account, usd_amount: U256, total_value: U256) -> Result<U256> {
        validate_non_zero(usd_amount, "burn amount")?;

        let held = self.shares_of(account);
        let burnt = if total_value.is_zero() {
            held
        } else {
            safe_mul_div(usd_amount, self.total_shares, total_value)?.min(held)
        };

        self.remove_shares(account, burnt)?;
        debug!(%account, %usd_amount, %burnt, "debt shares burnt");
        Ok(burnt)
    }

    /// Destroy every share of an account; returns the number burnt
    pub fn burn_all(&mut self, account: &Account) -> Result<U256> {
        let held = self.shares_of(account);
        self.remove_shares(account, held)?;
        debug!(%account, burnt = %held, "debt shares cleared");
        Ok(held)
    }

    /// Reduce an account's debt by `usd_amount` without reducing pool value
    ///
    /// Removes `x * T / (V - D + x)` shares so that the account's debt becomes
    /// `D - x` and every other holder absorbs `x` pro rata. An account holding
    /// the entire pool loses all of its shares. Returns the shares removed.
    pub fn write_off(&mut self, account: &Account, usd_amount: U256, total_value: U256) -> Result<U256> {
        validate_non_zero(usd_amount, "write-off amount")?;

        let held = self.shares_of(account);
        if held.is_zero() {
            return Ok(U256::zero());
        }

        let removed = if held == self.total_shares || total_value.is_zero() {
            held
        } else {
            let debt = self.debt_of(account, total_value)?;
            let amount = usd_amount.min(debt);
            // V - D + x
            let denominator = safe_add(safe_sub(total_value, debt)?, amount)?;
            safe_mul_div(amount, self.total_shares, denominator)?.min(held)
        };

        self.remove_shares(account, removed)?;
        debug!(%account, %usd_amount, %removed, "debt written off");
        Ok(removed)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// USD debt of an account given the pool value
    pub fn debt_of(&self, account: &Account, total_value: U256) -> Result<U256> {
        if self.total_shares.is_zero() {
            return Ok(U256::zero());
        }
        safe_mul_div(self.shares_of(account), total_value, self.total_shares)
    }

    /// Shares held by an account
    pub fn shares_of(&self, account: &Account) -> U256 {
        self.shares.get(account).copied().unwrap_or_default()
    }

    /// Total shares in the pool
    pub fn total_shares(&self) -> U256 {
        self.total_shares
    }

    /// Number of accounts holding shares
    pub fn holder_count(&self) -> usize {
        self.shares.len()
    }

    /// Iterate over holders and their shares
    pub fn holders(&self) -> impl Iterator<Item = (&Account, &U256)> {
        self.shares.iter()
    }

    /// Verify `sum(shares) == total_shares`
    pub fn check_invariant(&self) -> Result<()> {
        let mut sum = U256::zero();
        for held in self.shares.values() {
            sum = safe_add(sum, *held)?;
        }
        if sum != self.total_shares {
            return Err(Error::InvariantViolation(format!(
                "debt shares sum {} != total {}",
                sum, self.total_shares
            )));
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INTERNAL
    // ═══════════════════════════════════════════════════════════════════════════

    fn set_shares(&mut self, account: &Account, amount: U256) {
        if amount.is_zero() {
            self.shares.remove(account);
        } else {
            self.shares.insert(*account, amount);
        }
    }

    fn remove_shares(&mut self, account: &Account, amount: U256) -> Result<()> {
        let held = safe_sub(self.shares_of(account), amount)?;
        self.total_shares = safe_sub(self.total_shares, amount)?;
        self.set_shares(account, held);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::ACCOUNT_LENGTH;
    use proptest::prelude::*;

    fn account(n: u8) -> Account {
        Account::new([n; ACCOUNT_LENGTH])
    }

    #[test]
    fn test_first_issue_bootstraps_one_to_one() {
        let mut ledger = DebtLedger::new();
        let minted = ledger.issue(&account(1), wad(20), U256::zero()).unwrap();
        assert_eq!(minted, wad(20));
        assert_eq!(ledger.total_shares(), wad(20));
        assert_eq!(ledger.debt_of(&account(1), wad(20)).unwrap(), wad(20));
    }

    #[test]
    fn test_issue_at_appreciated_pool() {
        let mut ledger = DebtLedger::new();
        ledger.issue(&account(1), wad(100), U256::zero()).unwrap();

        // Pool doubled in value: new shares are half as many per USD
        let minted = ledger.issue(&account(2), wad(100), wad(200)).unwrap();
        assert_eq!(minted, wad(50));
        assert_eq!(ledger.debt_of(&account(1), wad(300)).unwrap(), wad(200));
        assert_eq!(ledger.debt_of(&account(2), wad(300)).unwrap(), wad(100));
    }

    #[test]
    fn test_issue_zero_rejected() {
        let mut ledger = DebtLedger::new();
        assert!(matches!(
            ledger.issue(&account(1), U256::zero(), wad(1)),
            Err(Error::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_burn_all_clears_holding() {
        let mut ledger = DebtLedger::new();
        ledger.issue(&account(1), wad(10), U256::zero()).unwrap();
        ledger.issue(&account(2), wad(30), wad(10)).unwrap();

        assert_eq!(ledger.burn_all(&account(1)).unwrap(), wad(10));
        assert_eq!(ledger.total_shares(), wad(30));
        assert_eq!(ledger.holder_count(), 1);
        assert!(ledger.check_invariant().is_ok());
    }

    #[test]
    fn test_burn_clamps_to_holding() {
        let mut ledger = DebtLedger::new();
        ledger.issue(&account(1), wad(10), U256::zero()).unwrap();
        ledger.issue(&account(2), wad(30), wad(10)).unwrap();

        let burnt = ledger.burn(&account(1), wad(25), wad(40)).unwrap();
        assert_eq!(burnt, wad(10));
        assert_eq!(ledger.shares_of(&account(1)), U256::zero());
        assert_eq!(ledger.holder_count(), 1);
        assert!(ledger.check_invariant().is_ok());
    }

    #[test]
    fn test_debt_of_empty_pool() {
        let ledger = DebtLedger::new();
        assert_eq!(ledger.debt_of(&account(1), wad(100)).unwrap(), U256::zero());
    }

    #[test]
    fn test_write_off_socializes_loss() {
        let mut ledger = DebtLedger::new();
        ledger.issue(&account(1), wad(20), U256::zero()).unwrap();
        ledger.issue(&account(2), wad(80), wad(20)).unwrap();
        let value = wad(100);

        ledger.write_off(&account(1), wad(10), value).unwrap();

        let debt_1 = ledger.debt_of(&account(1), value).unwrap();
        let debt_2 = ledger.debt_of(&account(2), value).unwrap();
        // Account 1 keeps 10 (rounded in the pool's favour), account 2 absorbs 10
        assert!(debt_1 >= wad(10) && debt_1 - wad(10) <= U256::from(10u64));
        assert!(debt_2 <= wad(90) && wad(90) - debt_2 <= U256::from(10u64));
        assert!(ledger.check_invariant().is_ok());
    }

    #[test]
    fn test_write_off_sole_holder_clears_position() {
        let mut ledger = DebtLedger::new();
        ledger.issue(&account(1), wad(20), U256::zero()).unwrap();

        let removed = ledger.write_off(&account(1), wad(10), wad(20)).unwrap();
        assert_eq!(removed, wad(20));
        assert_eq!(ledger.total_shares(), U256::zero());
    }

    #[test]
    fn test_write_off_without_shares_is_noop() {
        let mut ledger = DebtLedger::new();
        ledger.issue(&account(1), wad(20), U256::zero()).unwrap();
        assert_eq!(ledger.write_off(&account(2), wad(5), wad(20)).unwrap(), U256::zero());
        assert_eq!(ledger.total_shares(), wad(20));
    }

    #[derive(Clone, Debug)]
    enum Action {
        Issue { who: u8, amount: u64 },
        Burn { who: u8, amount: u64 },
        WriteOff { who: u8, amount: u64 },
        Revalue { value: u64 },
    }

    fn action_strategy() -> impl Strategy<Value = Action> {
        prop_oneof![
            (0u8..4, 1u64..1_000_000).prop_map(|(who, amount)| Action::Issue { who, amount }),
            (0u8..4, 1u64..1_000_000).prop_map(|(who, amount)| Action::Burn { who, amount }),
            (0u8..4, 1u64..1_000_000).prop_map(|(who, amount)| Action::WriteOff { who, amount }),
            (1u64..10_000_000).prop_map(|value| Action::Revalue { value }),
        ]
    }

    proptest! {
        #[test]
        fn prop_share_conservation(actions in prop::collection::vec(action_strategy(), 1..60)) {
            let mut ledger = DebtLedger::new();
            let mut value = U256::zero();

            for action in actions {
                match action {
                    Action::Issue { who, amount } => {
                        let amount = wad(amount);
                        ledger.issue(&account(who), amount, value).unwrap();
                        value = value + amount;
                    }
                    Action::Burn { who, amount } => {
                        let debt = ledger.debt_of(&account(who), value).unwrap();
                        let amount = wad(amount).min(debt);
                        if !amount.is_zero() {
                            ledger.burn(&account(who), amount, value).unwrap();
                            value = value - amount;
                        }
                    }
                    Action::WriteOff { who, amount } => {
                        let before: U256 = ledger.total_shares();
                        let removed = ledger.write_off(&account(who), wad(amount), value).unwrap();
                        prop_assert_eq!(ledger.total_shares(), before - removed);
                    }
                    Action::Revalue { value: v } => {
                        if !ledger.total_shares().is_zero() {
                            value = wad(v);
                        }
                    }
                }
                prop_assert!(ledger.check_invariant().is_ok());
            }
        }
    }
}
