//! Valuation of one account's position in one collateral domain.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::core::collateral::{
    build_capacity, collateral_value, redeemable_amount, required_backing, CollateralLedger,
};
use crate::core::debt::DebtLedger;
use crate::core::rewards::RewardLocker;
use crate::core::types::{Account, CurrencyKey};
use crate::error::Result;
use crate::utils::math::*;

/// Inputs that determine an account's collateralization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Staked collateral units
    pub staked: U256,
    /// Locked reward units (zero outside the native domain)
    pub locked: U256,
    /// Collateral price in USD
    pub price: U256,
    /// Current USD debt
    pub debt: U256,
}

impl Position {
    /// Read an account's position in `domain` out of the ledgers
    ///
    /// Locked rewards are only counted when `count_locked` is set, which the
    /// caller does for the native domain.
    #[allow(clippy::too_many_arguments)]
    pub fn from_ledgers(
        collateral: &CollateralLedger,
        rewards: &RewardLocker,
        debt: &DebtLedger,
        domain: &CurrencyKey,
        account: &Account,
        price: U256,
        total_value: U256,
        count_locked: bool,
    ) -> Result<Self> {
        Ok(Self {
            staked: collateral.staked_of(account, domain),
            locked: if count_locked {
                rewards.locked_amount(account)
            } else {
                U256::zero()
            },
            price,
            debt: debt.debt_of(account, total_value)?,
        })
    }

    /// USD value of staked plus locked collateral
    pub fn collateral_value(&self) -> Result<U256> {
        collateral_value(self.staked, self.locked, self.price)
    }

    /// Total debt allowed at the build ratio
    pub fn build_capacity(&self, build_ratio: U256) -> Result<U256> {
        build_capacity(self.staked, self.locked, self.price, build_ratio)
    }

    /// Debt that can still be built
    pub fn available_to_build(&self, build_ratio: U256) -> Result<U256> {
        Ok(self.build_capacity(build_ratio)?.saturating_sub(self.debt))
    }

    /// Debt above the build capacity
    pub fn excess_debt(&self, build_ratio: U256) -> Result<U256> {
        Ok(self.debt.saturating_sub(self.build_capacity(build_ratio)?))
    }

    /// Staked collateral free to redeem
    pub fn redeemable(&self, build_ratio: U256) -> Result<U256> {
        let backing = required_backing(self.debt, build_ratio, self.price)?;
        Ok(redeemable_amount(self.staked, self.locked, backing))
    }

    /// `debt / collateral_value > liquidation_ratio`
    pub fn is_undercollateralized(&self, liquidation_ratio: U256) -> Result<bool> {
        self.exceeds_ratio(liquidation_ratio)
    }

    /// `debt / collateral_value <= build_ratio`
    pub fn is_within_build_ratio(&self, build_ratio: U256) -> Result<bool> {
        Ok(!self.exceeds_ratio(build_ratio)?)
    }

    /// C-ratio `collateral_value / debt`; `None` without debt
    pub fn c_ratio(&self) -> Result<Option<U256>> {
        if self.debt.is_zero() {
            return Ok(None);
        }
        Ok(Some(divide_decimal(self.collateral_value()?, self.debt)?))
    }

    fn exceeds_ratio(&self, ratio: U256) -> Result<bool> {
        let value = self.collateral_value()?;
        Ok(cmp_products(self.debt, UNIT, value, ratio).is_gt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice_at(price: &str) -> Position {
        Position {
            staked: wad(1000),
            locked: U256::zero(),
            price: parse_wad(price).unwrap(),
            debt: wad(20),
        }
    }

    #[test]
    fn test_liquidation_threshold_is_strict() {
        let half = parse_wad("0.5").unwrap();
        // $40 of collateral against $20 of debt is exactly 200%
        assert!(!alice_at("0.04").is_undercollateralized(half).unwrap());
        assert!(alice_at("0.038").is_undercollateralized(half).unwrap());
    }

    #[test]
    fn test_build_ratio_boundary_is_inclusive() {
        let build = parse_wad("0.2").unwrap();
        assert!(!alice_at("0.099").is_within_build_ratio(build).unwrap());
        assert!(alice_at("0.1").is_within_build_ratio(build).unwrap());
    }

    #[test]
    fn test_capacity_and_excess() {
        let build = parse_wad("0.2").unwrap();
        let position = alice_at("0.035");
        assert_eq!(position.build_capacity(build).unwrap(), wad(7));
        assert_eq!(position.excess_debt(build).unwrap(), wad(13));
        assert_eq!(position.available_to_build(build).unwrap(), U256::zero());
        assert_eq!(alice_at("0.2").available_to_build(build).unwrap(), wad(20));
    }

    #[test]
    fn test_c_ratio() {
        assert_eq!(alice_at("0.1").c_ratio().unwrap(), Some(wad(5)));
        let empty = Position { debt: U256::zero(), ..alice_at("0.1") };
        assert_eq!(empty.c_ratio().unwrap(), None);
    }
}
