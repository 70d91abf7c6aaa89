//! Mint/burn gateway.
//!
//! Keeps the debt-share ledger consistent with collateral: debt is only
//! issued within the build capacity of the position. Minting and burning the
//! synthetic token itself is left to the caller, which performs it after the
//! ledger change succeeds.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::config::DomainParams;
use crate::core::debt::DebtLedger;
use crate::core::position::Position;
use crate::core::types::Account;
use crate::error::{Error, Result};
use crate::utils::validation::validate_non_zero;

/// Ledger-side result of a build or burn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtChange {
    /// USD amount built or burnt
    pub amount: U256,
    /// Shares minted or burnt
    pub shares: U256,
}

/// Gateway over one domain's debt ledger
pub struct BuildBurnGateway<'a> {
    ledger: &'a mut DebtLedger,
    params: &'a DomainParams,
}

impl<'a> BuildBurnGateway<'a> {
    /// Wrap a domain's debt ledger and parameters
    pub fn new(ledger: &'a mut DebtLedger, params: &'a DomainParams) -> Self {
        Self { ledger, params }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BUILD
    // ═══════════════════════════════════════════════════════════════════════════

    /// Issue `usd_amount` of debt if the position can carry it
    pub fn build(
        &mut self,
        account: &Account,
        usd_amount: U256,
        position: &Position,
        total_value: U256,
    ) -> Result<DebtChange> {
        validate_non_zero(usd_amount, "build amount")?;

        let available = position.available_to_build(self.params.build_ratio)?;
        if usd_amount > available {
            return Err(Error::BuildTooLarge {
                requested: usd_amount,
                available,
            });
        }

        let shares = self.ledger.issue(account, usd_amount, total_value)?;
        debug!(%account, %usd_amount, %shares, "debt built");
        Ok(DebtChange {
            amount: usd_amount,
            shares,
        })
    }

    /// Issue all remaining build capacity
    pub fn build_max(
        &mut self,
        account: &Account,
        position: &Position,
        total_value: U256,
    ) -> Result<DebtChange> {
        let available = position.available_to_build(self.params.build_ratio)?;
        if available.is_zero() {
            return Err(Error::BuildTooLarge {
                requested: U256::zero(),
                available,
            });
        }
        self.build(account, available, position, total_value)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BURN
    // ═══════════════════════════════════════════════════════════════════════════

    /// Burn up to `usd_amount` of debt
    ///
    /// The amount is capped at the account's debt and the returned
    /// [`DebtChange::amount`] is what the caller must burn in tokens. Burning
    /// the whole debt removes every share the account holds.
    pub fn burn(&mut self, account: &Account, usd_amount: U256, total_value: U256) -> Result<DebtChange> {
        validate_non_zero(usd_amount, "burn amount")?;

        let debt = self.ledger.debt_of(account, total_value)?;
        if debt.is_zero() {
            return Err(Error::InvalidAmount(format!("{} has no debt to burn", account)));
        }

        let amount = usd_amount.min(debt);
        let shares = if amount == debt {
            self.ledger.burn_all(account)?
        } else {
            self.ledger.burn(account, amount, total_value)?
        };
        debug!(%account, requested = %usd_amount, %amount, %shares, "debt burnt");
        Ok(DebtChange { amount, shares })
    }

    /// Burn exactly the debt above build capacity
    pub fn burn_to_target(
        &mut self,
        account: &Account,
        position: &Position,
        total_value: U256,
    ) -> Result<DebtChange> {
        let excess = position.excess_debt(self.params.build_ratio)?;
        if excess.is_zero() {
            return Err(Error::InvalidAmount(format!(
                "position of {} is already within the build ratio",
                account
            )));
        }
        self.burn(account, excess, total_value)
    }
}
