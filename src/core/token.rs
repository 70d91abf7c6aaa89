//! Token custody, synthetic supply and debt valuation.
//!
//! The core never owns token balances. It reaches them through two
//! collaborator traits:
//! - [`TokenGateway`]: collateral custody transfers plus synthetic mint/burn
//! - [`DebtValuation`]: total USD value of a domain's debt pool
//!
//! [`InMemoryTokens`] implements both and is what tests and embedders without
//! a real token ledger plug in.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::core::types::{Account, CurrencyKey};

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSFER ERROR
// ═══════════════════════════════════════════════════════════════════════════════

/// Failure reported by the token collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferError {
    /// Sender does not hold enough tokens
    #[error("insufficient {currency} balance for {account}: required {required}, available {available}")]
    InsufficientBalance {
        /// Token symbol
        currency: String,
        /// Sender
        account: String,
        /// Requested amount
        required: U256,
        /// Sender balance
        available: U256,
    },

    /// Token refused the transfer for its own reasons
    #[error("{0}")]
    Rejected(String),
}

/// Result of a collaborator call
pub type TransferResult = std::result::Result<(), TransferError>;

// ═══════════════════════════════════════════════════════════════════════════════
// COLLABORATOR TRAITS
// ═══════════════════════════════════════════════════════════════════════════════

/// Token ownership primitives used by the core
pub trait TokenGateway {
    /// Move `amount` of collateral from `from` into protocol custody
    fn transfer_in(&mut self, currency: &CurrencyKey, from: &Account, amount: U256) -> TransferResult;

    /// Move `amount` of collateral out of protocol custody to `to`
    fn transfer_out(&mut self, currency: &CurrencyKey, to: &Account, amount: U256) -> TransferResult;

    /// Mint synthetic USD booked against `domain`
    fn mint(&mut self, domain: &CurrencyKey, to: &Account, amount: U256) -> TransferResult;

    /// Burn synthetic USD booked against `domain`
    fn burn(&mut self, domain: &CurrencyKey, from: &Account, amount: U256) -> TransferResult;

    /// Move synthetic USD of `domain` between accounts; supply is unchanged
    fn transfer_synth(
        &mut self,
        domain: &CurrencyKey,
        from: &Account,
        to: &Account,
        amount: U256,
    ) -> TransferResult;
}

/// Valuation of a domain's debt pool
pub trait DebtValuation {
    /// Total USD value of all debt issued against `domain`
    fn total_debt_value_usd(&self, domain: &CurrencyKey) -> U256;
}

// ═══════════════════════════════════════════════════════════════════════════════
// IN-MEMORY TOKENS
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory token ledger: wallets, protocol custody and synthetic supply
///
/// Debt value of a domain defaults to the synthetic supply booked against it
/// (synthetic USD priced at 1.0). [`InMemoryTokens::set_debt_value`] overrides
/// it to model pool value moving with exchange activity.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTokens {
    /// Collateral wallets by (currency, account)
    wallets: BTreeMap<(CurrencyKey, Account), U256>,
    /// Collateral held by the protocol, per currency
    custody: BTreeMap<CurrencyKey, U256>,
    /// Synthetic balances by (domain, account)
    synths: BTreeMap<(CurrencyKey, Account), U256>,
    /// Synthetic supply per domain
    supply: BTreeMap<CurrencyKey, U256>,
    /// Explicit debt value per domain
    debt_value: BTreeMap<CurrencyKey, U256>,
    /// Accounts whose outgoing transfers are refused
    frozen: Vec<Account>,
}

impl InMemoryTokens {
    /// Create an empty token ledger
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SETUP
    // ═══════════════════════════════════════════════════════════════════════════

    /// Credit collateral to a wallet
    pub fn credit(&mut self, currency: &CurrencyKey, account: &Account, amount: U256) {
        let balance = self.wallets.entry((currency.clone(), *account)).or_default();
        *balance = balance.saturating_add(amount);
    }

    /// Override the debt value of a domain (`None` reverts to synthetic supply)
    pub fn set_debt_value(&mut self, domain: &CurrencyKey, value: Option<U256>) {
        match value {
            Some(v) => {
                self.debt_value.insert(domain.clone(), v);
            }
            None => {
                self.debt_value.remove(domain);
            }
        }
    }

    /// Refuse or allow outgoing transfers from an account
    pub fn set_frozen(&mut self, account: &Account, frozen: bool) {
        self.frozen.retain(|a| a != account);
        if frozen {
            self.frozen.push(*account);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Collateral wallet balance
    pub fn balance_of(&self, currency: &CurrencyKey, account: &Account) -> U256 {
        self.wallets
            .get(&(currency.clone(), *account))
            .copied()
            .unwrap_or_default()
    }

    /// Collateral held in protocol custody
    pub fn custody_balance(&self, currency: &CurrencyKey) -> U256 {
        self.custody.get(currency).copied().unwrap_or_default()
    }

    /// Synthetic balance of an account in a domain
    pub fn synth_balance(&self, domain: &CurrencyKey, account: &Account) -> U256 {
        self.synths
            .get(&(domain.clone(), *account))
            .copied()
            .unwrap_or_default()
    }

    /// Synthetic supply of a domain
    pub fn synth_supply(&self, domain: &CurrencyKey) -> U256 {
        self.supply.get(domain).copied().unwrap_or_default()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INTERNAL
    // ═══════════════════════════════════════════════════════════════════════════

    fn ensure_not_frozen(&self, account: &Account) -> TransferResult {
        if self.frozen.contains(account) {
            return Err(TransferError::Rejected(format!("account {} is frozen", account)));
        }
        Ok(())
    }

    fn debit(
        map: &mut BTreeMap<(CurrencyKey, Account), U256>,
        currency: &CurrencyKey,
        account: &Account,
        amount: U256,
    ) -> TransferResult {
        let key = (currency.clone(), *account);
        let available = map.get(&key).copied().unwrap_or_default();
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                currency: currency.to_string(),
                account: account.to_string(),
                required: amount,
                available,
            });
        }
        let remaining = available - amount;
        if remaining.is_zero() {
            map.remove(&key);
        } else {
            map.insert(key, remaining);
        }
        Ok(())
    }
}

impl TokenGateway for InMemoryTokens {
    fn transfer_in(&mut self, currency: &CurrencyKey, from: &Account, amount: U256) -> TransferResult {
        self.ensure_not_frozen(from)?;
        Self::debit(&mut self.wallets, currency, from, amount)?;
        let held = self.custody.entry(currency.clone()).or_default();
        *held = held.saturating_add(amount);
        Ok(())
    }

    fn transfer_out(&mut self, currency: &CurrencyKey, to: &Account, amount: U256) -> TransferResult {
        let held = self.custody.get(currency).copied().unwrap_or_default();
        if held < amount {
            return Err(TransferError::InsufficientBalance {
                currency: currency.to_string(),
                account: "custody".into(),
                required: amount,
                available: held,
            });
        }
        self.custody.insert(currency.clone(), held - amount);
        self.credit(currency, to, amount);
        Ok(())
    }

    fn mint(&mut self, domain: &CurrencyKey, to: &Account, amount: U256) -> TransferResult {
        let supply = self.synth_supply(domain);
        let new_supply = supply
            .checked_add(amount)
            .ok_or_else(|| TransferError::Rejected("synthetic supply overflow".into()))?;
        self.supply.insert(domain.clone(), new_supply);
        let balance = self.synths.entry((domain.clone(), *to)).or_default();
        *balance = balance.saturating_add(amount);
        Ok(())
    }

    fn burn(&mut self, domain: &CurrencyKey, from: &Account, amount: U256) -> TransferResult {
        self.ensure_not_frozen(from)?;
        Self::debit(&mut self.synths, domain, from, amount)?;
        let supply = self.synth_supply(domain);
        self.supply.insert(domain.clone(), supply.saturating_sub(amount));
        Ok(())
    }

    fn transfer_synth(
        &mut self,
        domain: &CurrencyKey,
        from: &Account,
        to: &Account,
        amount: U256,
    ) -> TransferResult {
        self.ensure_not_frozen(from)?;
        Self::debit(&mut self.synths, domain, from, amount)?;
        let balance = self.synths.entry((domain.clone(), *to)).or_default();
        *balance = balance.saturating_add(amount);
        Ok(())
    }
}

impl DebtValuation for InMemoryTokens {
    fn total_debt_value_usd(&self, domain: &CurrencyKey) -> U256 {
        self.debt_value
            .get(domain)
            .copied()
            .unwrap_or_else(|| self.synth_supply(domain))
    }
}
