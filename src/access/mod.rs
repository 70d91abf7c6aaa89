//! Capability-based authorization.
//!
//! Ledgers never check callers. The protocol asks an [`AccessControl`]
//! collaborator whether a caller holds a [`Capability`] before every gated
//! operation. [`AccessController`] is the in-memory implementation: an owner
//! (who implicitly holds `Admin`) grants and revokes capabilities.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::info;

use crate::core::config::ComponentAccounts;
use crate::core::types::Account;
use crate::error::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// CAPABILITIES
// ═══════════════════════════════════════════════════════════════════════════════

/// Rights a caller may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Mint debt shares
    IssueDebt,
    /// Burn or write off debt shares
    BurnDebt,
    /// Move collateral between accounts during liquidation
    MoveReward,
    /// Create locked reward entries
    LockReward,
    /// Owner-level administration (currencies, migrations, swaps)
    Admin,
}

impl Capability {
    /// All capabilities
    pub const ALL: [Capability; 5] = [
        Capability::IssueDebt,
        Capability::BurnDebt,
        Capability::MoveReward,
        Capability::LockReward,
        Capability::Admin,
    ];

    /// Role name as used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            Capability::IssueDebt => "ISSUE_DEBT",
            Capability::BurnDebt => "BURN_DEBT",
            Capability::MoveReward => "MOVE_REWARD",
            Capability::LockReward => "LOCK_REWARD",
            Capability::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Authorization collaborator
pub trait AccessControl {
    /// Check whether `caller` holds `capability`
    fn has_capability(&self, caller: &Account, capability: Capability) -> bool;
}

/// Fail with `Unauthorized` unless `caller` holds `capability`
pub fn require_capability<A: AccessControl + ?Sized>(
    access: &A,
    caller: &Account,
    capability: Capability,
) -> Result<()> {
    if !access.has_capability(caller, capability) {
        return Err(Error::Unauthorized(format!("{} lacks {} role", caller, capability)));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// ACCESS CONTROLLER
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory role registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessController {
    owner: Account,
    grants: BTreeMap<Capability, BTreeSet<Account>>,
}

impl AccessController {
    /// Create a registry owned by `owner`
    pub fn new(owner: Account) -> Self {
        Self {
            owner,
            grants: BTreeMap::new(),
        }
    }

    /// Owner account
    pub fn owner(&self) -> &Account {
        &self.owner
    }

    /// Grant a capability (owner only)
    pub fn grant(&mut self, caller: &Account, account: &Account, capability: Capability) -> Result<()> {
        self.ensure_owner(caller)?;
        if self.grants.entry(capability).or_default().insert(*account) {
            info!(%account, %capability, "capability granted");
        }
        Ok(())
    }

    /// Revoke a capability (owner only)
    pub fn revoke(&mut self, caller: &Account, account: &Account, capability: Capability) -> Result<()> {
        self.ensure_owner(caller)?;
        if let Some(holders) = self.grants.get_mut(&capability) {
            if holders.remove(account) {
                info!(%account, %capability, "capability revoked");
            }
        }
        Ok(())
    }

    /// Grant the protocol's internal components the rights they act with
    ///
    /// | Component | Capabilities |
    /// |---|---|
    /// | mint/burn gateway | `IssueDebt`, `BurnDebt` |
    /// | liquidation engine | `BurnDebt`, `MoveReward` |
    /// | reward system | `LockReward` |
    pub fn grant_components(&mut self, caller: &Account, components: &ComponentAccounts) -> Result<()> {
        self.grant(caller, &components.build_burn, Capability::IssueDebt)?;
        self.grant(caller, &components.build_burn, Capability::BurnDebt)?;
        self.grant(caller, &components.liquidation, Capability::BurnDebt)?;
        self.grant(caller, &components.liquidation, Capability::MoveReward)?;
        self.grant(caller, &components.reward_system, Capability::LockReward)
    }

    /// Hand ownership to another account (owner only)
    pub fn transfer_ownership(&mut self, caller: &Account, new_owner: &Account) -> Result<()> {
        self.ensure_owner(caller)?;
        self.owner = *new_owner;
        info!(%new_owner, "ownership transferred");
        Ok(())
    }

    fn ensure_owner(&self, caller: &Account) -> Result<()> {
        if *caller != self.owner {
            return Err(Error::Unauthorized(format!("{} is not the owner", caller)));
        }
        Ok(())
    }
}

impl AccessControl for AccessController {
    fn has_capability(&self, caller: &Account, capability: Capability) -> bool {
        if capability == Capability::Admin && *caller == self.owner {
            return true;
        }
        self.grants
            .get(&capability)
            .map(|holders| holders.contains(caller))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::ACCOUNT_LENGTH;

    fn owner() -> Account {
        Account::new([0x01; ACCOUNT_LENGTH])
    }

    fn alice() -> Account {
        Account::new([0x02; ACCOUNT_LENGTH])
    }

    #[test]
    fn test_owner_is_admin() {
        let access = AccessController::new(owner());
        assert!(access.has_capability(&owner(), Capability::Admin));
        assert!(!access.has_capability(&owner(), Capability::LockReward));
        assert!(!access.has_capability(&alice(), Capability::Admin));
    }

    #[test]
    fn test_grant_and_revoke() {
        let mut access = AccessController::new(owner());
        access.grant(&owner(), &alice(), Capability::LockReward).unwrap();
        assert!(access.has_capability(&alice(), Capability::LockReward));
        assert!(require_capability(&access, &alice(), Capability::LockReward).is_ok());

        access.revoke(&owner(), &alice(), Capability::LockReward).unwrap();
        assert!(matches!(
            require_capability(&access, &alice(), Capability::LockReward),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn test_only_owner_grants() {
        let mut access = AccessController::new(owner());
        assert!(access.grant(&alice(), &alice(), Capability::IssueDebt).is_err());

        access.transfer_ownership(&owner(), &alice()).unwrap();
        assert!(access.grant(&alice(), &alice(), Capability::IssueDebt).is_ok());
        assert!(!access.has_capability(&owner(), Capability::Admin));
    }

    #[test]
    fn test_grant_components() {
        let mut access = AccessController::new(owner());
        let components = ComponentAccounts::default();
        access.grant_components(&owner(), &components).unwrap();

        assert!(access.has_capability(&components.build_burn, Capability::IssueDebt));
        assert!(access.has_capability(&components.liquidation, Capability::MoveReward));
        assert!(!access.has_capability(&components.liquidation, Capability::IssueDebt));
        assert!(access.has_capability(&components.reward_system, Capability::LockReward));
        assert!(!access.has_capability(&components.reward_system, Capability::BurnDebt));
    }

    #[test]
    fn test_error_names_role() {
        let access = AccessController::new(owner());
        let err = require_capability(&access, &alice(), Capability::LockReward).unwrap_err();
        assert!(err.to_string().contains("LOCK_REWARD"));
    }
}
