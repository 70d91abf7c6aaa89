//! Locked-reward ledger.
//!
//! Reward entries are time-locked native collateral credited to an account.
//! Ids grow from 1 and are never reused; a fully unlocked or fully consumed
//! entry stays in the ledger with amount and unlock time zeroed.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::core::types::{Account, Timestamp};
use crate::error::{Error, Result};
use crate::utils::math::*;
use crate::utils::validation::{
    validate_non_zero, validate_reward_entry, validate_same_length, validate_unique_ids,
};

// ═══════════════════════════════════════════════════════════════════════════════
// REWARD ENTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// A time-locked reward
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardEntry {
    /// Entry id
    pub id: u64,
    /// Account the reward belongs to
    pub owner: Account,
    /// Locked amount (zero once consumed)
    pub amount: U256,
    /// Unlock timestamp (zero once consumed)
    pub unlock_time: Timestamp,
}

impl RewardEntry {
    /// Check if the entry still holds collateral
    pub fn is_live(&self) -> bool {
        !self.amount.is_zero()
    }
}

/// Entries removed and created by a swap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapOutcome {
    /// Entries as they were before removal
    pub removed: Vec<RewardEntry>,
    /// Ids of the new entries
    pub added: Vec<u64>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// REWARD LOCKER
// ═══════════════════════════════════════════════════════════════════════════════

/// Ledger of time-locked reward entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardLocker {
    last_entry_id: u64,
    entries: BTreeMap<u64, RewardEntry>,
    locked: BTreeMap<Account, U256>,
    total_locked: U256,
}

impl RewardLocker {
    /// Create an empty locker
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // MUTATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Create a new entry; returns its id
    pub fn add(&mut self, owner: &Account, amount: U256, unlock_time: Timestamp) -> Result<u64> {
        validate_reward_entry(amount, unlock_time)?;

        let id = self.last_entry_id.checked_add(1).ok_or_else(|| Error::Overflow {
            operation: "reward entry id".into(),
        })?;
        let locked = safe_add(self.locked_amount(owner), amount)?;
        let total = safe_add(self.total_locked, amount)?;

        self.entries.insert(
            id,
            RewardEntry {
                id,
                owner: *owner,
                amount,
                unlock_time,
            },
        );
        self.locked.insert(*owner, locked);
        self.total_locked = total;
        self.last_entry_id = id;

        debug!(entry_id = id, %owner, %amount, unlock_time, "reward entry added");
        Ok(id)
    }

    /// Create one entry per row; returns the new ids in order
    pub fn migrate(
        &mut self,
        owners: &[Account],
        amounts: &[U256],
        unlock_times: &[Timestamp],
    ) -> Result<Vec<u64>> {
        validate_same_length("migrate_rewards", &[owners.len(), amounts.len(), unlock_times.len()])?;
        owners
            .iter()
            .zip(amounts)
            .zip(unlock_times)
            .map(|((owner, amount), unlock_time)| self.add(owner, *amount, *unlock_time))
            .collect()
    }

    /// Remove an entry entirely; returns it as it was
    pub fn remove(&mut self, owner: &Account, entry_id: u64) -> Result<RewardEntry> {
        let entry = self.live_entry(owner, entry_id)?.clone();
        self.reduce_entry(owner, entry_id, entry.amount)?;
        Ok(entry)
    }

    /// Take `amount` out of an entry, zeroing it when nothing remains
    ///
    /// Returns the amount left in the entry.
    pub fn reduce_entry(&mut self, owner: &Account, entry_id: u64, amount: U256) -> Result<U256> {
        validate_non_zero(amount, "entry reduction")?;

        let current = self.live_entry(owner, entry_id)?.amount;
        if amount > current {
            return Err(Error::InsufficientLockedCollateral {
                required: amount,
                available: current,
            });
        }
        let locked = safe_sub(self.locked_amount(owner), amount)?;
        let total = safe_sub(self.total_locked, amount)?;

        let remaining = current - amount;
        if let Some(entry) = self.entries.get_mut(&entry_id) {
            entry.amount = remaining;
            if remaining.is_zero() {
                entry.unlock_time = 0;
            }
        }
        self.set_locked(owner, locked);
        self.total_locked = total;

        debug!(entry_id, %owner, %amount, %remaining, "reward entry reduced");
        Ok(remaining)
    }

    /// Replace entries of `owner` with new ones carrying the same total
    pub fn swap(
        &mut self,
        owner: &Account,
        entry_ids: &[u64],
        new_amounts: &[U256],
        new_unlock_times: &[Timestamp],
    ) -> Result<SwapOutcome> {
        validate_same_length("swap_reward_entries", &[new_amounts.len(), new_unlock_times.len()])?;
        validate_unique_ids(entry_ids)?;

        let mut removed_total = U256::zero();
        for id in entry_ids {
            removed_total = safe_add(removed_total, self.live_entry(owner, *id)?.amount)?;
        }
        let mut added_total = U256::zero();
        for (amount, unlock_time) in new_amounts.iter().zip(new_unlock_times) {
            validate_reward_entry(*amount, *unlock_time)?;
            added_total = safe_add(added_total, *amount)?;
        }
        if removed_total != added_total {
            return Err(Error::RewardAmountMismatch {
                removed: removed_total,
                added: added_total,
            });
        }

        let removed = entry_ids
            .iter()
            .map(|id| self.remove(owner, *id))
            .collect::<Result<Vec<_>>>()?;
        let added = new_amounts
            .iter()
            .zip(new_unlock_times)
            .map(|(amount, unlock_time)| self.add(owner, *amount, *unlock_time))
            .collect::<Result<Vec<_>>>()?;

        Ok(SwapOutcome { removed, added })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// A live entry owned by `owner`
    ///
    /// Absent, consumed and foreign entries all fail with `EntryNotFound`.
    pub fn live_entry(&self, owner: &Account, entry_id: u64) -> Result<&RewardEntry> {
        self.entries
            .get(&entry_id)
            .filter(|entry| entry.owner == *owner && entry.is_live())
            .ok_or(Error::EntryNotFound(entry_id))
    }

    /// Any entry by id, including consumed ones
    pub fn entry(&self, entry_id: u64) -> Option<&RewardEntry> {
        self.entries.get(&entry_id)
    }

    /// Live entries of an account in id order
    pub fn entries_of<'a>(&'a self, owner: &'a Account) -> impl Iterator<Item = &'a RewardEntry> + 'a {
        self.entries
            .values()
            .filter(move |entry| entry.owner == *owner && entry.is_live())
    }

    /// All entries in id order
    pub fn entries(&self) -> impl Iterator<Item = &RewardEntry> {
        self.entries.values()
    }

    /// Locked amount of an account
    pub fn locked_amount(&self, owner: &Account) -> U256 {
        self.locked.get(owner).copied().unwrap_or_default()
    }

    /// Locked amount across all accounts
    pub fn total_locked(&self) -> U256 {
        self.total_locked
    }

    /// Id of the most recently created entry (0 when none)
    pub fn last_entry_id(&self) -> u64 {
        self.last_entry_id
    }

    /// Verify per-account and global locked totals against the entries
    pub fn check_invariant(&self) -> Result<()> {
        let mut per_owner: BTreeMap<Account, U256> = BTreeMap::new();
        let mut total = U256::zero();
        for entry in self.entries.values() {
            if entry.id > self.last_entry_id {
                return Err(Error::InvariantViolation(format!(
                    "entry {} beyond last id {}",
                    entry.id, self.last_entry_id
                )));
            }
            if !entry.is_live() {
                continue;
            }
            let held = per_owner.entry(entry.owner).or_default();
            *held = safe_add(*held, entry.amount)?;
            total = safe_add(total, entry.amount)?;
        }

        if total != self.total_locked {
            return Err(Error::InvariantViolation(format!(
                "locked entries sum {} != total {}",
                total, self.total_locked
            )));
        }
        if per_owner != self.locked {
            return Err(Error::InvariantViolation(
                "per-account locked amounts disagree with entries".into(),
            ));
        }
        Ok(())
    }

    fn set_locked(&mut self, owner: &Account, amount: U256) {
        if amount.is_zero() {
            self.locked.remove(owner);
        } else {
            self.locked.insert(*owner, amount);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::{ACCOUNT_LENGTH, MAX_UNLOCK_TIME, REWARD_AMOUNT_BITS};

    fn alice() -> Account {
        Account::new([0x02; ACCOUNT_LENGTH])
    }

    fn bob() -> Account {
        Account::new([0x03; ACCOUNT_LENGTH])
    }

    #[test]
    fn test_add_reward() {
        let mut locker = RewardLocker::new();
        let id = locker.add(&bob(), U256::from(10u64), 20).unwrap();

        assert_eq!(id, 1);
        let entry = locker.entry(1).unwrap();
        assert_eq!(entry.amount, U256::from(10u64));
        assert_eq!(entry.unlock_time, 20);
        assert_eq!(locker.locked_amount(&bob()), U256::from(10u64));
        assert_eq!(locker.total_locked(), U256::from(10u64));
    }

    #[test]
    fn test_migrate_rewards() {
        let mut locker = RewardLocker::new();
        let ids = locker
            .migrate(
                &[alice(), bob()],
                &[U256::from(10u64), U256::from(20u64)],
                &[30, 40],
            )
            .unwrap();

        assert_eq!(ids, vec![1, 2]);
        assert_eq!(locker.locked_amount(&alice()), U256::from(10u64));
        assert_eq!(locker.locked_amount(&bob()), U256::from(20u64));
        assert_eq!(locker.total_locked(), U256::from(30u64));

        assert!(locker.migrate(&[alice()], &[], &[1]).is_err());
    }

    #[test]
    fn test_reward_bounds() {
        let mut locker = RewardLocker::new();
        let too_big = U256::one() << REWARD_AMOUNT_BITS;
        assert!(matches!(locker.add(&bob(), too_big, 1), Err(Error::Overflow { .. })));
        assert!(matches!(
            locker.add(&bob(), U256::one(), MAX_UNLOCK_TIME + 1),
            Err(Error::Overflow { .. })
        ));
        assert_eq!(locker.last_entry_id(), 0);
    }

    #[test]
    fn test_remove_zeroes_entry_and_keeps_id() {
        let mut locker = RewardLocker::new();
        locker.add(&bob(), U256::from(10u64), 20).unwrap();

        let removed = locker.remove(&bob(), 1).unwrap();
        assert_eq!(removed.amount, U256::from(10u64));

        let entry = locker.entry(1).unwrap();
        assert_eq!(entry.amount, U256::zero());
        assert_eq!(entry.unlock_time, 0);
        assert_eq!(locker.total_locked(), U256::zero());

        // Consumed and foreign entries are not found
        assert!(matches!(locker.remove(&bob(), 1), Err(Error::EntryNotFound(1))));
        locker.add(&alice(), U256::from(5u64), 20).unwrap();
        assert!(matches!(locker.remove(&bob(), 2), Err(Error::EntryNotFound(2))));
        assert_eq!(locker.add(&bob(), U256::one(), 1).unwrap(), 3);
    }

    #[test]
    fn test_reduce_entry_partially() {
        let mut locker = RewardLocker::new();
        locker.add(&alice(), wad(40), 100).unwrap();

        let remaining = locker.reduce_entry(&alice(), 1, wad(15)).unwrap();
        assert_eq!(remaining, wad(25));
        assert_eq!(locker.entry(1).unwrap().unlock_time, 100);
        assert_eq!(locker.locked_amount(&alice()), wad(25));

        assert!(matches!(
            locker.reduce_entry(&alice(), 1, wad(26)),
            Err(Error::InsufficientLockedCollateral { .. })
        ));
        assert!(locker.check_invariant().is_ok());
    }

    #[test]
    fn test_swap_entries() {
        let mut locker = RewardLocker::new();
        locker.add(&alice(), U256::from(10u64), 20).unwrap();
        locker.add(&alice(), U256::from(20u64), 30).unwrap();

        let outcome = locker
            .swap(
                &alice(),
                &[1, 2],
                &[U256::from(5u64), U256::from(10u64), U256::from(15u64)],
                &[50, 60, 70],
            )
            .unwrap();

        assert_eq!(outcome.removed.len(), 2);
        assert_eq!(outcome.added, vec![3, 4, 5]);
        assert_eq!(locker.entry(1).unwrap().amount, U256::zero());
        assert_eq!(locker.entry(5).unwrap().unlock_time, 70);
        assert_eq!(locker.locked_amount(&alice()), U256::from(30u64));
        assert_eq!(locker.last_entry_id(), 5);
        assert!(locker.check_invariant().is_ok());
    }

    #[test]
    fn test_swap_rejects_mismatch_and_unknown() {
        let mut locker = RewardLocker::new();
        locker.add(&alice(), U256::from(10u64), 20).unwrap();

        assert!(matches!(
            locker.swap(&alice(), &[1], &[U256::from(11u64)], &[30]),
            Err(Error::RewardAmountMismatch { .. })
        ));
        assert!(matches!(
            locker.swap(&alice(), &[7], &[U256::from(10u64)], &[30]),
            Err(Error::EntryNotFound(7))
        ));
        assert_eq!(locker.locked_amount(&alice()), U256::from(10u64));
        assert_eq!(locker.last_entry_id(), 1);
    }
}
