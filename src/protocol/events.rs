//! Protocol events for state change notifications.
//!
//! Every committed operation appends its events to the protocol's
//! [`EventLog`]; a failed operation leaves no events behind.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::core::types::{Account, CurrencyKey, Timestamp};

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// All protocol event types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolEvent {
    // Collateral Events
    /// Currency registered or updated
    CurrencyUpdated(CurrencyUpdatedEvent),
    /// Collateral was staked
    CollateralStaked(CollateralEvent),
    /// Collateral was redeemed
    CollateralRedeemed(CollateralEvent),
    /// Unlocked reward was staked on behalf of its owner
    CollateralFromUnlockReward(CollateralFromUnlockRewardEvent),

    // Debt Events
    /// Debt built and synthetic minted
    DebtBuilt(DebtEvent),
    /// Debt burnt and synthetic burnt
    DebtBurnt(DebtEvent),

    // Liquidation Events
    /// Position marked for liquidation
    PositionMarked(PositionMarkedEvent),
    /// Mark removed
    PositionUnmarked(PositionUnmarkedEvent),
    /// Position liquidated
    PositionLiquidated(PositionLiquidatedEvent),

    // Reward Events
    /// Locked reward entry created
    RewardEntryAdded(RewardEntryEvent),
    /// Locked reward entry removed by a swap or drained by a liquidation
    RewardEntryRemoved(RewardEntryEvent),
    /// Locked reward entry partially drawn by a liquidation; `amount` is what is left
    RewardEntryReduced(RewardEntryEvent),
    /// Locked reward entry unlocked
    RewardEntryUnlocked(RewardEntryEvent),
    /// Signed period reward claimed
    RewardClaimed(RewardClaimedEvent),
}

impl ProtocolEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::CurrencyUpdated(_) => "CurrencyUpdated",
            Self::CollateralStaked(_) => "CollateralStaked",
            Self::CollateralRedeemed(_) => "CollateralRedeemed",
            Self::CollateralFromUnlockReward(_) => "CollateralFromUnlockReward",
            Self::DebtBuilt(_) => "DebtBuilt",
            Self::DebtBurnt(_) => "DebtBurnt",
            Self::PositionMarked(_) => "PositionMarked",
            Self::PositionUnmarked(_) => "PositionUnmarked",
            Self::PositionLiquidated(_) => "PositionLiquidated",
            Self::RewardEntryAdded(_) => "RewardEntryAdded",
            Self::RewardEntryRemoved(_) => "RewardEntryRemoved",
            Self::RewardEntryReduced(_) => "RewardEntryReduced",
            Self::RewardEntryUnlocked(_) => "RewardEntryUnlocked",
            Self::RewardClaimed(_) => "RewardClaimed",
        }
    }

    /// Get the timestamp of the event
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Self::CurrencyUpdated(e) => e.timestamp,
            Self::CollateralStaked(e) | Self::CollateralRedeemed(e) => e.timestamp,
            Self::CollateralFromUnlockReward(e) => e.timestamp,
            Self::DebtBuilt(e) | Self::DebtBurnt(e) => e.timestamp,
            Self::PositionMarked(e) => e.timestamp,
            Self::PositionUnmarked(e) => e.timestamp,
            Self::PositionLiquidated(e) => e.timestamp,
            Self::RewardEntryAdded(e)
            | Self::RewardEntryRemoved(e)
            | Self::RewardEntryReduced(e)
            | Self::RewardEntryUnlocked(e) => e.timestamp,
            Self::RewardClaimed(e) => e.timestamp,
        }
    }

    /// Get the block height of the event
    pub fn block_height(&self) -> u64 {
        match self {
            Self::CurrencyUpdated(e) => e.block_height,
            Self::CollateralStaked(e) | Self::CollateralRedeemed(e) => e.block_height,
            Self::CollateralFromUnlockReward(e) => e.block_height,
            Self::DebtBuilt(e) | Self::DebtBurnt(e) => e.block_height,
            Self::PositionMarked(e) => e.block_height,
            Self::PositionUnmarked(e) => e.block_height,
            Self::PositionLiquidated(e) => e.block_height,
            Self::RewardEntryAdded(e)
            | Self::RewardEntryRemoved(e)
            | Self::RewardEntryReduced(e)
            | Self::RewardEntryUnlocked(e) => e.block_height,
            Self::RewardClaimed(e) => e.block_height,
        }
    }

    /// Account the event is primarily about, if any
    pub fn account(&self) -> Option<&Account> {
        match self {
            Self::CurrencyUpdated(_) => None,
            Self::CollateralStaked(e) | Self::CollateralRedeemed(e) => Some(&e.account),
            Self::CollateralFromUnlockReward(e) => Some(&e.account),
            Self::DebtBuilt(e) | Self::DebtBurnt(e) => Some(&e.account),
            Self::PositionMarked(e) => Some(&e.account),
            Self::PositionUnmarked(e) => Some(&e.account),
            Self::PositionLiquidated(e) => Some(&e.account),
            Self::RewardEntryAdded(e)
            | Self::RewardEntryRemoved(e)
            | Self::RewardEntryReduced(e)
            | Self::RewardEntryUnlocked(e) => Some(&e.account),
            Self::RewardClaimed(e) => Some(&e.recipient),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when a currency is registered or updated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyUpdatedEvent {
    /// Currency symbol
    pub currency: CurrencyKey,
    /// Token reference
    pub token_ref: String,
    /// Minimum non-zero balance after a redeem
    pub min_collateral: U256,
    /// Whether new stakes are refused
    pub closed: bool,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: Timestamp,
}

/// Event emitted when collateral is staked or redeemed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralEvent {
    /// Collateral owner
    pub account: Account,
    /// Currency
    pub currency: CurrencyKey,
    /// Amount moved
    pub amount: U256,
    /// Staked balance afterwards
    pub new_staked: U256,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: Timestamp,
}

/// Event emitted when an unlocked reward is staked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralFromUnlockRewardEvent {
    /// Reward owner
    pub account: Account,
    /// Account funding the collateral
    pub rewarder: Account,
    /// Native currency
    pub currency: CurrencyKey,
    /// Amount staked
    pub amount: U256,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: Timestamp,
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEBT EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when debt is built or burnt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtEvent {
    /// Debtor
    pub account: Account,
    /// Collateral domain
    pub domain: CurrencyKey,
    /// USD amount
    pub amount: U256,
    /// Shares minted or burnt
    pub shares: U256,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: Timestamp,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when a position is marked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionMarkedEvent {
    /// Marked account
    pub account: Account,
    /// Collateral domain
    pub domain: CurrencyKey,
    /// Marker
    pub marker: Account,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: Timestamp,
}

/// Event emitted when a mark is removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUnmarkedEvent {
    /// Account
    pub account: Account,
    /// Collateral domain
    pub domain: CurrencyKey,
    /// Who removed the mark
    pub caller: Account,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: Timestamp,
}

/// Event emitted when a position is liquidated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionLiquidatedEvent {
    /// Liquidated account
    pub account: Account,
    /// Collateral domain
    pub domain: CurrencyKey,
    /// Liquidator
    pub liquidator: Account,
    /// Marker
    pub marker: Account,
    /// USD debt written off
    pub burn_amount: U256,
    /// Collateral worth the burnt debt
    pub principal: U256,
    /// Marker reward
    pub marker_reward: U256,
    /// Liquidator reward
    pub liquidator_reward: U256,
    /// Collateral taken from staked balance
    pub collateral_from_staked: U256,
    /// Collateral taken from locked entries
    pub collateral_from_locked: U256,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: Timestamp,
}

// ═══════════════════════════════════════════════════════════════════════════════
// REWARD EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Event emitted when a reward entry is added, reduced, removed or unlocked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardEntryEvent {
    /// Entry id
    pub entry_id: u64,
    /// Entry owner
    pub account: Account,
    /// Entry amount
    pub amount: U256,
    /// Unlock time of the entry
    pub unlock_time: Timestamp,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: Timestamp,
}

/// Event emitted when a signed period reward is claimed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardClaimedEvent {
    /// Claiming account
    pub recipient: Account,
    /// Reward period
    pub period_id: u64,
    /// Native collateral locked for the recipient
    pub staking_reward: U256,
    /// Synthetic paid out from the fee pool
    pub fee_reward: U256,
    /// Block height
    pub block_height: u64,
    /// Timestamp
    pub timestamp: Timestamp,
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT LOG
// ═══════════════════════════════════════════════════════════════════════════════

/// Collection of events from a transaction or block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<ProtocolEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Add an event to the log
    pub fn push(&mut self, event: ProtocolEvent) {
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[ProtocolEvent] {
        &self.events
    }

    /// Get events of a specific type
    pub fn filter_by_type(&self, event_type: &str) -> Vec<&ProtocolEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Get events concerning an account
    pub fn filter_by_account(&self, account: &Account) -> Vec<&ProtocolEvent> {
        self.events
            .iter()
            .filter(|e| e.account() == Some(account))
            .collect()
    }

    /// Get the number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Merge another event log into this one
    pub fn merge(&mut self, other: EventLog) {
        self.events.extend(other.events);
    }

    /// Drop events recorded after the first `len`
    pub fn truncate(&mut self, len: usize) {
        self.events.truncate(len);
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::ACCOUNT_LENGTH;

    fn alice() -> Account {
        Account::new([0xa1; ACCOUNT_LENGTH])
    }

    fn staked_event(amount: u64, timestamp: Timestamp) -> ProtocolEvent {
        ProtocolEvent::CollateralStaked(CollateralEvent {
            account: alice(),
            currency: CurrencyKey::new("ATH").unwrap(),
            amount: U256::from(amount),
            new_staked: U256::from(amount),
            block_height: 100,
            timestamp,
        })
    }

    #[test]
    fn test_event_types() {
        let event = staked_event(10, 1234567890);
        assert_eq!(event.event_type(), "CollateralStaked");
        assert_eq!(event.timestamp(), 1234567890);
        assert_eq!(event.block_height(), 100);
        assert_eq!(event.account(), Some(&alice()));
    }

    #[test]
    fn test_event_log() {
        let mut log = EventLog::new();
        assert!(log.is_empty());

        log.push(staked_event(10, 1));
        log.push(ProtocolEvent::RewardEntryAdded(RewardEntryEvent {
            entry_id: 1,
            account: alice(),
            amount: U256::from(5u64),
            unlock_time: 99,
            block_height: 100,
            timestamp: 2,
        }));

        assert_eq!(log.len(), 2);
        assert_eq!(log.filter_by_type("CollateralStaked").len(), 1);
        assert_eq!(log.filter_by_type("RewardEntryAdded").len(), 1);
        assert_eq!(log.filter_by_account(&alice()).len(), 2);
    }

    #[test]
    fn test_truncate_and_merge() {
        let mut log = EventLog::new();
        log.push(staked_event(1, 1));
        log.push(staked_event(2, 2));
        log.truncate(1);
        assert_eq!(log.len(), 1);

        let mut other = EventLog::new();
        other.push(staked_event(3, 3));
        log.merge(other);
        assert_eq!(log.events()[1].timestamp(), 3);
    }

    #[test]
    fn test_event_serializes() {
        let event = staked_event(10, 1);
        let json = serde_json::to_string(&event).unwrap();
        let back: ProtocolEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
