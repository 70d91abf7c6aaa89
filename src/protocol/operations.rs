//! Protocol operations - atomic state changes.
//!
//! Every mutating entry point of [`Protocol`](crate::protocol::Protocol) has
//! an operation struct here, so operations can be queued, serialized and
//! replayed through `Protocol::execute`.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::core::build_burn::DebtChange;
use crate::core::rewards::SwapOutcome;
use crate::core::types::{Account, CurrencyKey, Timestamp};
use crate::liquidation::engine::{LiquidationMark, LiquidationOutcome};
use crate::utils::crypto::{PublicKey, Signature};

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATION TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Trait for protocol operations
pub trait Operation {
    /// Get the operation type name
    fn operation_type(&self) -> &'static str;

    /// Account submitting the operation
    fn caller(&self) -> &Account;
}

macro_rules! impl_operation {
    ($op:ty, $name:literal, $caller:ident) => {
        impl Operation for $op {
            fn operation_type(&self) -> &'static str {
                $name
            }

            fn caller(&self) -> &Account {
                &self.$caller
            }
        }
    };
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Register or update a collateral currency (admin)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTokenInfoOp {
    /// Administrator
    pub caller: Account,
    /// Currency symbol
    pub currency: CurrencyKey,
    /// Token reference
    pub token_ref: String,
    /// Minimum non-zero balance after a redeem
    pub min_collateral: U256,
    /// Refuse new stakes
    pub closed: bool,
}

impl_operation!(UpdateTokenInfoOp, "UpdateTokenInfo", caller);

/// Stake collateral
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeOp {
    /// Staker
    pub account: Account,
    /// Currency
    pub currency: CurrencyKey,
    /// Amount
    pub amount: U256,
}

impl_operation!(StakeOp, "Stake", account);

/// Redeem staked collateral
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemOp {
    /// Owner
    pub account: Account,
    /// Currency
    pub currency: CurrencyKey,
    /// Amount; `None` redeems everything redeemable
    pub amount: Option<U256>,
}

impl_operation!(RedeemOp, "Redeem", account);

// ═══════════════════════════════════════════════════════════════════════════════
// DEBT OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Build debt against collateral
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOp {
    /// Debtor
    pub account: Account,
    /// Collateral domain
    pub currency: CurrencyKey,
    /// USD amount; `None` builds the remaining capacity
    pub amount: Option<U256>,
}

impl_operation!(BuildOp, "Build", account);

/// Burn debt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnOp {
    /// Debtor
    pub account: Account,
    /// Collateral domain
    pub currency: CurrencyKey,
    /// USD amount; `None` burns down to the build ratio
    pub amount: Option<U256>,
}

impl_operation!(BurnOp, "Burn", account);

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Mark or unmark a position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkOp {
    /// Submitting account
    pub caller: Account,
    /// Position owner
    pub account: Account,
    /// Collateral domain
    pub currency: CurrencyKey,
}

impl_operation!(MarkOp, "Mark", caller);

/// Liquidate a marked position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidateOp {
    /// Liquidator
    pub liquidator: Account,
    /// Position owner
    pub account: Account,
    /// Collateral domain
    pub currency: CurrencyKey,
    /// USD debt to burn; `None` burns the maximum
    pub burn_amount: Option<U256>,
    /// Locked entries to draw from, in order
    pub locked_entry_ids: Vec<u64>,
}

impl_operation!(LiquidateOp, "Liquidate", liquidator);

// ═══════════════════════════════════════════════════════════════════════════════
// REWARD OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Lock a new reward
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddRewardOp {
    /// Holder of LOCK_REWARD
    pub caller: Account,
    /// Reward owner
    pub account: Account,
    /// Amount
    pub amount: U256,
    /// Unlock time
    pub unlock_time: Timestamp,
}

impl_operation!(AddRewardOp, "AddReward", caller);

/// Bulk-create reward entries (admin)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrateRewardsOp {
    /// Administrator
    pub caller: Account,
    /// Owners
    pub accounts: Vec<Account>,
    /// Amounts
    pub amounts: Vec<U256>,
    /// Unlock times
    pub unlock_times: Vec<Timestamp>,
}

impl_operation!(MigrateRewardsOp, "MigrateRewards", caller);

/// Replace reward entries with new ones of the same total (admin)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRewardEntriesOp {
    /// Administrator
    pub caller: Account,
    /// Entry owner
    pub account: Account,
    /// Entries to remove
    pub entry_ids: Vec<u64>,
    /// New amounts
    pub new_amounts: Vec<U256>,
    /// New unlock times
    pub new_unlock_times: Vec<Timestamp>,
}

impl_operation!(SwapRewardEntriesOp, "SwapRewardEntries", caller);

/// Unlock a vested reward into staked collateral
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockRewardOp {
    /// Submitting account
    pub caller: Account,
    /// Entry owner
    pub account: Account,
    /// Entry id
    pub entry_id: u64,
}

impl_operation!(UnlockRewardOp, "UnlockReward", caller);

/// Claim a signed period reward
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRewardOp {
    /// Recipient
    pub account: Account,
    /// Reward period
    pub period_id: u64,
    /// Staking reward to lock
    pub staking_reward: U256,
    /// Fee reward to pay
    pub fee_reward: U256,
    /// One signature per reward signer, in signer order
    pub signatures: Vec<Signature>,
}

impl_operation!(ClaimRewardOp, "ClaimReward", account);

/// Replace the reward signers (admin)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetRewardSignersOp {
    /// Administrator
    pub caller: Account,
    /// New signer set
    pub signers: Vec<PublicKey>,
}

impl_operation!(SetRewardSignersOp, "SetRewardSigners", caller);

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATION ENUM
// ═══════════════════════════════════════════════════════════════════════════════

/// All protocol operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolOperation {
    /// Register or update a currency
    UpdateTokenInfo(UpdateTokenInfoOp),
    /// Stake collateral
    Stake(StakeOp),
    /// Redeem collateral
    Redeem(RedeemOp),
    /// Build debt
    Build(BuildOp),
    /// Burn debt
    Burn(BurnOp),
    /// Mark a position
    Mark(MarkOp),
    /// Remove a mark
    Unmark(MarkOp),
    /// Liquidate a position
    Liquidate(LiquidateOp),
    /// Lock a reward
    AddReward(AddRewardOp),
    /// Bulk-create rewards
    MigrateRewards(MigrateRewardsOp),
    /// Swap reward entries
    SwapRewardEntries(SwapRewardEntriesOp),
    /// Unlock a reward
    UnlockReward(UnlockRewardOp),
    /// Claim a signed period reward
    ClaimReward(ClaimRewardOp),
    /// Replace the reward signers
    SetRewardSigners(SetRewardSignersOp),
}

impl ProtocolOperation {
    fn inner(&self) -> &dyn Operation {
        match self {
            Self::UpdateTokenInfo(op) => op,
            Self::Stake(op) => op,
            Self::Redeem(op) => op,
            Self::Build(op) => op,
            Self::Burn(op) => op,
            Self::Mark(op) | Self::Unmark(op) => op,
            Self::Liquidate(op) => op,
            Self::AddReward(op) => op,
            Self::MigrateRewards(op) => op,
            Self::SwapRewardEntries(op) => op,
            Self::UnlockReward(op) => op,
            Self::ClaimReward(op) => op,
            Self::SetRewardSigners(op) => op,
        }
    }

    /// Get the operation type
    pub fn operation_type(&self) -> &'static str {
        match self {
            Self::Unmark(_) => "Unmark",
            other => other.inner().operation_type(),
        }
    }

    /// Account submitting the operation
    pub fn caller(&self) -> &Account {
        self.inner().caller()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATION RESULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of an executed operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationResult {
    /// Currency registered or updated
    CurrencyUpdated,
    /// New staked balance
    Staked {
        /// Staked balance afterwards
        new_staked: U256,
    },
    /// Collateral redeemed
    Redeemed {
        /// Amount redeemed
        amount: U256,
        /// Staked balance afterwards
        new_staked: U256,
    },
    /// Debt built
    Built(DebtChange),
    /// Debt burnt
    Burnt(DebtChange),
    /// Position marked
    Marked(LiquidationMark),
    /// Mark removed
    Unmarked(LiquidationMark),
    /// Position liquidated
    Liquidated(Box<LiquidationOutcome>),
    /// Reward entry created
    RewardAdded {
        /// New entry id
        entry_id: u64,
    },
    /// Reward entries created
    RewardsMigrated {
        /// New entry ids in order
        entry_ids: Vec<u64>,
    },
    /// Reward entries swapped
    EntriesSwapped(SwapOutcome),
    /// Reward unlocked and staked
    RewardUnlocked {
        /// Amount unlocked
        amount: U256,
    },
    /// Period reward claimed
    RewardClaimed {
        /// Entry locking the staking reward, if non-zero
        entry_id: Option<u64>,
    },
    /// Reward signers replaced
    RewardSignersSet,
}
