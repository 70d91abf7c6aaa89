//! Protocol State Machine - Core orchestration engine.
//!
//! [`Protocol`] owns the ledgers and the collaborators. Every mutating call
//! checks capabilities and prices, runs the ledger changes, then calls the
//! token collaborator last. If anything fails the ledgers are restored from a
//! snapshot taken at the start of the call and the call's events are dropped.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::access::{require_capability, AccessControl, AccessController, Capability};
use crate::core::build_burn::{BuildBurnGateway, DebtChange};
use crate::core::collateral::{check_redeem, CollateralLedger};
use crate::core::config::{DomainParams, ProtocolConfig};
use crate::core::debt::DebtLedger;
use crate::core::position::Position;
use crate::core::reward_system::{RewardClaim, RewardSystem};
use crate::core::rewards::{RewardEntry, RewardLocker, SwapOutcome};
use crate::core::token::{DebtValuation, InMemoryTokens, TokenGateway};
use crate::core::types::{Account, CurrencyKey, Timestamp};
use crate::error::{Error, Result};
use crate::liquidation::engine::*;
use crate::oracle::price_feed::{fresh_price, PriceOracle, PriceRouter};
use crate::protocol::events::*;
use crate::protocol::operations::*;
use crate::utils::crypto::{PublicKey, Signature};

// ═══════════════════════════════════════════════════════════════════════════════
// LEDGER STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything the protocol books, in one serializable value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    /// Staked collateral
    pub collateral: CollateralLedger,
    /// Locked reward entries
    pub rewards: RewardLocker,
    /// Debt pool per collateral domain
    pub debt: BTreeMap<CurrencyKey, DebtLedger>,
    /// Liquidation marks
    pub liquidations: LiquidationEngine,
    /// Reward signers and claimed periods
    pub reward_system: RewardSystem,
}

impl LedgerState {
    /// Create empty ledgers
    pub fn new() -> Self {
        Self::default()
    }

    /// Debt pool of a domain, if anything was ever issued there
    pub fn debt_pool(&self, domain: &CurrencyKey) -> Option<&DebtLedger> {
        self.debt.get(domain)
    }

    /// Verify every ledger's internal totals
    pub fn check_invariants(&self) -> Result<()> {
        self.collateral.check_invariant()?;
        self.rewards.check_invariant()?;
        for (domain, pool) in &self.debt {
            pool.check_invariant()
                .map_err(|e| Error::InvariantViolation(format!("domain {}: {}", domain, e)))?;
        }
        Ok(())
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Protocol wired to the in-memory reference collaborators
pub type InMemoryProtocol = Protocol<InMemoryTokens, PriceRouter, AccessController>;

/// Caller-facing orchestrator over the ledgers and collaborators
pub struct Protocol<T, P, A> {
    /// Protocol configuration
    config: ProtocolConfig,
    /// Ledgers
    state: LedgerState,
    /// Token custody, synthetic supply and debt valuation
    tokens: T,
    /// Price source
    oracle: P,
    /// Capability registry
    access: A,
    /// Current block height
    block_height: u64,
    /// Current timestamp
    timestamp: Timestamp,
    /// Events of committed operations
    event_log: EventLog,
}

impl<T, P, A> Protocol<T, P, A>
where
    T: TokenGateway + DebtValuation,
    P: PriceOracle,
    A: AccessControl,
{
    /// Create a protocol with empty ledgers
    pub fn new(config: ProtocolConfig, tokens: T, oracle: P, access: A) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: LedgerState::new(),
            tokens,
            oracle,
            access,
            block_height: 0,
            timestamp: 0,
            event_log: EventLog::new(),
        })
    }

    /// Replace the ledgers, e.g. with a restored snapshot
    pub fn with_state(mut self, state: LedgerState) -> Self {
        self.state = state;
        self
    }

    /// Protocol configuration
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Ledgers
    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    /// Token collaborator
    pub fn tokens(&self) -> &T {
        &self.tokens
    }

    /// Token collaborator, mutably
    pub fn tokens_mut(&mut self) -> &mut T {
        &mut self.tokens
    }

    /// Price collaborator
    pub fn oracle(&self) -> &P {
        &self.oracle
    }

    /// Price collaborator, mutably
    pub fn oracle_mut(&mut self) -> &mut P {
        &mut self.oracle
    }

    /// Authorization collaborator
    pub fn access(&self) -> &A {
        &self.access
    }

    /// Authorization collaborator, mutably
    pub fn access_mut(&mut self) -> &mut A {
        &mut self.access
    }

    /// Events recorded since the current block began
    pub fn events(&self) -> &EventLog {
        &self.event_log
    }

    /// Current timestamp
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Current block height
    pub fn block_height(&self) -> u64 {
        self.block_height
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BLOCK PROCESSING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Advance the clock without starting a new block
    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    /// Begin a new block
    pub fn begin_block(&mut self, height: u64, timestamp: Timestamp) {
        self.block_height = height;
        self.timestamp = timestamp;
        self.event_log.clear();
    }

    /// End the current block and hand out its events
    pub fn end_block(&mut self) -> EventLog {
        std::mem::take(&mut self.event_log)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // OPERATION EXECUTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Execute a protocol operation
    pub fn execute(&mut self, op: ProtocolOperation) -> Result<OperationResult> {
        debug!(operation = op.operation_type(), caller = %op.caller(), "executing operation");

        match op {
            ProtocolOperation::UpdateTokenInfo(op) => {
                self.update_token_info(&op.caller, &op.currency, &op.token_ref, op.min_collateral, op.closed)?;
                Ok(OperationResult::CurrencyUpdated)
            }
            ProtocolOperation::Stake(op) => {
                let new_staked = self.stake(&op.account, &op.currency, op.amount)?;
                Ok(OperationResult::Staked { new_staked })
            }
            ProtocolOperation::Redeem(op) => {
                let amount = match op.amount {
                    Some(amount) => {
                        self.redeem(&op.account, &op.currency, amount)?;
                        amount
                    }
                    None => self.redeem_max(&op.account, &op.currency)?,
                };
                Ok(OperationResult::Redeemed {
                    amount,
                    new_staked: self.state.collateral.staked_of(&op.account, &op.currency),
                })
            }
            ProtocolOperation::Build(op) => {
                let change = match op.amount {
                    Some(amount) => self.build(&op.account, &op.currency, amount)?,
                    None => self.build_max(&op.account, &op.currency)?,
                };
                Ok(OperationResult::Built(change))
            }
            ProtocolOperation::Burn(op) => {
                let change = match op.amount {
                    Some(amount) => self.burn(&op.account, &op.currency, amount)?,
                    None => self.burn_to_target(&op.account, &op.currency)?,
                };
                Ok(OperationResult::Burnt(change))
            }
            ProtocolOperation::Mark(op) => {
                let mark = self.mark(&op.caller, &op.account, &op.currency)?;
                Ok(OperationResult::Marked(mark))
            }
            ProtocolOperation::Unmark(op) => {
                let mark = self.unmark(&op.caller, &op.account, &op.currency)?;
                Ok(OperationResult::Unmarked(mark))
            }
            ProtocolOperation::Liquidate(op) => {
                let outcome = self.liquidate_inner(
                    &op.liquidator,
                    &op.account,
                    &op.currency,
                    op.burn_amount,
                    &op.locked_entry_ids,
                )?;
                Ok(OperationResult::Liquidated(Box::new(outcome)))
            }
            ProtocolOperation::AddReward(op) => {
                let entry_id = self.add_reward(&op.caller, &op.account, op.amount, op.unlock_time)?;
                Ok(OperationResult::RewardAdded { entry_id })
            }
            ProtocolOperation::MigrateRewards(op) => {
                let entry_ids = self.migrate_rewards(&op.caller, &op.accounts, &op.amounts, &op.unlock_times)?;
                Ok(OperationResult::RewardsMigrated { entry_ids })
            }
            ProtocolOperation::SwapRewardEntries(op) => {
                let outcome = self.swap_reward_entries(
                    &op.caller,
                    &op.account,
                    &op.entry_ids,
                    &op.new_amounts,
                    &op.new_unlock_times,
                )?;
                Ok(OperationResult::EntriesSwapped(outcome))
            }
            ProtocolOperation::UnlockReward(op) => {
                let amount = self.unlock_reward(&op.caller, &op.account, op.entry_id)?;
                Ok(OperationResult::RewardUnlocked { amount })
            }
            ProtocolOperation::ClaimReward(op) => {
                let entry_id = self.claim_reward(
                    &op.account,
                    op.period_id,
                    op.staking_reward,
                    op.fee_reward,
                    &op.signatures,
                )?;
                Ok(OperationResult::RewardClaimed { entry_id })
            }
            ProtocolOperation::SetRewardSigners(op) => {
                self.set_reward_signers(&op.caller, op.signers)?;
                Ok(OperationResult::RewardSignersSet)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // COLLATERAL OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Register or update a collateral currency (admin)
    pub fn update_token_info(
        &mut self,
        caller: &Account,
        currency: &CurrencyKey,
        token_ref: &str,
        min_collateral: U256,
        closed: bool,
    ) -> Result<()> {
        self.require(caller, Capability::Admin)?;
        self.state
            .collateral
            .update_token_info(currency, token_ref, min_collateral, closed);
        self.emit(ProtocolEvent::CurrencyUpdated(CurrencyUpdatedEvent {
            currency: currency.clone(),
            token_ref: token_ref.to_string(),
            min_collateral,
            closed,
            block_height: self.block_height,
            timestamp: self.timestamp,
        }));
        Ok(())
    }

    /// Stake collateral; returns the new staked balance
    pub fn stake(&mut self, account: &Account, currency: &CurrencyKey, amount: U256) -> Result<U256> {
        self.atomic(|p| {
            let new_staked = p.state.collateral.stake(account, currency, amount)?;
            p.tokens.transfer_in(currency, account, amount)?;
            p.emit_collateral(true, account, currency, amount, new_staked);
            Ok(new_staked)
        })
    }

    /// Redeem staked collateral; returns the remaining staked balance
    pub fn redeem(&mut self, account: &Account, currency: &CurrencyKey, amount: U256) -> Result<U256> {
        self.atomic(|p| {
            let redeemable = p.redeemable(account, currency)?;
            let staked = p.state.collateral.staked_of(account, currency);
            let min_collateral = p.state.collateral.currency_info(currency)?.min_collateral;
            check_redeem(staked, amount, redeemable, min_collateral)?;

            let new_staked = p.state.collateral.unstake(account, currency, amount)?;
            p.tokens.transfer_out(currency, account, amount)?;
            p.emit_collateral(false, account, currency, amount, new_staked);
            Ok(new_staked)
        })
    }

    /// Redeem everything redeemable; returns the amount redeemed
    pub fn redeem_max(&mut self, account: &Account, currency: &CurrencyKey) -> Result<U256> {
        let amount = self.redeemable(account, currency)?;
        self.redeem(account, currency, amount)?;
        Ok(amount)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DEBT OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Build `amount` USD of debt and mint the synthetic
    pub fn build(&mut self, account: &Account, currency: &CurrencyKey, amount: U256) -> Result<DebtChange> {
        self.atomic(|p| p.build_inner(account, currency, Some(amount)))
    }

    /// Build all remaining capacity
    pub fn build_max(&mut self, account: &Account, currency: &CurrencyKey) -> Result<DebtChange> {
        self.atomic(|p| p.build_inner(account, currency, None))
    }

    /// Burn `amount` USD of debt and the matching synthetic
    pub fn burn(&mut self, account: &Account, currency: &CurrencyKey, amount: U256) -> Result<DebtChange> {
        self.atomic(|p| p.burn_inner(account, currency, Some(amount)))
    }

    /// Burn exactly the debt above the build ratio
    pub fn burn_to_target(&mut self, account: &Account, currency: &CurrencyKey) -> Result<DebtChange> {
        self.atomic(|p| p.burn_inner(account, currency, None))
    }

    /// Issue debt shares directly (ISSUE_DEBT); returns shares minted
    pub fn issue_debt(&mut self, caller: &Account, domain: &CurrencyKey, account: &Account, amount: U256) -> Result<U256> {
        self.require(caller, Capability::IssueDebt)?;
        self.config.domain(domain)?;
        let total_value = self.total_value(domain);
        self.atomic(|p| {
            p.state
                .debt
                .entry(domain.clone())
                .or_default()
                .issue(account, amount, total_value)
        })
    }

    /// Burn debt shares directly (BURN_DEBT); returns shares burnt
    pub fn burn_debt(&mut self, caller: &Account, domain: &CurrencyKey, account: &Account, amount: U256) -> Result<U256> {
        self.require(caller, Capability::BurnDebt)?;
        self.config.domain(domain)?;
        let total_value = self.total_value(domain);
        self.atomic(|p| {
            p.state
                .debt
                .entry(domain.clone())
                .or_default()
                .burn(account, amount, total_value)
        })
    }

    fn build_inner(&mut self, account: &Account, currency: &CurrencyKey, amount: Option<U256>) -> Result<DebtChange> {
        let component = self.config.components.build_burn;
        self.require(&component, Capability::IssueDebt)?;
        let params = self.params(currency)?;
        let position = self.position(account, currency)?;
        let total_value = self.total_value(currency);

        let pool = self.state.debt.entry(currency.clone()).or_default();
        let mut gateway = BuildBurnGateway::new(pool, &params);
        let change = match amount {
            Some(amount) => gateway.build(account, amount, &position, total_value)?,
            None => gateway.build_max(account, &position, total_value)?,
        };

        self.tokens.mint(currency, account, change.amount)?;
        self.emit_debt(true, account, currency, &change);
        Ok(change)
    }

    fn burn_inner(&mut self, account: &Account, currency: &CurrencyKey, amount: Option<U256>) -> Result<DebtChange> {
        let component = self.config.components.build_burn;
        self.require(&component, Capability::BurnDebt)?;
        let params = self.params(currency)?;
        let total_value = self.total_value(currency);

        let change = match amount {
            Some(amount) => {
                let pool = self.state.debt.entry(currency.clone()).or_default();
                BuildBurnGateway::new(pool, &params).burn(account, amount, total_value)?
            }
            None => {
                let position = self.position(account, currency)?;
                let pool = self.state.debt.entry(currency.clone()).or_default();
                BuildBurnGateway::new(pool, &params).burn_to_target(account, &position, total_value)?
            }
        };

        self.tokens.burn(currency, account, change.amount)?;
        self.emit_debt(false, account, currency, &change);
        Ok(change)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIQUIDATION OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Mark an undercollateralized position
    pub fn mark(&mut self, caller: &Account, account: &Account, currency: &CurrencyKey) -> Result<LiquidationMark> {
        self.atomic(|p| {
            let params = p.params(currency)?;
            let position = p.position(account, currency)?;
            let mark = p
                .state
                .liquidations
                .mark(currency, account, caller, &position, &params, p.timestamp)?;
            p.emit(ProtocolEvent::PositionMarked(PositionMarkedEvent {
                account: *account,
                domain: currency.clone(),
                marker: *caller,
                block_height: p.block_height,
                timestamp: p.timestamp,
            }));
            Ok(mark)
        })
    }

    /// Remove the mark of a position back at the build ratio
    pub fn unmark(&mut self, caller: &Account, account: &Account, currency: &CurrencyKey) -> Result<LiquidationMark> {
        self.atomic(|p| {
            let params = p.params(currency)?;
            let position = p.position(account, currency)?;
            let mark = p.state.liquidations.unmark(currency, account, &position, &params)?;
            p.emit(ProtocolEvent::PositionUnmarked(PositionUnmarkedEvent {
                account: *account,
                domain: currency.clone(),
                caller: *caller,
                block_height: p.block_height,
                timestamp: p.timestamp,
            }));
            Ok(mark)
        })
    }

    /// Liquidate `burn_amount` USD of a marked position's debt
    pub fn liquidate(
        &mut self,
        liquidator: &Account,
        account: &Account,
        currency: &CurrencyKey,
        burn_amount: U256,
        locked_entry_ids: &[u64],
    ) -> Result<LiquidationOutcome> {
        self.liquidate_inner(liquidator, account, currency, Some(burn_amount), locked_entry_ids)
    }

    /// Liquidate the maximum amount, clearing the mark
    pub fn liquidate_max(
        &mut self,
        liquidator: &Account,
        account: &Account,
        currency: &CurrencyKey,
        locked_entry_ids: &[u64],
    ) -> Result<LiquidationOutcome> {
        self.liquidate_inner(liquidator, account, currency, None, locked_entry_ids)
    }

    fn liquidate_inner(
        &mut self,
        liquidator: &Account,
        account: &Account,
        currency: &CurrencyKey,
        burn_amount: Option<U256>,
        locked_entry_ids: &[u64],
    ) -> Result<LiquidationOutcome> {
        let result = self.atomic(|p| {
            let component = p.config.components.liquidation;
            p.require(&component, Capability::BurnDebt)?;
            p.require(&component, Capability::MoveReward)?;

            let params = p.params(currency)?;
            let request = LiquidationRequest {
                domain: currency,
                account,
                liquidator,
                burn_amount,
                locked_entry_ids,
                price: p.price(currency)?,
                total_value: p.total_value(currency),
                now: p.timestamp,
                native: p.config.is_native(currency),
            };
            let ledgers = LiquidationLedgers {
                collateral: &mut p.state.collateral,
                rewards: &mut p.state.rewards,
                debt: p.state.debt.entry(currency.clone()).or_default(),
            };
            let outcome = p.state.liquidations.liquidate(request, &params, ledgers)?;
            p.emit_liquidation(&outcome);
            Ok(outcome)
        });

        if let Err(e) = &result {
            warn!(%account, %currency, %liquidator, error = %e, "liquidation rejected");
        }
        result
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // REWARD OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Lock a reward for `account` (LOCK_REWARD); returns the entry id
    pub fn add_reward(&mut self, caller: &Account, account: &Account, amount: U256, unlock_time: Timestamp) -> Result<u64> {
        self.require(caller, Capability::LockReward)?;
        self.atomic(|p| {
            let entry_id = p.state.rewards.add(account, amount, unlock_time)?;
            p.emit_entry_added(entry_id)?;
            Ok(entry_id)
        })
    }

    /// Create one entry per row (admin)
    pub fn migrate_rewards(
        &mut self,
        caller: &Account,
        accounts: &[Account],
        amounts: &[U256],
        unlock_times: &[Timestamp],
    ) -> Result<Vec<u64>> {
        self.require(caller, Capability::Admin)?;
        self.atomic(|p| {
            let entry_ids = p.state.rewards.migrate(accounts, amounts, unlock_times)?;
            for entry_id in &entry_ids {
                p.emit_entry_added(*entry_id)?;
            }
            Ok(entry_ids)
        })
    }

    /// Replace entries of `account` with new ones of the same total (admin)
    pub fn swap_reward_entries(
        &mut self,
        caller: &Account,
        account: &Account,
        entry_ids: &[u64],
        new_amounts: &[U256],
        new_unlock_times: &[Timestamp],
    ) -> Result<SwapOutcome> {
        self.require(caller, Capability::Admin)?;
        self.atomic(|p| {
            let outcome = p.state.rewards.swap(account, entry_ids, new_amounts, new_unlock_times)?;
            for entry in &outcome.removed {
                let event = p.entry_event(entry);
                p.emit(ProtocolEvent::RewardEntryRemoved(event));
            }
            for entry_id in &outcome.added {
                p.emit_entry_added(*entry_id)?;
            }
            Ok(outcome)
        })
    }

    /// Unlock a vested entry into staked native collateral; returns the amount
    ///
    /// Anyone may trigger the unlock; the collateral always goes to the owner.
    pub fn unlock_reward(&mut self, caller: &Account, account: &Account, entry_id: u64) -> Result<U256> {
        let rewarder = self.config.rewarder.ok_or(Error::RewarderNotSet)?;
        self.atomic(|p| {
            let entry = p.state.rewards.live_entry(account, entry_id)?.clone();
            if p.timestamp < entry.unlock_time {
                return Err(Error::UnlockTimeNotReached {
                    unlock_time: entry.unlock_time,
                    now: p.timestamp,
                });
            }

            let native = p.config.native_currency.clone();
            p.state.rewards.remove(account, entry_id)?;
            p.state
                .collateral
                .stake_from_unlocked_reward(account, &native, entry.amount)?;
            p.tokens.transfer_in(&native, &rewarder, entry.amount)?;

            debug!(%caller, %account, entry_id, amount = %entry.amount, "reward unlocked");
            let event = p.entry_event(&entry);
            p.emit(ProtocolEvent::RewardEntryUnlocked(event));
            p.emit(ProtocolEvent::CollateralFromUnlockReward(CollateralFromUnlockRewardEvent {
                account: *account,
                rewarder,
                currency: native,
                amount: entry.amount,
                block_height: p.block_height,
                timestamp: p.timestamp,
            }));
            Ok(entry.amount)
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SIGNED PERIOD REWARDS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Replace the reward signer set (admin)
    pub fn set_reward_signers(&mut self, caller: &Account, signers: Vec<PublicKey>) -> Result<()> {
        self.require(caller, Capability::Admin)?;
        self.state.reward_system.set_signers(signers)?;
        info!(%caller, count = self.state.reward_system.signers().len(), "reward signers updated");
        Ok(())
    }

    /// Claim a period reward attested by every reward signer
    ///
    /// The staking reward is locked for the recipient until the configured
    /// lock after the period end. The fee reward is paid in native-domain
    /// synthetics from the fee pool. The recipient's native position must be
    /// within the build ratio. Returns the new reward entry id, if any.
    pub fn claim_reward(
        &mut self,
        account: &Account,
        period_id: u64,
        staking_reward: U256,
        fee_reward: U256,
        signatures: &[Signature],
    ) -> Result<Option<u64>> {
        let schedule = self.config.reward_schedule.clone();
        schedule.check_claimable(period_id, self.timestamp)?;

        let claim = RewardClaim {
            period_id,
            recipient: *account,
            staking_reward,
            fee_reward,
        };
        self.state.reward_system.verify(&claim, signatures)?;
        if self.state.reward_system.is_claimed(account, period_id) {
            return Err(Error::RewardAlreadyClaimed {
                account: account.to_string(),
                period_id,
            });
        }

        let native = self.config.native_currency.clone();
        if !self.within_build_ratio(account, &native)? {
            return Err(Error::BelowTargetRatio(account.to_string()));
        }
        if !staking_reward.is_zero() {
            self.require(&self.config.components.reward_system, Capability::LockReward)?;
        }
        let fee_pool = if fee_reward.is_zero() {
            None
        } else {
            Some(schedule.fee_pool.ok_or(Error::FeePoolNotSet)?)
        };

        self.atomic(|p| {
            p.state.reward_system.record(&claim)?;

            let entry_id = if staking_reward.is_zero() {
                None
            } else {
                let unlock_time = schedule.staking_unlock_time(period_id)?;
                let entry_id = p.state.rewards.add(account, staking_reward, unlock_time)?;
                p.emit_entry_added(entry_id)?;
                Some(entry_id)
            };

            if let Some(pool) = fee_pool {
                p.tokens.transfer_synth(&native, &pool, account, fee_reward)?;
            }

            info!(%account, period_id, %staking_reward, %fee_reward, "period reward claimed");
            p.emit(ProtocolEvent::RewardClaimed(RewardClaimedEvent {
                recipient: *account,
                period_id,
                staking_reward,
                fee_reward,
                block_height: p.block_height,
                timestamp: p.timestamp,
            }));
            Ok(entry_id)
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Configured reward signers
    pub fn reward_signers(&self) -> &[PublicKey] {
        self.state.reward_system.signers()
    }

    /// Check if `account` claimed the reward of `period_id`
    pub fn is_reward_claimed(&self, account: &Account, period_id: u64) -> bool {
        self.state.reward_system.is_claimed(account, period_id)
    }

    /// Reward period containing the current time
    pub fn current_reward_period(&self) -> u64 {
        self.config.reward_schedule.current_period_id(self.timestamp)
    }

    /// USD debt of an account in a domain
    pub fn debt_of(&self, account: &Account, domain: &CurrencyKey) -> Result<U256> {
        match self.state.debt_pool(domain) {
            Some(pool) => pool.debt_of(account, self.total_value(domain)),
            None => Ok(U256::zero()),
        }
    }

    /// Debt shares of an account in a domain
    pub fn debt_shares_of(&self, account: &Account, domain: &CurrencyKey) -> U256 {
        self.state
            .debt_pool(domain)
            .map(|pool| pool.shares_of(account))
            .unwrap_or_default()
    }

    /// Staked balance
    pub fn staked_of(&self, account: &Account, currency: &CurrencyKey) -> U256 {
        self.state.collateral.staked_of(account, currency)
    }

    /// Locked reward balance
    pub fn locked_amount(&self, account: &Account) -> U256 {
        self.state.rewards.locked_amount(account)
    }

    /// Locked rewards across all accounts
    pub fn total_locked(&self) -> U256 {
        self.state.rewards.total_locked()
    }

    /// Id of the newest reward entry
    pub fn last_entry_id(&self) -> u64 {
        self.state.rewards.last_entry_id()
    }

    /// Reward entry by id
    pub fn reward_entry(&self, entry_id: u64) -> Option<&RewardEntry> {
        self.state.rewards.entry(entry_id)
    }

    /// Staked and locked collateral counted in a domain
    pub fn collateral_breakdown(&self, account: &Account, currency: &CurrencyKey) -> (U256, U256) {
        let locked = if self.config.is_native(currency) {
            self.locked_amount(account)
        } else {
            U256::zero()
        };
        (self.staked_of(account, currency), locked)
    }

    /// USD value of staked plus locked collateral
    pub fn collateral_value_usd(&self, account: &Account, currency: &CurrencyKey) -> Result<U256> {
        self.position(account, currency)?.collateral_value()
    }

    /// Total debt allowed at the build ratio
    pub fn build_capacity(&self, account: &Account, currency: &CurrencyKey) -> Result<U256> {
        let params = self.config.domain(currency)?;
        self.position(account, currency)?.build_capacity(params.build_ratio)
    }

    /// Debt that can still be built
    pub fn available_to_build(&self, account: &Account, currency: &CurrencyKey) -> Result<U256> {
        let params = self.config.domain(currency)?;
        self.position(account, currency)?.available_to_build(params.build_ratio)
    }

    /// Staked collateral free to redeem
    ///
    /// Needs no price when the account carries no debt in the domain.
    pub fn redeemable(&self, account: &Account, currency: &CurrencyKey) -> Result<U256> {
        self.state.collateral.currency_info(currency)?;
        if self.debt_of(account, currency)?.is_zero() {
            return Ok(self.staked_of(account, currency));
        }
        let params = self.config.domain(currency)?;
        self.position(account, currency)?.redeemable(params.build_ratio)
    }

    /// C-ratio `collateral_value / debt`; `None` without debt
    pub fn current_ratio(&self, account: &Account, currency: &CurrencyKey) -> Result<Option<U256>> {
        self.position(account, currency)?.c_ratio()
    }

    /// Largest burn a liquidation may request right now
    pub fn max_liquidatable(&self, account: &Account, currency: &CurrencyKey) -> Result<U256> {
        let params = self.config.domain(currency)?;
        max_burn(&self.position(account, currency)?, params)
    }

    /// Mark of a position
    pub fn mark_of(&self, account: &Account, currency: &CurrencyKey) -> Option<&LiquidationMark> {
        self.state.liquidations.mark_of(currency, account)
    }

    /// Full valuation of a position
    pub fn position(&self, account: &Account, currency: &CurrencyKey) -> Result<Position> {
        self.config.domain(currency)?;
        let empty = DebtLedger::new();
        let pool = self.state.debt_pool(currency).unwrap_or(&empty);
        Position::from_ledgers(
            &self.state.collateral,
            &self.state.rewards,
            pool,
            currency,
            account,
            self.price(currency)?,
            self.total_value(currency),
            self.config.is_native(currency),
        )
    }

    /// Verify every ledger's internal totals
    pub fn check_invariants(&self) -> Result<()> {
        self.state.check_invariants()
    }

    /// Serialized ledger snapshot
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        self.state.to_bytes()
    }

    /// Replace the ledgers with a serialized snapshot
    pub fn restore(&mut self, bytes: &[u8]) -> Result<()> {
        let state = LedgerState::from_bytes(bytes)?;
        state.check_invariants()?;
        self.state = state;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INTERNAL
    // ═══════════════════════════════════════════════════════════════════════════

    /// Run `f` with all-or-nothing semantics over ledgers and events
    fn atomic<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        let snapshot = self.state.clone();
        let events = self.event_log.len();
        let result = f(self);
        if result.is_err() {
            self.state = snapshot;
            self.event_log.truncate(events);
        }
        result
    }

    /// Debt-free positions qualify without a price
    fn within_build_ratio(&self, account: &Account, domain: &CurrencyKey) -> Result<bool> {
        if self.debt_of(account, domain)?.is_zero() {
            return Ok(true);
        }
        let params = self.params(domain)?;
        self.position(account, domain)?.is_within_build_ratio(params.build_ratio)
    }

    fn require(&self, caller: &Account, capability: Capability) -> Result<()> {
        require_capability(&self.access, caller, capability)
    }

    fn params(&self, currency: &CurrencyKey) -> Result<DomainParams> {
        self.config.domain(currency).cloned()
    }

    fn price(&self, currency: &CurrencyKey) -> Result<U256> {
        fresh_price(
            &self.oracle,
            currency,
            self.timestamp,
            self.config.price_stale_period_secs,
        )
    }

    fn total_value(&self, domain: &CurrencyKey) -> U256 {
        self.tokens.total_debt_value_usd(domain)
    }

    fn emit(&mut self, event: ProtocolEvent) {
        self.event_log.push(event);
    }

    fn emit_collateral(&mut self, staked: bool, account: &Account, currency: &CurrencyKey, amount: U256, new_staked: U256) {
        let event = CollateralEvent {
            account: *account,
            currency: currency.clone(),
            amount,
            new_staked,
            block_height: self.block_height,
            timestamp: self.timestamp,
        };
        self.emit(if staked {
            ProtocolEvent::CollateralStaked(event)
        } else {
            ProtocolEvent::CollateralRedeemed(event)
        });
    }

    fn emit_debt(&mut self, built: bool, account: &Account, domain: &CurrencyKey, change: &DebtChange) {
        let event = DebtEvent {
            account: *account,
            domain: domain.clone(),
            amount: change.amount,
            shares: change.shares,
            block_height: self.block_height,
            timestamp: self.timestamp,
        };
        self.emit(if built {
            ProtocolEvent::DebtBuilt(event)
        } else {
            ProtocolEvent::DebtBurnt(event)
        });
    }

    fn emit_liquidation(&mut self, outcome: &LiquidationOutcome) {
        self.emit(ProtocolEvent::PositionLiquidated(PositionLiquidatedEvent {
            account: outcome.account,
            domain: outcome.domain.clone(),
            liquidator: outcome.liquidator,
            marker: outcome.marker,
            burn_amount: outcome.burn_amount,
            principal: outcome.amounts.principal,
            marker_reward: outcome.amounts.marker_reward,
            liquidator_reward: outcome.amounts.liquidator_reward,
            collateral_from_staked: outcome.split.staked_sourced,
            collateral_from_locked: outcome.split.locked_sourced,
            block_height: self.block_height,
            timestamp: self.timestamp,
        }));

        let source_events: Vec<ProtocolEvent> = outcome
            .locked_transfers
            .iter()
            .map(|transfer| {
                let draw = &transfer.draw;
                let event = RewardEntryEvent {
                    entry_id: draw.entry_id,
                    account: outcome.account,
                    amount: if draw.remaining.is_zero() { draw.taken } else { draw.remaining },
                    unlock_time: draw.unlock_time,
                    block_height: self.block_height,
                    timestamp: self.timestamp,
                };
                if draw.remaining.is_zero() {
                    ProtocolEvent::RewardEntryRemoved(event)
                } else {
                    ProtocolEvent::RewardEntryReduced(event)
                }
            })
            .collect();
        for event in source_events {
            self.emit(event);
        }

        let new_entries: Vec<(u64, Account, U256, Timestamp)> = outcome
            .locked_transfers
            .iter()
            .flat_map(|transfer| {
                let draw = &transfer.draw;
                transfer
                    .marker_entry_id
                    .map(|id| (id, outcome.marker, draw.marker_amount, draw.unlock_time))
                    .into_iter()
                    .chain(
                        transfer
                            .liquidator_entry_id
                            .map(|id| (id, outcome.liquidator, draw.liquidator_amount, draw.unlock_time)),
                    )
            })
            .collect();
        for (entry_id, account, amount, unlock_time) in new_entries {
            self.emit(ProtocolEvent::RewardEntryAdded(RewardEntryEvent {
                entry_id,
                account,
                amount,
                unlock_time,
                block_height: self.block_height,
                timestamp: self.timestamp,
            }));
        }
    }

    fn emit_entry_added(&mut self, entry_id: u64) -> Result<()> {
        let entry = self
            .state
            .rewards
            .entry(entry_id)
            .cloned()
            .ok_or(Error::EntryNotFound(entry_id))?;
        let event = self.entry_event(&entry);
        self.emit(ProtocolEvent::RewardEntryAdded(event));
        Ok(())
    }

    fn entry_event(&self, entry: &RewardEntry) -> RewardEntryEvent {
        RewardEntryEvent {
            entry_id: entry.id,
            account: entry.owner,
            amount: entry.amount,
            unlock_time: entry.unlock_time,
            block_height: self.block_height,
            timestamp: self.timestamp,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::token::TransferError;
    use crate::utils::constants::ACCOUNT_LENGTH;
    use crate::utils::math::{parse_wad, wad};

    fn account(n: u8) -> Account {
        Account::new([n; ACCOUNT_LENGTH])
    }

    fn owner() -> Account {
        account(0x01)
    }

    fn alice() -> Account {
        account(0xa1)
    }

    fn ath() -> CurrencyKey {
        CurrencyKey::new("ATH").unwrap()
    }

    fn protocol() -> InMemoryProtocol {
        let config = ProtocolConfig::default().with_rewarder(account(0xee));
        let mut access = AccessController::new(owner());
        access.grant_components(&owner(), &config.components).unwrap();

        let mut oracle = PriceRouter::new();
        oracle.set_price(&ath(), parse_wad("0.1").unwrap(), 1000).unwrap();

        let mut tokens = InMemoryTokens::new();
        tokens.credit(&ath(), &alice(), wad(10_000));

        let mut protocol = Protocol::new(config, tokens, oracle, access).unwrap();
        protocol.begin_block(1, 1000);
        protocol
            .update_token_info(&owner(), &ath(), "ath-token", U256::zero(), false)
            .unwrap();
        protocol
    }

    #[test]
    fn test_stake_and_build() {
        let mut protocol = protocol();
        protocol.stake(&alice(), &ath(), wad(1000)).unwrap();
        let change = protocol.build(&alice(), &ath(), wad(20)).unwrap();

        assert_eq!(change.shares, wad(20));
        assert_eq!(protocol.debt_of(&alice(), &ath()).unwrap(), wad(20));
        assert_eq!(protocol.tokens().synth_balance(&ath(), &alice()), wad(20));
        assert_eq!(protocol.events().filter_by_type("DebtBuilt").len(), 1);
        assert!(protocol.check_invariants().is_ok());
    }

    #[test]
    fn test_failed_transfer_rolls_back() {
        let mut protocol = protocol();
        protocol.tokens_mut().set_frozen(&alice(), true);
        let events = protocol.events().len();

        let result = protocol.stake(&alice(), &ath(), wad(1000));
        assert!(matches!(result, Err(Error::TransferFailed(TransferError::Rejected(_)))));
        assert_eq!(protocol.staked_of(&alice(), &ath()), U256::zero());
        assert_eq!(protocol.state().collateral.total_staked(&ath()), U256::zero());
        assert_eq!(protocol.events().len(), events);
    }

    #[test]
    fn test_build_requires_component_capability() {
        let config = ProtocolConfig::default();
        let mut oracle = PriceRouter::new();
        oracle.set_price(&ath(), parse_wad("0.1").unwrap(), 0).unwrap();
        let mut tokens = InMemoryTokens::new();
        tokens.credit(&ath(), &alice(), wad(1000));

        let mut protocol = Protocol::new(config, tokens, oracle, AccessController::new(owner())).unwrap();
        protocol
            .update_token_info(&owner(), &ath(), "ath-token", U256::zero(), false)
            .unwrap();
        protocol.stake(&alice(), &ath(), wad(1000)).unwrap();

        assert!(matches!(protocol.build(&alice(), &ath(), wad(1)), Err(Error::Unauthorized(_))));
    }

    #[test]
    fn test_admin_operations_gated() {
        let mut protocol = protocol();
        assert!(matches!(
            protocol.update_token_info(&alice(), &ath(), "x", U256::zero(), true),
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            protocol.add_reward(&alice(), &alice(), wad(1), 2000),
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            protocol.issue_debt(&alice(), &ath(), &alice(), wad(1)),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn test_reward_signers_admin_only() {
        let mut protocol = protocol();
        let signer = crate::utils::crypto::PrivateKey::generate().public_key();

        assert!(matches!(
            protocol.set_reward_signers(&alice(), vec![signer]),
            Err(Error::Unauthorized(_))
        ));
        protocol.set_reward_signers(&owner(), vec![signer]).unwrap();
        assert_eq!(protocol.reward_signers(), &[signer]);
    }

    #[test]
    fn test_claim_for_running_period_rejected() {
        let mut protocol = protocol();
        assert_eq!(protocol.current_reward_period(), 1);
        assert!(matches!(
            protocol.claim_reward(&alice(), 1, wad(1), U256::zero(), &[]),
            Err(Error::PeriodNotEnded { period_id: 1, current: 1 })
        ));
        assert!(!protocol.is_reward_claimed(&alice(), 1));
    }

    #[test]
    fn test_stale_price_blocks_build() {
        let mut protocol = protocol();
        protocol.stake(&alice(), &ath(), wad(1000)).unwrap();
        protocol.set_time(1000 + 12 * 60 * 60 + 1);

        assert!(matches!(
            protocol.build(&alice(), &ath(), wad(1)),
            Err(Error::StalePrice { .. })
        ));
        // Debt-free redeem needs no price
        assert_eq!(protocol.redeemable(&alice(), &ath()).unwrap(), wad(1000));
    }

    #[test]
    fn test_execute_dispatch() {
        let mut protocol = protocol();
        let result = protocol
            .execute(ProtocolOperation::Stake(StakeOp {
                account: alice(),
                currency: ath(),
                amount: wad(500),
            }))
            .unwrap();
        assert_eq!(result, OperationResult::Staked { new_staked: wad(500) });

        let result = protocol
            .execute(ProtocolOperation::Build(BuildOp {
                account: alice(),
                currency: ath(),
                amount: None,
            }))
            .unwrap();
        // 500 * 0.1 * 0.2
        assert!(matches!(result, OperationResult::Built(change) if change.amount == wad(10)));
    }

    #[test]
    fn test_snapshot_restore() {
        let mut protocol = protocol();
        protocol.stake(&alice(), &ath(), wad(1000)).unwrap();
        let snapshot = protocol.snapshot().unwrap();

        protocol.build(&alice(), &ath(), wad(20)).unwrap();
        protocol.restore(&snapshot).unwrap();
        assert_eq!(protocol.debt_shares_of(&alice(), &ath()), U256::zero());
        assert_eq!(protocol.staked_of(&alice(), &ath()), wad(1000));
    }

    #[test]
    fn test_end_block_takes_events() {
        let mut protocol = protocol();
        protocol.stake(&alice(), &ath(), wad(1)).unwrap();
        let events = protocol.end_block();
        assert_eq!(events.filter_by_type("CollateralStaked").len(), 1);
        assert!(protocol.events().is_empty());
    }
}
