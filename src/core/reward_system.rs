//! Signed period rewards.
//!
//! Rewards for each period are computed off-chain and attested by a fixed
//! set of reward signers. A claim carries one signature per signer, in signer
//! order, over the tagged digest of `(period, recipient, staking, fee)`. Each
//! recipient can claim a period once.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use crate::core::types::Account;
use crate::error::{Error, Result};
use crate::utils::constants::REWARD_CLAIM_TAG;
use crate::utils::crypto::{Hash, PublicKey, Signature};

/// A period reward as attested by the signers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardClaim {
    /// Reward period
    pub period_id: u64,
    /// Account receiving the reward
    pub recipient: Account,
    /// Native collateral to lock for the recipient
    pub staking_reward: U256,
    /// Synthetic paid from the fee pool
    pub fee_reward: U256,
}

impl RewardClaim {
    /// Digest the signers sign
    pub fn signing_hash(&self) -> Hash {
        let mut data = Vec::with_capacity(8 + 20 + 64);
        data.extend_from_slice(&self.period_id.to_be_bytes());
        data.extend_from_slice(self.recipient.as_bytes());
        let mut word = [0u8; 32];
        self.staking_reward.to_big_endian(&mut word);
        data.extend_from_slice(&word);
        self.fee_reward.to_big_endian(&mut word);
        data.extend_from_slice(&word);
        Hash::tagged(REWARD_CLAIM_TAG, &data)
    }
}

/// Reward signers and the record of claimed periods
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSystem {
    signers: Vec<PublicKey>,
    claimed: BTreeSet<(Account, u64)>,
}

impl RewardSystem {
    /// Create a reward system with no signers; every claim fails until set
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the signer set
    pub fn set_signers(&mut self, signers: Vec<PublicKey>) -> Result<()> {
        if signers.is_empty() {
            return Err(Error::InvalidParameter {
                name: "reward_signers".into(),
                reason: "at least one signer is required".into(),
            });
        }
        let distinct: BTreeSet<_> = signers.iter().map(PublicKey::as_bytes).collect();
        if distinct.len() != signers.len() {
            return Err(Error::InvalidParameter {
                name: "reward_signers".into(),
                reason: "duplicate signer".into(),
            });
        }
        debug!(count = signers.len(), "reward signers set");
        self.signers = signers;
        Ok(())
    }

    /// Configured signers, in signature order
    pub fn signers(&self) -> &[PublicKey] {
        &self.signers
    }

    /// Check if `account` already claimed `period_id`
    pub fn is_claimed(&self, account: &Account, period_id: u64) -> bool {
        self.claimed.contains(&(*account, period_id))
    }

    /// Number of recorded claims
    pub fn claim_count(&self) -> usize {
        self.claimed.len()
    }

    /// Check that every signer signed `claim`
    pub fn verify(&self, claim: &RewardClaim, signatures: &[Signature]) -> Result<()> {
        if self.signers.is_empty() || signatures.len() != self.signers.len() {
            return Err(Error::InvalidSignature(claim.period_id));
        }
        let digest = claim.signing_hash();
        let all_valid = self
            .signers
            .iter()
            .zip(signatures)
            .all(|(signer, signature)| signer.verify(&digest, signature));
        if !all_valid {
            return Err(Error::InvalidSignature(claim.period_id));
        }
        Ok(())
    }

    /// Record a claim; fails if the period was already claimed by the recipient
    pub fn record(&mut self, claim: &RewardClaim) -> Result<()> {
        if !self.claimed.insert((claim.recipient, claim.period_id)) {
            return Err(Error::RewardAlreadyClaimed {
                account: claim.recipient.to_string(),
                period_id: claim.period_id,
            });
        }
        debug!(recipient = %claim.recipient, period_id = claim.period_id, "reward claim recorded");
        Ok(())
    }
}
