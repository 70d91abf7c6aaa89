//! Protocol configuration and parameters.
//!
//! Parameters are split into:
//! - Domain parameters: ratios, rewards and delay for one collateral currency
//! - Protocol configuration: native currency, oracle staleness, component
//!   accounts, the rewarder that funds reward unlocks and the period schedule
//!   of signed reward claims
//!
//! Ratios are debt/collateral fractions stored as wads and written to JSON as
//! decimal strings (`"0.2"`).

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::core::types::{Account, CurrencyKey, Timestamp};
use crate::error::{Error, Result};
use crate::utils::constants::*;
use crate::utils::math::{self, cmp_products, multiply_decimal, safe_add, wad_from_raw, UNIT};
use crate::utils::validation::validate_ratio_bounds;

// ═══════════════════════════════════════════════════════════════════════════════
// DOMAIN PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Parameters of one collateral domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainParams {
    /// Maximum debt per unit of collateral value when building (0.2 = 500% C-ratio)
    #[serde(with = "math::wad_string")]
    pub build_ratio: U256,

    /// Debt per unit of collateral value above which a position can be marked
    #[serde(with = "math::wad_string")]
    pub liquidation_ratio: U256,

    /// Share of the liquidated principal paid to the marker
    #[serde(with = "math::wad_string")]
    pub marker_reward_ratio: U256,

    /// Share of the liquidated principal paid to the liquidator
    #[serde(with = "math::wad_string")]
    pub liquidator_reward_ratio: U256,

    /// Seconds between mark and liquidation
    pub liquidation_delay_secs: u64,
}

impl Default for DomainParams {
    fn default() -> Self {
        Self {
            build_ratio: wad_from_raw(DEFAULT_BUILD_RATIO),
            liquidation_ratio: wad_from_raw(DEFAULT_LIQUIDATION_RATIO),
            marker_reward_ratio: wad_from_raw(DEFAULT_MARKER_REWARD_RATIO),
            liquidator_reward_ratio: wad_from_raw(DEFAULT_LIQUIDATOR_REWARD_RATIO),
            liquidation_delay_secs: DEFAULT_LIQUIDATION_DELAY_SECS,
        }
    }
}

impl DomainParams {
    /// Set custom build and liquidation ratios
    pub fn with_ratios(mut self, build_ratio: U256, liquidation_ratio: U256) -> Self {
        self.build_ratio = build_ratio;
        self.liquidation_ratio = liquidation_ratio;
        self
    }

    /// Set custom reward ratios
    pub fn with_rewards(mut self, marker_reward_ratio: U256, liquidator_reward_ratio: U256) -> Self {
        self.marker_reward_ratio = marker_reward_ratio;
        self.liquidator_reward_ratio = liquidator_reward_ratio;
        self
    }

    /// Set a custom liquidation delay
    pub fn with_delay(mut self, secs: u64) -> Self {
        self.liquidation_delay_secs = secs;
        self
    }

    /// Combined reward ratio `1 + liquidator + marker`
    pub fn penalty_factor(&self) -> Result<U256> {
        safe_add(
            UNIT,
            safe_add(self.liquidator_reward_ratio, self.marker_reward_ratio)?,
        )
    }

    /// Validate parameters are consistent
    ///
    /// The build ratio must sit strictly below the liquidation ratio, and a
    /// full-penalty liquidation must still improve the position.
    pub fn validate(&self) -> Result<()> {
        validate_ratio_bounds(self.build_ratio, "build_ratio")?;
        validate_ratio_bounds(self.liquidation_ratio, "liquidation_ratio")?;

        if self.build_ratio >= self.liquidation_ratio {
            return Err(Error::InvalidParameter {
                name: "build_ratio".into(),
                reason: "must be below liquidation_ratio".into(),
            });
        }

        if self.marker_reward_ratio > UNIT || self.liquidator_reward_ratio > UNIT {
            return Err(Error::InvalidParameter {
                name: "reward_ratio".into(),
                reason: "reward ratios cannot exceed 1".into(),
            });
        }

        // (1 + rewards) * build_ratio < 1
        let penalty = self.penalty_factor()?;
        if cmp_products(penalty, self.build_ratio, UNIT, UNIT).is_ge() {
            return Err(Error::InvalidParameter {
                name: "reward_ratio".into(),
                reason: "liquidation penalty too large for the build ratio".into(),
            });
        }
        // multiply_decimal must also round below 1 for max_burn's divisor
        if multiply_decimal(penalty, self.build_ratio)? >= UNIT {
            return Err(Error::InvalidParameter {
                name: "reward_ratio".into(),
                reason: "liquidation penalty too large for the build ratio".into(),
            });
        }

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPONENT ACCOUNTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Identities the core acts under when it calls capability-gated ledger
/// mutations on behalf of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentAccounts {
    /// Mint/burn gateway (needs IssueDebt and BurnDebt)
    pub build_burn: Account,
    /// Liquidation engine (needs BurnDebt and MoveReward)
    pub liquidation: Account,
    /// Reward system (needs LockReward)
    #[serde(default = "reward_system_component")]
    pub reward_system: Account,
}

impl Default for ComponentAccounts {
    fn default() -> Self {
        Self {
            build_burn: Account::new(BUILD_BURN_COMPONENT),
            liquidation: Account::new(LIQUIDATION_COMPONENT),
            reward_system: reward_system_component(),
        }
    }
}

fn reward_system_component() -> Account {
    Account::new(REWARD_SYSTEM_COMPONENT)
}

// ═══════════════════════════════════════════════════════════════════════════════
// REWARD SCHEDULE
// ═══════════════════════════════════════════════════════════════════════════════

/// Period layout of signed reward claims
///
/// Period `n` (starting at 1) ends at `first_period_start + n * period_duration_secs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSchedule {
    /// Start of period 1
    pub first_period_start: Timestamp,
    /// Length of every period
    pub period_duration_secs: u64,
    /// Periods after the claimed one during which the claim stays open
    pub claim_window_periods: u64,
    /// Lock of the staking reward, counted from the period end
    pub staking_lock_secs: u64,
    /// Account whose native-domain synthetics pay fee rewards
    pub fee_pool: Option<Account>,
}

impl Default for RewardSchedule {
    fn default() -> Self {
        Self {
            first_period_start: 0,
            period_duration_secs: DEFAULT_REWARD_PERIOD_SECS,
            claim_window_periods: DEFAULT_CLAIM_WINDOW_PERIODS,
            staking_lock_secs: DEFAULT_STAKING_REWARD_LOCK_SECS,
            fee_pool: None,
        }
    }
}

impl RewardSchedule {
    /// Schedule whose first period starts at `start`
    pub fn starting_at(start: Timestamp) -> Self {
        Self {
            first_period_start: start,
            ..Self::default()
        }
    }

    /// Set the fee pool account
    pub fn with_fee_pool(mut self, fee_pool: Account) -> Self {
        self.fee_pool = Some(fee_pool);
        self
    }

    /// Period containing `now`; 0 before the first period starts
    pub fn current_period_id(&self, now: Timestamp) -> u64 {
        if now < self.first_period_start || self.period_duration_secs == 0 {
            return 0;
        }
        (now - self.first_period_start) / self.period_duration_secs + 1
    }

    /// End timestamp of a period
    pub fn period_end(&self, period_id: u64) -> Result<Timestamp> {
        period_id
            .checked_mul(self.period_duration_secs)
            .and_then(|offset| offset.checked_add(self.first_period_start))
            .ok_or_else(|| Error::Overflow {
                operation: "period_end".into(),
            })
    }

    /// Unlock time of a staking reward claimed for `period_id`
    pub fn staking_unlock_time(&self, period_id: u64) -> Result<Timestamp> {
        self.period_end(period_id)?
            .checked_add(self.staking_lock_secs)
            .ok_or_else(|| Error::Overflow {
                operation: "staking_unlock_time".into(),
            })
    }

    /// Check that `period_id` has ended and is still within its claim window
    pub fn check_claimable(&self, period_id: u64, now: Timestamp) -> Result<()> {
        if period_id == 0 {
            return Err(Error::InvalidParameter {
                name: "period_id".into(),
                reason: "periods start at 1".into(),
            });
        }
        let current = self.current_period_id(now);
        if period_id >= current {
            return Err(Error::PeriodNotEnded { period_id, current });
        }
        if current > period_id.saturating_add(self.claim_window_periods) {
            return Err(Error::RewardExpired { period_id, current });
        }
        Ok(())
    }

    /// Validate the schedule
    pub fn validate(&self) -> Result<()> {
        if self.period_duration_secs == 0 {
            return Err(Error::Config("reward period_duration_secs must be positive".into()));
        }
        if self.claim_window_periods == 0 {
            return Err(Error::Config("reward claim_window_periods must be positive".into()));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Protocol-wide configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Currency whose domain counts locked reward entries
    pub native_currency: CurrencyKey,

    /// Maximum price age in seconds
    pub price_stale_period_secs: u64,

    /// Collateral domains by currency
    pub domains: BTreeMap<CurrencyKey, DomainParams>,

    /// Component identities
    #[serde(default)]
    pub components: ComponentAccounts,

    /// Account that funds reward unlocks
    #[serde(default)]
    pub rewarder: Option<Account>,

    /// Signed reward claim periods
    #[serde(default)]
    pub reward_schedule: RewardSchedule,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        let native = native_key();
        let mut domains = BTreeMap::new();
        domains.insert(native.clone(), DomainParams::default());
        Self {
            native_currency: native,
            price_stale_period_secs: DEFAULT_PRICE_STALE_PERIOD_SECS,
            domains,
            components: ComponentAccounts::default(),
            rewarder: None,
            reward_schedule: RewardSchedule::default(),
        }
    }
}

impl ProtocolConfig {
    /// Add or replace a collateral domain
    pub fn with_domain(mut self, currency: CurrencyKey, params: DomainParams) -> Self {
        self.domains.insert(currency, params);
        self
    }

    /// Set the rewarder account
    pub fn with_rewarder(mut self, rewarder: Account) -> Self {
        self.rewarder = Some(rewarder);
        self
    }

    /// Set the reward claim schedule
    pub fn with_reward_schedule(mut self, schedule: RewardSchedule) -> Self {
        self.reward_schedule = schedule;
        self
    }

    /// Set a custom price stale period
    pub fn with_price_stale_period(mut self, secs: u64) -> Self {
        self.price_stale_period_secs = secs;
        self
    }

    /// Parameters of a domain
    pub fn domain(&self, currency: &CurrencyKey) -> Result<&DomainParams> {
        self.domains
            .get(currency)
            .ok_or_else(|| Error::UnknownDomain(currency.to_string()))
    }

    /// Check if a currency is the native collateral
    pub fn is_native(&self, currency: &CurrencyKey) -> bool {
        *currency == self.native_currency
    }

    /// Validate configuration is consistent
    pub fn validate(&self) -> Result<()> {
        if self.price_stale_period_secs == 0 {
            return Err(Error::Config("price_stale_period_secs must be positive".into()));
        }
        if !self.domains.contains_key(&self.native_currency) {
            return Err(Error::Config(format!(
                "native currency {} has no domain",
                self.native_currency
            )));
        }
        let components = &self.components;
        if components.build_burn == components.liquidation
            || components.build_burn == components.reward_system
            || components.liquidation == components.reward_system
        {
            return Err(Error::Config("component accounts must be distinct".into()));
        }
        self.reward_schedule.validate()?;
        for (currency, params) in &self.domains {
            params
                .validate()
                .map_err(|e| Error::Config(format!("domain {}: {}", currency, e)))?;
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PERSISTENCE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::Config(e.to_string()))?;
        let config: Self =
            serde_json::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Config(e.to_string()))?;
        }

        std::fs::write(path, content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Default configuration with environment overrides applied
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup; unparsable values are ignored
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(period) = lookup(ENV_PRICE_STALE_PERIOD) {
            if let Ok(secs) = period.parse() {
                self.price_stale_period_secs = secs;
            }
        }

        if let Some(symbol) = lookup(ENV_NATIVE_CURRENCY) {
            if let Ok(native) = CurrencyKey::new(&symbol) {
                if native != self.native_currency {
                    let params = self
                        .domains
                        .remove(&self.native_currency)
                        .unwrap_or_default();
                    self.domains.entry(native.clone()).or_insert(params);
                    self.native_currency = native;
                }
            }
        }

        self
    }
}

fn native_key() -> CurrencyKey {
    CurrencyKey::from_static(NATIVE_CURRENCY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::math::parse_wad;
    use std::collections::HashMap;

    #[test]
    fn test_domain_params_default() {
        let params = DomainParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.build_ratio, parse_wad("0.2").unwrap());
        assert_eq!(params.liquidation_ratio, parse_wad("0.5").unwrap());
        assert_eq!(params.liquidation_delay_secs, 3 * 24 * 3600);
    }

    #[test]
    fn test_domain_params_rejects_inverted_ratios() {
        let params = DomainParams::default()
            .with_ratios(parse_wad("0.5").unwrap(), parse_wad("0.2").unwrap());
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_domain_params_rejects_oversized_penalty() {
        // (1 + 0.5 + 0.5) * 0.5 == 1
        let params = DomainParams::default()
            .with_ratios(parse_wad("0.5").unwrap(), parse_wad("0.8").unwrap())
            .with_rewards(parse_wad("0.5").unwrap(), parse_wad("0.5").unwrap());
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_protocol_config_default() {
        let config = ProtocolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.native_currency.as_str(), NATIVE_CURRENCY);
        assert!(config.domain(&config.native_currency).is_ok());
        assert!(matches!(
            config.domain(&CurrencyKey::new("WBTC").unwrap()),
            Err(Error::UnknownDomain(_))
        ));
    }

    #[test]
    fn test_ratios_serialize_as_decimal_strings() {
        let json = serde_json::to_string(&DomainParams::default()).unwrap();
        assert!(json.contains("\"build_ratio\":\"0.2\""));
        assert!(json.contains("\"marker_reward_ratio\":\"0.05\""));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("athos").join("config.json");

        let wbtc = CurrencyKey::new("WBTC").unwrap();
        let config = ProtocolConfig::default()
            .with_domain(
                wbtc.clone(),
                DomainParams::default()
                    .with_ratios(parse_wad("0.5").unwrap(), parse_wad("0.8").unwrap()),
            )
            .with_rewarder(Account::new([0x09; ACCOUNT_LENGTH]));
        config.save(&path).unwrap();

        let loaded = ProtocolConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.domain(&wbtc).unwrap().build_ratio, parse_wad("0.5").unwrap());
    }

    #[test]
    fn test_load_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = ProtocolConfig::default();
        config.price_stale_period_secs = 0;
        config.save(&path).unwrap();

        assert!(matches!(ProtocolConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_PRICE_STALE_PERIOD, "600"),
            (ENV_NATIVE_CURRENCY, "SNX"),
        ]
        .into_iter()
        .collect();

        let config = ProtocolConfig::default()
            .with_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.price_stale_period_secs, 600);
        assert_eq!(config.native_currency.as_str(), "SNX");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_ignore_garbage() {
        let config = ProtocolConfig::default().with_overrides(|key| {
            (key == ENV_PRICE_STALE_PERIOD).then(|| "soon".to_string())
        });
        assert_eq!(config.price_stale_period_secs, DEFAULT_PRICE_STALE_PERIOD_SECS);
    }

    #[test]
    fn test_reward_periods() {
        let week = DEFAULT_REWARD_PERIOD_SECS;
        let schedule = RewardSchedule::starting_at(1_000);

        assert_eq!(schedule.current_period_id(999), 0);
        assert_eq!(schedule.current_period_id(1_000), 1);
        assert_eq!(schedule.period_end(1).unwrap(), 1_000 + week);
        assert_eq!(schedule.current_period_id(1_000 + week), 2);

        // Period 1 closes at its end and stays claimable through period 3
        assert!(matches!(
            schedule.check_claimable(1, 1_000 + week - 1),
            Err(Error::PeriodNotEnded { period_id: 1, current: 1 })
        ));
        assert!(schedule.check_claimable(1, 1_000 + week).is_ok());
        assert!(schedule.check_claimable(1, 1_000 + 3 * week - 1).is_ok());
        assert!(matches!(
            schedule.check_claimable(1, 1_000 + 3 * week),
            Err(Error::RewardExpired { period_id: 1, current: 4 })
        ));

        assert_eq!(
            schedule.staking_unlock_time(1).unwrap(),
            1_000 + week + DEFAULT_STAKING_REWARD_LOCK_SECS
        );
        assert!(schedule.period_end(u64::MAX).is_err());
        assert!(schedule.check_claimable(0, 1_000 + week).is_err());
    }

    #[test]
    fn test_reward_schedule_defaults_when_missing() {
        let mut value = serde_json::to_value(ProtocolConfig::default()).unwrap();
        let object = value.as_object_mut().unwrap();
        object.remove("reward_schedule");
        object["components"].as_object_mut().unwrap().remove("reward_system");

        let config: ProtocolConfig = serde_json::from_value(value).unwrap();
        assert_eq!(config.reward_schedule, RewardSchedule::default());
        assert_eq!(config.components, ComponentAccounts::default());
    }

    #[test]
    fn test_zero_reward_period_rejected() {
        let mut schedule = RewardSchedule::default();
        schedule.period_duration_secs = 0;
        let config = ProtocolConfig::default().with_reward_schedule(schedule);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
