//! Price feed implementation.
//!
//! This module provides:
//! - The [`PriceOracle`] collaborator trait
//! - Per-currency price storage with update validation
//! - Fresh-price lookup used by every valuation in the core

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::core::types::{CurrencyKey, Timestamp};
use crate::error::{Error, Result};
use crate::utils::math::{self, format_wad};
use crate::utils::validation::{validate_price, validate_price_freshness};

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE DATA
// ═══════════════════════════════════════════════════════════════════════════════

/// A single price data point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PriceData {
    /// USD price as a wad (e.g. `0.035`)
    #[serde(with = "math::wad_string")]
    pub price: U256,
    /// Unix timestamp of the last update
    pub updated_at: Timestamp,
}

impl PriceData {
    /// Create a new price data point
    pub fn new(price: U256, updated_at: Timestamp) -> Self {
        Self { price, updated_at }
    }

    /// Check if price is fresh
    pub fn is_fresh(&self, current_time: Timestamp, max_age: u64) -> bool {
        self.age(current_time) <= max_age
    }

    /// Get age of price in seconds
    pub fn age(&self, current_time: Timestamp) -> u64 {
        current_time.saturating_sub(self.updated_at)
    }

    /// Format price for display
    pub fn format_price(&self) -> String {
        format!("${}", format_wad(self.price))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Source of collateral prices
pub trait PriceOracle {
    /// Latest price of a currency, if any
    fn price_of(&self, currency: &CurrencyKey) -> Option<PriceData>;
}

/// Look up a price and reject it when absent, zero or stale
pub fn fresh_price<O: PriceOracle + ?Sized>(
    oracle: &O,
    currency: &CurrencyKey,
    current_time: Timestamp,
    max_age: u64,
) -> Result<U256> {
    let data = oracle
        .price_of(currency)
        .ok_or_else(|| Error::PriceNotFound(currency.to_string()))?;
    validate_price_freshness(currency.as_str(), data.updated_at, current_time, max_age)?;
    validate_price(currency.as_str(), data.price)?;
    Ok(data.price)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE FEED
// ═══════════════════════════════════════════════════════════════════════════════

/// Price feed of one currency
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceFeed {
    /// Current price
    current: PriceData,
    /// Previous price (for change detection)
    previous: PriceData,
}

impl PriceFeed {
    /// Create an empty price feed
    pub fn new() -> Self {
        Self::default()
    }

    /// Update price with validation
    pub fn update(&mut self, price: PriceData) -> Result<()> {
        if price.price.is_zero() {
            return Err(Error::InvalidParameter {
                name: "price".into(),
                reason: "price cannot be zero".into(),
            });
        }

        if self.current.updated_at > 0 && price.updated_at < self.current.updated_at {
            return Err(Error::InvalidParameter {
                name: "timestamp".into(),
                reason: "price timestamp is older than current".into(),
            });
        }

        self.previous = self.current;
        self.current = price;
        Ok(())
    }

    /// Get current price
    pub fn current_price(&self) -> &PriceData {
        &self.current
    }

    /// Get previous price
    pub fn previous_price(&self) -> &PriceData {
        &self.previous
    }

    /// Check if the feed has ever been updated
    pub fn has_price(&self) -> bool {
        !self.current.price.is_zero()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE ROUTER
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory oracle holding one feed per currency
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceRouter {
    feeds: BTreeMap<CurrencyKey, PriceFeed>,
}

impl PriceRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a new price for a currency
    pub fn set_price(&mut self, currency: &CurrencyKey, price: U256, updated_at: Timestamp) -> Result<()> {
        self.feeds
            .entry(currency.clone())
            .or_default()
            .update(PriceData::new(price, updated_at))?;
        debug!(%currency, price = %format_wad(price), updated_at, "price updated");
        Ok(())
    }

    /// Feed of a currency
    pub fn feed(&self, currency: &CurrencyKey) -> Option<&PriceFeed> {
        self.feeds.get(currency)
    }
}

impl PriceOracle for PriceRouter {
    fn price_of(&self, currency: &CurrencyKey) -> Option<PriceData> {
        self.feeds
            .get(currency)
            .filter(|feed| feed.has_price())
            .map(|feed| *feed.current_price())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::DEFAULT_PRICE_STALE_PERIOD_SECS;
    use crate::utils::math::parse_wad;

    fn ath() -> CurrencyKey {
        CurrencyKey::new("ATH").unwrap()
    }

    #[test]
    fn test_price_freshness() {
        let price = PriceData::new(parse_wad("0.1").unwrap(), 1000);
        assert!(price.is_fresh(1010, 3600));
        assert!(!price.is_fresh(8200, 3600));
        assert_eq!(price.format_price(), "$0.1");
    }

    #[test]
    fn test_price_feed_update() {
        let mut feed = PriceFeed::new();
        feed.update(PriceData::new(parse_wad("0.1").unwrap(), 1000)).unwrap();
        feed.update(PriceData::new(parse_wad("0.035").unwrap(), 1100)).unwrap();

        assert_eq!(feed.current_price().price, parse_wad("0.035").unwrap());
        assert_eq!(feed.previous_price().price, parse_wad("0.1").unwrap());

        // Older timestamp and zero price are rejected
        assert!(feed.update(PriceData::new(parse_wad("0.2").unwrap(), 900)).is_err());
        assert!(feed.update(PriceData::new(U256::zero(), 1200)).is_err());
    }

    #[test]
    fn test_fresh_price() {
        let mut router = PriceRouter::new();
        let max_age = DEFAULT_PRICE_STALE_PERIOD_SECS;

        assert!(matches!(
            fresh_price(&router, &ath(), 1000, max_age),
            Err(Error::PriceNotFound(_))
        ));

        router.set_price(&ath(), parse_wad("0.1").unwrap(), 1000).unwrap();
        assert_eq!(
            fresh_price(&router, &ath(), 1000 + max_age, max_age).unwrap(),
            parse_wad("0.1").unwrap()
        );
        assert!(matches!(
            fresh_price(&router, &ath(), 1001 + max_age, max_age),
            Err(Error::StalePrice { .. })
        ));
    }

    #[test]
    fn test_price_data_json() {
        let data = PriceData::new(parse_wad("0.035").unwrap(), 7);
        let json = serde_json::to_string(&data).unwrap();
        assert_eq!(json, r#"{"price":"0.035","updated_at":7}"#);
    }
}
