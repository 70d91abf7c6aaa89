//! Identifier types shared by every ledger.
//!
//! - [`Account`]: a 20-byte participant identifier, hex encoded on the wire
//! - [`CurrencyKey`]: a short ASCII currency symbol such as `ATH` or `WBTC`

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::{Error, Result};
use crate::utils::constants::{ACCOUNT_LENGTH, MAX_CURRENCY_KEY_LENGTH};

/// Unix timestamp in seconds
pub type Timestamp = u64;

// ═══════════════════════════════════════════════════════════════════════════════
// ACCOUNT
// ═══════════════════════════════════════════════════════════════════════════════

/// A participant identifier (20 bytes)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Account([u8; ACCOUNT_LENGTH]);

impl Serialize for Account {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Account {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Account::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl Account {
    /// Create an account from raw bytes
    pub const fn new(bytes: [u8; ACCOUNT_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Create from a slice (must be exactly 20 bytes)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != ACCOUNT_LENGTH {
            return Err(Error::InvalidParameter {
                name: "account".into(),
                reason: format!("expected {} bytes, got {}", ACCOUNT_LENGTH, slice.len()),
            });
        }
        let mut bytes = [0u8; ACCOUNT_LENGTH];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Parse from hex, with or without a `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed).map_err(|e| Error::InvalidParameter {
            name: "account".into(),
            reason: e.to_string(),
        })?;
        Self::from_slice(&bytes)
    }

    /// Convert to a `0x`-prefixed hex string
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; ACCOUNT_LENGTH] {
        &self.0
    }

    /// The all-zero account
    pub fn zero() -> Self {
        Self([0u8; ACCOUNT_LENGTH])
    }

    /// Check if this is the all-zero account
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ACCOUNT_LENGTH]
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Account({})", &self.to_hex()[..10])
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CURRENCY KEY
// ═══════════════════════════════════════════════════════════════════════════════

/// A collateral or synthetic currency symbol
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CurrencyKey(String);

impl CurrencyKey {
    /// Create a currency key, rejecting empty, non-ASCII or oversized symbols
    pub fn new(symbol: &str) -> Result<Self> {
        if symbol.is_empty()
            || symbol.len() > MAX_CURRENCY_KEY_LENGTH
            || !symbol.chars().all(|c| c.is_ascii_graphic())
        {
            return Err(Error::InvalidParameter {
                name: "currency".into(),
                reason: format!(
                    "'{}' must be 1-{} printable ASCII bytes",
                    symbol, MAX_CURRENCY_KEY_LENGTH
                ),
            });
        }
        Ok(Self(symbol.to_string()))
    }

    /// Wrap a compile-time symbol that is known to be valid
    pub(crate) fn from_static(symbol: &'static str) -> Self {
        Self(symbol.to_string())
    }

    /// The symbol as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Serialize for CurrencyKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CurrencyKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        CurrencyKey::new(&s).map_err(serde::de::Error::custom)
    }
}

impl std::str::FromStr for CurrencyKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Debug for CurrencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CurrencyKey({})", self.0)
    }
}

impl fmt::Display for CurrencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CurrencyKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_hex_roundtrip() {
        let account = Account::new([0xab; ACCOUNT_LENGTH]);
        let hex = account.to_hex();
        assert!(hex.starts_with("0xabab"));
        assert_eq!(Account::from_hex(&hex).unwrap(), account);
        assert_eq!(Account::from_hex(&hex[2..]).unwrap(), account);
    }

    #[test]
    fn test_account_rejects_bad_length() {
        assert!(Account::from_hex("0x0102").is_err());
        assert!(Account::from_hex("zz").is_err());
    }

    #[test]
    fn test_account_json_is_hex_string() {
        let account = Account::new([0x01; ACCOUNT_LENGTH]);
        let json = serde_json::to_string(&account).unwrap();
        assert_eq!(json, format!("\"{}\"", account.to_hex()));
        let back: Account = serde_json::from_str(&json).unwrap();
        assert_eq!(back, account);
    }

    #[test]
    fn test_currency_key_validation() {
        assert!(CurrencyKey::new("ATH").is_ok());
        assert!(CurrencyKey::new("WBTC").is_ok());
        assert!(CurrencyKey::new("").is_err());
        assert!(CurrencyKey::new("has space").is_err());
        assert!(CurrencyKey::new(&"X".repeat(MAX_CURRENCY_KEY_LENGTH + 1)).is_err());
        assert!(serde_json::from_str::<CurrencyKey>("\"\"").is_err());
    }
}
