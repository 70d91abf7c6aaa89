//! Fixed-point arithmetic and mathematical utilities.
//!
//! Amounts, prices and ratios are 18-decimal wads stored in [`U256`].
//! Products are formed in [`U512`] so `a * b / c` never overflows in the
//! intermediate step. Every division rounds toward zero.

use std::cmp::Ordering;

use primitive_types::{U256, U512};

use crate::error::{Error, Result};
use crate::utils::constants::{DECIMALS, UNIT_RAW};

// ═══════════════════════════════════════════════════════════════════════════════
// WAD CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// One whole unit (1.0)
pub const UNIT: U256 = U256([UNIT_RAW as u64, 0, 0, 0]);

/// Create a wad from a whole number
pub fn wad(whole: u64) -> U256 {
    U256::from(whole) * UNIT
}

/// Create a wad from a raw `u128` fixed-point value
pub fn wad_from_raw(raw: u128) -> U256 {
    U256::from(raw)
}

// ═══════════════════════════════════════════════════════════════════════════════
// SAFE ARITHMETIC OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Safe addition with overflow check
pub fn safe_add(a: U256, b: U256) -> Result<U256> {
    a.checked_add(b).ok_or_else(|| Error::Overflow {
        operation: format!("{} + {}", a, b),
    })
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: U256, b: U256) -> Result<U256> {
    a.checked_sub(b).ok_or_else(|| Error::Underflow {
        operation: format!("{} - {}", a, b),
    })
}

/// Safe multiplication with overflow check
pub fn safe_mul(a: U256, b: U256) -> Result<U256> {
    a.checked_mul(b).ok_or_else(|| Error::Overflow {
        operation: format!("{} * {}", a, b),
    })
}

/// Safe division with zero check
pub fn safe_div(a: U256, b: U256) -> Result<U256> {
    if b.is_zero() {
        return Err(division_by_zero());
    }
    Ok(a / b)
}

/// Computes `(a * b) / c` with a 512-bit intermediate, rounding down
pub fn safe_mul_div(a: U256, b: U256, c: U256) -> Result<U256> {
    if c.is_zero() {
        return Err(division_by_zero());
    }
    let result = a.full_mul(b) / U512::from(c);
    U256::try_from(result).map_err(|_| Error::Overflow {
        operation: format!("({} * {}) / {}", a, b, c),
    })
}

/// Multiplies two wads: `a * b / 1e18`
pub fn multiply_decimal(a: U256, b: U256) -> Result<U256> {
    safe_mul_div(a, b, UNIT)
}

/// Divides two wads: `a * 1e18 / b`
pub fn divide_decimal(a: U256, b: U256) -> Result<U256> {
    safe_mul_div(a, UNIT, b)
}

/// Compares `a * b` with `c * d` at full precision
pub fn cmp_products(a: U256, b: U256, c: U256, d: U256) -> Ordering {
    a.full_mul(b).cmp(&c.full_mul(d))
}

fn division_by_zero() -> Error {
    Error::InvalidParameter {
        name: "divisor".into(),
        reason: "division by zero".into(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DECIMAL STRINGS
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse a decimal string such as `"0.035"` or `"1000"` into a wad
pub fn parse_wad(s: &str) -> Result<U256> {
    let invalid = |reason: &str| Error::InvalidParameter {
        name: format!("decimal '{}'", s),
        reason: reason.into(),
    };

    let s = s.trim();
    let (whole, fraction) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid("empty"));
    }
    if fraction.len() > DECIMALS as usize {
        return Err(invalid("more than 18 fractional digits"));
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid("not a decimal number"));
    }

    let whole = if whole.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(whole).map_err(|_| invalid("integer part out of range"))?
    };
    let padded = format!("{:0<width$}", fraction, width = DECIMALS as usize);
    let fraction = U256::from_dec_str(&padded).map_err(|_| invalid("bad fraction"))?;

    safe_add(safe_mul(whole, UNIT)?, fraction)
}

/// Format a wad as a decimal string without trailing zeros
pub fn format_wad(value: U256) -> String {
    let whole = value / UNIT;
    let fraction = value % UNIT;
    if fraction.is_zero() {
        return whole.to_string();
    }
    let digits = format!("{:0>width$}", fraction.to_string(), width = DECIMALS as usize);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

/// Serde adapter storing wads as decimal strings (`"0.2"`)
pub mod wad_string {
    use primitive_types::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a wad as a decimal string
    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_wad(*value))
    }

    /// Deserialize a wad from a decimal string
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_wad(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wad_constants() {
        assert_eq!(UNIT, U256::exp10(18));
        assert_eq!(wad(3), U256::from(3u64) * U256::exp10(18));
    }

    #[test]
    fn test_safe_operations() {
        assert_eq!(safe_add(wad(1), wad(2)).unwrap(), wad(3));
        assert!(safe_add(U256::MAX, U256::one()).is_err());
        assert!(safe_sub(wad(1), wad(2)).is_err());
        assert!(safe_div(wad(1), U256::zero()).is_err());
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // 1,000,000 ATH at $0.1
        let amount = wad(1_000_000);
        let price = parse_wad("0.1").unwrap();
        assert_eq!(multiply_decimal(amount, price).unwrap(), wad(100_000));

        let huge = U256::MAX / U256::from(2u64);
        assert_eq!(safe_mul_div(huge, wad(4), wad(2)).unwrap(), huge * U256::from(2u64));
        assert!(safe_mul_div(U256::MAX, wad(2), wad(1)).is_err());
    }

    #[test]
    fn test_divide_decimal_floors() {
        // 10 / 0.035 = 285.714285714285714285(714...)
        let principal = divide_decimal(wad(10), parse_wad("0.035").unwrap()).unwrap();
        assert_eq!(principal, U256::from_dec_str("285714285714285714285").unwrap());
    }

    #[test]
    fn test_parse_and_format() {
        assert_eq!(parse_wad("0.2").unwrap(), U256::exp10(17) * U256::from(2u64));
        assert_eq!(parse_wad("1000").unwrap(), wad(1000));
        assert_eq!(parse_wad(".5").unwrap(), UNIT / U256::from(2u64));
        assert_eq!(parse_wad("0.000000000000000001").unwrap(), U256::one());
        assert!(parse_wad("0.0000000000000000001").is_err());
        assert!(parse_wad("1e18").is_err());
        assert!(parse_wad("").is_err());

        assert_eq!(format_wad(parse_wad("0.035").unwrap()), "0.035");
        assert_eq!(format_wad(wad(42)), "42");
    }

    #[test]
    fn test_cmp_products() {
        // 20 * 1 == 40 * 0.5
        let half = UNIT / U256::from(2u64);
        assert_eq!(cmp_products(wad(20), UNIT, wad(40), half), Ordering::Equal);
        assert_eq!(cmp_products(wad(21), UNIT, wad(40), half), Ordering::Greater);
    }
}
