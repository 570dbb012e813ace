//! Fixed-point fiat amounts
//!
//! Fiat values and exchange rates are held as `U256` scaled by
//! `10^FIAT_DECIMALS`, so summing balances and converting between fiat and
//! token raw units never touches binary floating point. Rounding to cents only
//! happens in the `format_*` helpers.

use alloy::primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Decimal places carried by every [`Fiat`] value
pub const FIAT_DECIMALS: u8 = 18;

/// Non-negative fiat amount (or fiat price of one whole token)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Fiat(U256);

/// Largest token precision whose unit `10^decimals` fits in a `U256`
pub const MAX_TOKEN_DECIMALS: u8 = 77;

fn pow10(exp: u8) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

fn checked_pow10(exp: u8) -> Option<U256> {
    U256::from(10u64).checked_pow(U256::from(exp))
}

fn fiat_unit() -> U256 {
    pow10(FIAT_DECIMALS)
}

impl Fiat {
    pub const ZERO: Fiat = Fiat(U256::ZERO);

    /// Wrap a value already scaled by `10^FIAT_DECIMALS`
    pub fn from_scaled(value: U256) -> Self {
        Self(value)
    }

    pub fn scaled(&self) -> U256 {
        self.0
    }

    pub fn from_cents(cents: u64) -> Self {
        Self(U256::from(cents) * pow10(FIAT_DECIMALS - 2))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn saturating_add(self, other: Fiat) -> Fiat {
        Fiat(self.0.saturating_add(other.0))
    }

    /// Value rounded half-up to whole cents
    pub fn round_to_cents(&self) -> U256 {
        let step = pow10(FIAT_DECIMALS - 2);
        (self.0 + step / U256::from(2u64)) / step
    }

    /// Fiat value of `raw` token units priced at `rate` per whole token
    ///
    /// Precisions above [`MAX_TOKEN_DECIMALS`] have no representable unit
    /// and value to zero.
    pub fn from_raw_units(raw: U256, decimals: u8, rate: Fiat) -> Fiat {
        let Some(scale) = checked_pow10(decimals) else {
            return Fiat::ZERO;
        };
        let whole = raw / scale;
        let frac = raw % scale;
        let value = whole
            .saturating_mul(rate.0)
            .saturating_add(frac.saturating_mul(rate.0) / scale);
        Fiat(value)
    }

    /// Token raw units worth this amount at `rate`, truncated toward zero
    ///
    /// Returns `None` when the rate is zero or the product overflows.
    pub fn to_raw_units(&self, decimals: u8, rate: Fiat) -> Option<U256> {
        if rate.is_zero() {
            return None;
        }
        self.0
            .checked_mul(checked_pow10(decimals)?)
            .map(|scaled| scaled / rate.0)
    }
}

impl FromStr for Fiat {
    type Err = Error;

    /// Parses plain decimal notation; a comma is accepted as decimal separator.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.starts_with('-') {
            return Err(Error::InvalidAmount(format!("negative amount {}", trimmed)));
        }
        let normalized = trimmed.replace(',', ".");
        let (int_part, frac_part) = match normalized.split_once('.') {
            Some((i, f)) => (i, f),
            None => (normalized.as_str(), ""),
        };

        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if (int_part.is_empty() && frac_part.is_empty())
            || !all_digits(int_part)
            || !all_digits(frac_part)
        {
            return Err(Error::InvalidAmount(format!("not a decimal number: {:?}", s)));
        }
        if frac_part.len() > FIAT_DECIMALS as usize {
            return Err(Error::InvalidAmount(format!(
                "more than {} decimal places",
                FIAT_DECIMALS
            )));
        }

        let parse = |digits: &str| -> Result<U256> {
            if digits.is_empty() {
                return Ok(U256::ZERO);
            }
            U256::from_str_radix(digits, 10)
                .map_err(|e| Error::InvalidAmount(format!("{}: {}", s, e)))
        };

        let int_value = parse(int_part)?;
        let frac_value = parse(frac_part)? * pow10(FIAT_DECIMALS - frac_part.len() as u8);
        let value = int_value
            .checked_mul(fiat_unit())
            .and_then(|v| v.checked_add(frac_value))
            .ok_or_else(|| Error::InvalidAmount(format!("amount too large: {}", s)))?;

        Ok(Fiat(value))
    }
}

impl fmt::Display for Fiat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = fiat_unit();
        let whole = self.0 / unit;
        let frac = self.0 % unit;
        if frac.is_zero() {
            return write!(f, "{}", whole);
        }
        let frac = format!("{:0>width$}", frac.to_string(), width = FIAT_DECIMALS as usize);
        write!(f, "{}.{}", whole, frac.trim_end_matches('0'))
    }
}

impl Serialize for Fiat {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Fiat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

fn group_thousands(digits: &str, separator: char) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(separator);
        }
        out.push(c);
    }
    out
}

fn format_cents(value: Fiat, thousands: char, decimal: char) -> String {
    let cents = value.round_to_cents();
    let hundred = U256::from(100u64);
    let whole = group_thousands(&(cents / hundred).to_string(), thousands);
    format!("{}{}{:02}", whole, decimal, (cents % hundred).to::<u64>())
}

/// Brazilian real, e.g. `R$ 1.234,56`
pub fn format_brl(value: Fiat) -> String {
    format!("R$ {}", format_cents(value, '.', ','))
}

/// US dollar, e.g. `$1,234.56`
pub fn format_usd(value: Fiat) -> String {
    format!("${}", format_cents(value, ',', '.'))
}

/// Compact form for large values (`1.5K`, `2.3M`, `1.0B`)
pub fn abbreviate(value: Fiat) -> String {
    const SUFFIXES: [(u8, char); 3] = [(9, 'B'), (6, 'M'), (3, 'K')];

    for (exp, suffix) in SUFFIXES {
        let threshold = pow10(exp) * fiat_unit();
        if value.0 >= threshold {
            let tenths = (value.0 * U256::from(10u64) + threshold / U256::from(2u64)) / threshold;
            let ten = U256::from(10u64);
            return format!("{}.{}{}", tenths / ten, tenths % ten, suffix);
        }
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fiat(s: &str) -> Fiat {
        s.parse().unwrap()
    }

    #[test]
    fn precision_beyond_u256_unit_does_not_wrap() {
        let rate = fiat("5");
        assert_eq!(
            Fiat::from_raw_units(U256::from(1u64), MAX_TOKEN_DECIMALS + 1, rate),
            Fiat::ZERO
        );
        assert_eq!(fiat("1").to_raw_units(MAX_TOKEN_DECIMALS + 1, rate), None);

        let one_token = U256::from(10u64).pow(U256::from(MAX_TOKEN_DECIMALS));
        assert_eq!(
            Fiat::from_raw_units(one_token, MAX_TOKEN_DECIMALS, rate),
            rate
        );
    }

    #[test]
    fn parses_decimal_notation() {
        assert_eq!(fiat("100"), Fiat::from_cents(10_000));
        assert_eq!(fiat("100.5"), Fiat::from_cents(10_050));
        assert_eq!(fiat("0,50"), Fiat::from_cents(50));
        assert_eq!(fiat(".25"), Fiat::from_cents(25));
    }

    #[test]
    fn rejects_negative_and_garbage() {
        assert!(matches!("-1".parse::<Fiat>(), Err(Error::InvalidAmount(_))));
        assert!(matches!("abc".parse::<Fiat>(), Err(Error::InvalidAmount(_))));
        assert!(matches!("".parse::<Fiat>(), Err(Error::InvalidAmount(_))));
        assert!(matches!("1e5".parse::<Fiat>(), Err(Error::InvalidAmount(_))));
    }

    #[test]
    fn display_trims_trailing_zeros() {
        assert_eq!(fiat("9.000").to_string(), "9");
        assert_eq!(fiat("4.50").to_string(), "4.5");
        assert_eq!(Fiat::ZERO.to_string(), "0");
    }

    #[test]
    fn converts_raw_units_to_fiat() {
        // 2 MATIC at R$ 4.50
        let raw = U256::from(2_000_000_000_000_000_000u128);
        let value = Fiat::from_raw_units(raw, 18, fiat("4.50"));
        assert_eq!(value, fiat("9"));

        // 12.345678 USDC at R$ 5.00
        let value = Fiat::from_raw_units(U256::from(12_345_678u64), 6, fiat("5"));
        assert_eq!(value, fiat("61.72839"));
    }

    #[test]
    fn converts_fiat_to_raw_units() {
        let raw = fiat("9").to_raw_units(18, fiat("4.5")).unwrap();
        assert_eq!(raw, U256::from(2_000_000_000_000_000_000u128));

        assert_eq!(fiat("10").to_raw_units(6, Fiat::ZERO), None);
    }

    #[test]
    fn round_trip_is_bounded_by_one_raw_unit() {
        let rates = ["4.5", "5.37", "350000", "0.000123"];
        let amounts = ["0.01", "1", "99.99", "12345.67"];
        for decimals in [0u8, 6, 8, 18] {
            for rate in rates {
                let rate = fiat(rate);
                let one_unit = Fiat::from_raw_units(U256::from(1u64), decimals, rate);
                for amount in amounts {
                    let amount = fiat(amount);
                    let raw = amount.to_raw_units(decimals, rate).unwrap();
                    let back = Fiat::from_raw_units(raw, decimals, rate);
                    assert!(back <= amount);
                    let gap = amount.scaled() - back.scaled();
                    assert!(
                        gap <= one_unit.scaled() + U256::from(1u64),
                        "decimals={} rate={} amount={}",
                        decimals,
                        rate,
                        amount
                    );
                }
            }
        }
    }

    #[test]
    fn formats_brl() {
        assert_eq!(format_brl(fiat("1000")), "R$ 1.000,00");
        assert_eq!(format_brl(fiat("1234.56")), "R$ 1.234,56");
        assert_eq!(format_brl(fiat("0.5")), "R$ 0,50");
        assert_eq!(format_brl(fiat("8.999")), "R$ 9,00");
    }

    #[test]
    fn formats_usd() {
        assert_eq!(format_usd(fiat("1000")), "$1,000.00");
        assert_eq!(format_usd(fiat("1234.56")), "$1,234.56");
        assert_eq!(format_usd(fiat("1234567.8")), "$1,234,567.80");
    }

    #[test]
    fn abbreviates_large_values() {
        assert_eq!(abbreviate(fiat("1500")), "1.5K");
        assert_eq!(abbreviate(fiat("1500000")), "1.5M");
        assert_eq!(abbreviate(fiat("1500000000")), "1.5B");
        assert_eq!(abbreviate(fiat("500")), "500");
    }

    #[test]
    fn serializes_as_decimal_string() {
        let json = serde_json::to_string(&fiat("4.5")).unwrap();
        assert_eq!(json, "\"4.5\"");
        let back: Fiat = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fiat("4.5"));
    }
}
