//! Fixed-point money amounts.
//!
//! Amounts are stored as signed micro-units (`i64`) so that allocation and
//! transfer math never touches floating point. One display unit (1 USDC)
//! is `1_000_000` micro-units.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{CoreError, Result};

/// Number of fractional digits carried by an [`Amount`]
pub const DECIMALS: u32 = 6;

/// Micro-units per display unit
pub const UNITS_PER_TOKEN: i64 = 1_000_000;

/// Signed fixed-point amount in micro-units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Self = Self(0);

    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub const fn micros(&self) -> i64 {
        self.0
    }

    /// Whole display units, e.g. `Amount::from_whole(5)` is 5 USDC.
    pub fn from_whole(units: i64) -> Result<Self> {
        units
            .checked_mul(UNITS_PER_TOKEN)
            .map(Self)
            .ok_or(CoreError::Overflow)
    }

    /// Convert a floating-point display amount.
    ///
    /// The value goes through its shortest round-trip decimal rendering and
    /// is then truncated to 6 decimals, so `1.23` becomes exactly
    /// `1_230_000`, `1.2345679` becomes `1_234_567` and `1.9999999996`
    /// stays below 2 at `1_999_999`.
    pub fn from_f64(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(CoreError::InvalidAmount(value.to_string()));
        }
        value.to_string().parse()
    }

    /// On-chain base units (`floor(amount × 10^6)`); `None` when negative.
    pub fn to_base_units(&self) -> Option<u64> {
        u64::try_from(self.0).ok()
    }

    pub fn from_base_units(units: u64) -> Result<Self> {
        i64::try_from(units).map(Self).map_err(|_| CoreError::Overflow)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn abs(&self) -> Self {
        Self(self.0.saturating_abs())
    }

    /// Integer division into `parts` equal shares, truncating toward zero.
    pub fn split_even(self, parts: u64) -> Option<Self> {
        let parts = i64::try_from(parts).ok()?;
        self.0.checked_div(parts).map(Self)
    }
}

impl FromStr for Amount {
    type Err = CoreError;

    /// Parse a decimal string. Digits past the 6th decimal are truncated.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || CoreError::InvalidAmount(s.to_string());

        let trimmed = s.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };

        let (whole, fraction) = body.split_once('.').unwrap_or((body, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(whole) || !all_digits(fraction) {
            return Err(invalid());
        }

        let whole_units: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| CoreError::Overflow)?
        };

        let kept = &fraction[..fraction.len().min(DECIMALS as usize)];
        let mut fraction_units: i64 = if kept.is_empty() { 0 } else { kept.parse().map_err(|_| invalid())? };
        for _ in kept.len()..DECIMALS as usize {
            fraction_units *= 10;
        }

        let micros = whole_units
            .checked_mul(UNITS_PER_TOKEN)
            .and_then(|w| w.checked_add(fraction_units))
            .ok_or(CoreError::Overflow)?;

        Ok(Self(if negative { -micros } else { micros }))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / UNITS_PER_TOKEN as u64;
        let fraction = abs % UNITS_PER_TOKEN as u64;
        if fraction == 0 {
            write!(f, "{}{}", sign, whole)
        } else {
            let digits = format!("{:06}", fraction);
            write!(f, "{}{}.{}", sign, whole, digits.trim_end_matches('0'))
        }
    }
}
