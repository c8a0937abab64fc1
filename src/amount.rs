use serde::{Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::str::FromStr;
use thiserror::Error;

/// Fixed-point decimal with 4 decimal places, stored as a scaled integer.
///
/// Bonus points are accumulated in this representation so that long journals
/// do not drift; rounding to cents only happens when a result leaves the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Amount(i64);

/// Error returned when a textual amount cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid amount '{0}'")]
pub struct ParseAmountError(String);

/// Error returned when amount arithmetic leaves the representable range.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("amount arithmetic overflowed")]
pub struct AmountOverflow;

impl Amount {
    const SCALE: i64 = 10_000;
    const DIGITS: usize = 4;

    pub const ZERO: Amount = Amount(0);

    /// Largest magnitude accepted from textual or float input (10^9 points).
    ///
    /// Over 900,000 maximal amounts sum within an `i64`. Ledger arithmetic is
    /// still checked, see [`Amount::checked_add`].
    pub const MAX_INPUT: Amount = Amount(1_000_000_000 * Self::SCALE);

    /// `None` for non-finite values and magnitudes above [`Amount::MAX_INPUT`].
    pub fn from_float(value: f64) -> Option<Self> {
        let scaled = (value * Self::SCALE as f64).round();
        if !scaled.is_finite() || scaled.abs() > Self::MAX_INPUT.0 as f64 {
            return None;
        }
        Some(Amount(scaled as i64))
    }

    pub fn from_scaled(value: i64) -> Self {
        Amount(value)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self, AmountOverflow> {
        self.0.checked_add(rhs.0).map(Amount).ok_or(AmountOverflow)
    }

    pub fn checked_sub(self, rhs: Self) -> Result<Self, AmountOverflow> {
        self.0.checked_sub(rhs.0).map(Amount).ok_or(AmountOverflow)
    }

    /// Round half away from zero to 2 decimal places.
    pub fn round_cents(self) -> Self {
        self.round_to(2)
    }

    fn round_to(self, digits: usize) -> Self {
        if digits >= Self::DIGITS {
            return self;
        }
        let step = 10_i64.pow((Self::DIGITS - digits) as u32);
        let rem = self.0 % step;
        let mut rounded = self.0 - rem;
        if rem.abs() * 2 >= step {
            rounded = rounded.saturating_add(step * self.0.signum());
        }
        Amount(rounded)
    }
}

impl FromStr for Amount {
    type Err = ParseAmountError;

    /// Parse a plain decimal (`"12.5"`, `"-0.25"`, `".5"`) exactly. Anything else
    /// a float parser accepts (exponent notation) goes through `from_float`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseAmountError(s.to_string());
        let trimmed = s.trim();

        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));

        let plain = !(whole.is_empty() && frac.is_empty())
            && whole.bytes().all(|b| b.is_ascii_digit())
            && frac.bytes().all(|b| b.is_ascii_digit());
        if !plain {
            let value: f64 = trimmed.parse().map_err(|_| err())?;
            return Self::from_float(value).ok_or_else(err);
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| err())?
        };
        let padded: String = frac
            .chars()
            .chain(std::iter::repeat('0'))
            .take(Self::DIGITS)
            .collect();
        let mut fraction: i64 = padded.parse().map_err(|_| err())?;
        if frac.as_bytes().get(Self::DIGITS).is_some_and(|d| *d >= b'5') {
            fraction += 1;
        }

        let scaled = whole
            .checked_mul(Self::SCALE)
            .and_then(|v| v.checked_add(fraction))
            .filter(|v| *v <= Self::MAX_INPUT.0)
            .ok_or_else(err)?;
        Ok(Amount(if negative { -scaled } else { scaled }))
    }
}

impl fmt::Display for Amount {
    /// Four fractional digits by default; `{:.2}` rounds to the requested precision.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = f.precision().unwrap_or(Self::DIGITS).min(Self::DIGITS);
        let rounded = self.round_to(digits);
        let sign = if rounded.0 < 0 { "-" } else { "" };
        let abs = rounded.0.unsigned_abs();
        let whole = abs / Self::SCALE as u64;
        if digits == 0 {
            return write!(f, "{sign}{whole}");
        }
        let frac = (abs % Self::SCALE as u64) / 10_u64.pow((Self::DIGITS - digits) as u32);
        write!(f, "{sign}{whole}.{frac:0width$}", width = digits)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

impl std::ops::Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Amount(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Amount(self.0 - rhs.0)
    }
}

impl std::ops::SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl std::ops::Neg for Amount {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Amount(-self.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| acc + a)
    }
}
