//! Fixed-point money arithmetic in minor currency units
//!
//! All monetary values crossing this crate's boundary are integers in minor
//! currency units (cents, haléře, paise). Floating point never touches a
//! balance; `BigDecimal` is used only for ratio math with explicit rounding.

use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A monetary amount in minor currency units.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Create a money value from minor units (e.g. cents).
    pub const fn from_minor(minor_units: i64) -> Self {
        Self(minor_units)
    }

    /// Zero amount.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// The raw minor-unit value.
    pub const fn minor_units(&self) -> i64 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Checked addition; `None` on overflow.
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Checked subtraction; `None` on overflow.
    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// Absolute difference between two amounts, saturating at the maximum
    /// representable value.
    pub fn abs_diff(self, other: Money) -> Money {
        Money(i64::try_from(self.0.abs_diff(other.0)).unwrap_or(i64::MAX))
    }

    /// Exact decimal representation of the minor-unit value.
    pub fn to_decimal(self) -> BigDecimal {
        BigDecimal::from(self.0)
    }

    /// Round a decimal minor-unit value back to money, half-up.
    ///
    /// Returns `None` when the rounded value does not fit in `i64`.
    pub fn from_decimal_rounded(value: &BigDecimal) -> Option<Money> {
        value
            .with_scale_round(0, RoundingMode::HalfUp)
            .to_i64()
            .map(Money)
    }
}

impl fmt::Display for Money {
    /// Renders as major.minor assuming two decimal places, for logs and
    /// human-readable match reasons only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| {
            Money(acc.0.saturating_add(m.0))
        })
    }
}
