//! Money type for market prices and budgets

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// How a scaled amount is brought back to whole base units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Round to nearest, halves away from zero
    Nearest,
    /// Truncate toward zero
    Floor,
}

/// Money represents an amount in whole base currency units
///
/// Prices and budgets are integers end to end. Multipliers are applied in
/// decimal arithmetic and rounded exactly once.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(pub i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Create an amount from base units
    pub const fn new(units: i64) -> Self {
        Self(units)
    }

    /// Get the value in base units
    pub fn units(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Subtraction that returns `None` instead of going below zero
    pub fn checked_debit(self, amount: Money) -> Option<Money> {
        let remaining = self.0.checked_sub(amount.0)?;
        (remaining >= 0).then_some(Money(remaining))
    }

    pub fn saturating_add(self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }

    /// Multiply by a decimal factor and round back to base units.
    ///
    /// Saturates at `i64::MAX` when the product does not fit.
    pub fn scale(self, factor: Decimal, rounding: Rounding) -> Money {
        let product = Decimal::from(self.0) * factor;
        let rounded = match rounding {
            Rounding::Nearest => {
                product.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            }
            Rounding::Floor => product.trunc(),
        };
        Money(rounded.to_i64().unwrap_or(i64::MAX))
    }

    /// Value in millions, for display
    pub fn in_millions(self) -> Decimal {
        Decimal::from(self.0) / Decimal::from(1_000_000)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, amount| acc + amount)
    }
}

impl From<i64> for Money {
    fn from(units: i64) -> Self {
        Money(units)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}M", self.in_millions())
    }
}
