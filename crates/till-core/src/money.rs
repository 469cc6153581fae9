//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Exact Decimals?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  With binary floats:                                                    │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌                                  │
//! │                                                                         │
//! │  With per-line rounded tax:                                             │
//! │    3 lines × round(0.825) = 2.49, round(3 × 0.825) = 2.48  ❌ drift     │
//! │                                                                         │
//! │  OUR SOLUTION: exact decimals, no rounding until display                │
//! │    subtotal = Σ qty × unit_price          (exact)                       │
//! │    tax      = subtotal × rate             (exact)                       │
//! │    total    = subtotal + tax              (exact)                       │
//! │    display  = round(total, 2)             (only here)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use till_core::money::Money;
//!
//! let price = Money::from_cents(250); // 2.50
//! let line = price.multiply_quantity(3);
//! assert_eq!(line, Money::from_cents(750));
//! assert_eq!(line.to_string(), "7.50");
//! ```

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub};
use ts_rs::TS;

use crate::types::TaxRate;

/// Decimal places shown to a customer.
pub const DISPLAY_SCALE: u32 = 2;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary amount in the currency's major unit.
///
/// Serialized as a decimal string (`"2.50"`) so no precision is lost on the
/// way through JSON documents.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Money(#[ts(type = "string")] Decimal);

impl Money {
    /// Wraps an exact decimal amount.
    #[inline]
    pub const fn new(amount: Decimal) -> Self {
        Money(amount)
    }

    /// Creates a Money value from cents (the smallest currency unit).
    ///
    /// ```rust
    /// use till_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(1099).to_string(), "10.99");
    /// ```
    #[inline]
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::new(cents, 2))
    }

    /// Returns the exact, unrounded amount.
    #[inline]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    /// Checks if the value is zero.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Number of significant decimal places, ignoring trailing zeros.
    ///
    /// `2.50` has one, `2.505` has three.
    pub fn decimal_places(&self) -> u32 {
        self.0.normalize().scale()
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * Decimal::from(qty))
    }

    /// Calculates tax at `rate` without rounding.
    ///
    /// ```rust
    /// use till_core::money::Money;
    /// use till_core::types::TaxRate;
    ///
    /// let tax = Money::from_cents(750).calculate_tax(TaxRate::from_bps(1900));
    /// assert_eq!(tax.amount().normalize().to_string(), "1.425");
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        Money(self.0 * rate.as_decimal())
    }

    /// Divides evenly into `parts`, exact to the decimal precision limit.
    ///
    /// Returns zero when `parts` is zero.
    pub fn split(&self, parts: usize) -> Money {
        if parts == 0 {
            return Money::zero();
        }
        Money(self.0 / Decimal::from(parts as u64))
    }

    /// Rounds to display precision (2 places, half away from zero).
    ///
    /// Only for presentation; never feed the result back into totals.
    pub fn rounded(&self) -> Money {
        let mut value = self
            .0
            .round_dp_with_strategy(DISPLAY_SCALE, RoundingStrategy::MidpointAwayFromZero);
        value.rescale(DISPLAY_SCALE);
        Money(value)
    }

    /// Formats with a trailing ISO currency code, e.g. `"8.93 EUR"`.
    pub fn format_with(&self, currency_code: &str) -> String {
        format!("{} {}", self, currency_code)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display always shows exactly two decimal places.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rounded().0)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Money(amount)
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        self.multiply_quantity(qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
