//! Type-safe price representation using decimal arithmetic.
//!
//! The catalog is priced in Brazilian reais. Amounts are stored as
//! `numeric` columns and arrive as JSON numbers, so they are (de)serialized
//! through `rust_decimal`'s float adapter rather than as strings.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, Mul};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A non-negative amount in reais.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(#[serde(with = "rust_decimal::serde::float")] Decimal);

impl Price {
    /// Zero reais.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a price from a decimal amount, rounded to centavos.
    #[must_use]
    pub fn new(amount: Decimal) -> Self {
        Self(amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Create a price from an integer number of centavos.
    #[must_use]
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Amount as a float, for spreadsheet cells.
    #[must_use]
    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or_default()
    }

    /// Line total for `quantity` units.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        self * quantity
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Mul<u32> for Price {
    type Output = Self;

    fn mul(self, rhs: u32) -> Self::Output {
        Self(self.0 * Decimal::from(rhs))
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_brl(self.0))
    }
}

/// Format an amount the way the storefront shows it: `R$ 1.234,56`.
#[must_use]
pub fn format_brl(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (integer, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, digit) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    if negative {
        format!("-R$ {grouped},{cents}")
    } else {
        format!("R$ {grouped},{cents}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_groups_thousands() {
        assert_eq!(Price::from_cents(123_456).to_string(), "R$ 1.234,56");
        assert_eq!(Price::from_cents(99).to_string(), "R$ 0,99");
        assert_eq!(Price::from_cents(100_000_000).to_string(), "R$ 1.000.000,00");
    }

    #[test]
    fn test_new_rounds_to_centavos() {
        let price = Price::new(Decimal::new(10_005, 3));
        assert_eq!(price, Price::from_cents(1001));
    }

    #[test]
    fn test_line_totals_sum() {
        let total: Price = [Price::from_cents(250).times(3), Price::from_cents(1000)]
            .into_iter()
            .sum();
        assert_eq!(total, Price::from_cents(1750));
    }

    #[test]
    fn test_deserializes_json_number() {
        let price: Price = serde_json::from_str("19.9").unwrap();
        assert_eq!(price, Price::from_cents(1990));
        assert_eq!(serde_json::to_string(&price).unwrap(), "19.9");
    }
}
