//! Checkout pricing: subtotal, flat shipping, 8% tax, and the minor-unit
//! conversion the payment gateway expects.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

fn shipping_fee() -> Decimal {
    Decimal::new(1000, 2) // 10.00
}

fn tax_rate() -> Decimal {
    Decimal::new(8, 2) // 0.08
}

#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Prices a set of (unit price, quantity) lines.
pub fn quote(lines: impl IntoIterator<Item = (Decimal, i32)>) -> Quote {
    let subtotal = lines
        .into_iter()
        .fold(Decimal::ZERO, |acc, (price, qty)| acc + price * Decimal::from(qty));
    let shipping = shipping_fee();
    let tax = subtotal * tax_rate();
    Quote { subtotal, shipping, tax, total: subtotal + shipping + tax }
}

/// Converts a major-unit amount to the gateway's smallest currency unit,
/// rounding halves away from zero.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::from(100))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}
