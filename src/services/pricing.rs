//! Pricing and shipping resolution.
//!
//! All arithmetic happens in integer minor units (cents); `Decimal` appears
//! only at the formatting boundary so floating-point drift can never touch a
//! charged amount.

use crate::config::AppConfig;
use crate::services::cart::{ValidatedCart, ValidatedLine};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Shipping policy constants, sourced from configuration.
#[derive(Debug, Clone, Copy)]
pub struct ShippingPolicy {
    pub free_threshold_cents: i64,
    pub flat_rate_cents: i64,
}

impl ShippingPolicy {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            free_threshold_cents: cfg.free_shipping_threshold_cents,
            flat_rate_cents: cfg.flat_shipping_rate_cents,
        }
    }

    /// Flat rate below the threshold, free at or above it.
    pub fn shipping_cents(&self, subtotal_cents: i64) -> i64 {
        if subtotal_cents >= self.free_threshold_cents {
            0
        } else {
            self.flat_rate_cents
        }
    }
}

/// One priced line: the validated line plus its minor-unit amounts.
#[derive(Debug, Clone)]
pub struct PricedLine {
    pub line: ValidatedLine,
    pub unit_cents: i64,
    pub total_cents: i64,
}

/// A fully priced cart.
#[derive(Debug, Clone)]
pub struct PricedCart {
    pub lines: Vec<PricedLine>,
    pub subtotal_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
}

/// Converts a catalog price to cents, rounding the midpoint away from zero
/// at two decimal places.
pub fn to_cents(price: Decimal) -> i64 {
    (price.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        * Decimal::ONE_HUNDRED)
        .to_i64()
        .unwrap_or(0)
}

/// Converts a minor-unit amount back to a decimal currency value.
pub fn cents_to_decimal(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Prices a validated cart under the given shipping policy.
pub fn price_cart(cart: &ValidatedCart, policy: &ShippingPolicy) -> PricedCart {
    let lines: Vec<PricedLine> = cart
        .lines
        .iter()
        .map(|line| {
            let unit_cents = to_cents(line.unit_price);
            PricedLine {
                unit_cents,
                total_cents: unit_cents * i64::from(line.quantity),
                line: line.clone(),
            }
        })
        .collect();

    let subtotal_cents: i64 = lines.iter().map(|l| l.total_cents).sum();
    let shipping_cents = policy.shipping_cents(subtotal_cents);

    PricedCart {
        lines,
        subtotal_cents,
        shipping_cents,
        total_cents: subtotal_cents + shipping_cents,
    }
}
