//! Pricing engine.
//!
//! Pure totals computation over a list of line amounts. Shipping is free
//! above the configured threshold, flat otherwise; tax is a fraction of
//! the subtotal rounded to two decimals. Discounts are applied at the
//! order level, not here.

use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Clone, Debug)]
pub struct PricingConfig {
    pub free_shipping_threshold: Decimal,
    pub flat_shipping_fee: Decimal,
    pub tax_rate: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub tax: Decimal,
    pub final_total: Decimal,
}

/// Computes subtotal, shipping fee, tax and final total for `(unit_price,
/// quantity)` lines.
pub fn compute_totals(lines: &[(Decimal, i32)], config: &PricingConfig) -> OrderTotals {
    let subtotal = lines
        .iter()
        .fold(Decimal::ZERO, |acc, (price, qty)| acc + *price * Decimal::from(*qty));
    let shipping_fee = if subtotal >= config.free_shipping_threshold {
        Decimal::ZERO
    } else {
        config.flat_shipping_fee
    };
    let tax = (subtotal * config.tax_rate).round_dp(2);
    OrderTotals {
        subtotal,
        shipping_fee,
        tax,
        final_total: subtotal + shipping_fee + tax,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PricingConfig {
        PricingConfig {
            free_shipping_threshold: Decimal::new(50, 0),
            flat_shipping_fee: Decimal::new(5, 0),
            tax_rate: Decimal::new(8, 2),
        }
    }

    #[test]
    fn test_free_shipping_above_threshold() {
        // 3 x 20.00 = 60.00, over the 50.00 threshold
        let totals = compute_totals(&[(Decimal::new(2000, 2), 3)], &config());
        assert_eq!(totals.subtotal, Decimal::new(6000, 2));
        assert_eq!(totals.shipping_fee, Decimal::ZERO);
        assert_eq!(totals.tax, Decimal::new(480, 2));
        assert_eq!(totals.final_total, Decimal::new(6480, 2));
    }

    #[test]
    fn test_flat_shipping_below_threshold() {
        // 3 x 10.00 = 30.00, under the threshold
        let totals = compute_totals(&[(Decimal::new(1000, 2), 3)], &config());
        assert_eq!(totals.subtotal, Decimal::new(3000, 2));
        assert_eq!(totals.shipping_fee, Decimal::new(5, 0));
        assert_eq!(totals.tax, Decimal::new(240, 2));
        assert_eq!(totals.final_total, Decimal::new(3740, 2));
    }

    #[test]
    fn test_free_shipping_at_exact_threshold() {
        let totals = compute_totals(&[(Decimal::new(50, 0), 1)], &config());
        assert_eq!(totals.shipping_fee, Decimal::ZERO);
    }

    #[test]
    fn test_tax_rounds_to_two_decimals() {
        // 3.33 * 0.08 = 0.2664 -> 0.27
        let totals = compute_totals(&[(Decimal::new(333, 2), 1)], &config());
        assert_eq!(totals.tax, Decimal::new(27, 2));
    }

    #[test]
    fn test_empty_lines() {
        let totals = compute_totals(&[], &config());
        assert_eq!(totals.subtotal, Decimal::ZERO);
        assert_eq!(totals.shipping_fee, Decimal::new(5, 0));
        assert_eq!(totals.tax, Decimal::ZERO);
        assert_eq!(totals.final_total, Decimal::new(5, 0));
    }

    #[test]
    fn test_multiple_lines_sum() {
        let lines = [(Decimal::new(1250, 2), 2), (Decimal::new(999, 2), 1)];
        let totals = compute_totals(&lines, &config());
        assert_eq!(totals.subtotal, Decimal::new(3499, 2));
    }
}
