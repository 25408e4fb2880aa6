//! Order pricing.
//!
//! All arithmetic is exact decimal. Tax is the only rounded quantity: it is
//! rounded once, to cents, half away from zero.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use store::{CartLine, CouponKind};

/// Tax and shipping parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Fraction of the discounted subtotal charged as tax (0.08 = 8%).
    pub tax_rate: Decimal,
    /// Shipping is free when the subtotal is strictly above this amount.
    pub free_shipping_over: Decimal,
    /// Shipping charged for the first cart line.
    pub base_shipping: Decimal,
    /// Shipping added for every cart line after the first.
    pub per_extra_line_shipping: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(8, 2),
            free_shipping_over: Decimal::new(100, 0),
            base_shipping: Decimal::new(599, 2),
            per_extra_line_shipping: Decimal::new(99, 2),
        }
    }
}

/// The monetary fields of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

/// `Σ qty × unit_price` over the cart snapshot.
pub fn subtotal(lines: &[CartLine]) -> Decimal {
    lines.iter().map(CartLine::line_total).sum()
}

/// Discount granted by a coupon of `kind` and `value` on `subtotal`.
///
/// Percentage coupons take `value` percent of the subtotal; fixed coupons
/// take `value` as is, even when it exceeds the subtotal.
pub fn discount(kind: CouponKind, value: Decimal, subtotal: Decimal) -> Decimal {
    match kind {
        CouponKind::Percentage => subtotal * value / Decimal::ONE_HUNDRED,
        CouponKind::Fixed => value,
    }
}

impl PricingPolicy {
    /// Tax on `subtotal − discount`, rounded to cents.
    ///
    /// The taxable base is not floored at zero.
    pub fn tax(&self, subtotal: Decimal, discount: Decimal) -> Decimal {
        ((subtotal - discount) * self.tax_rate)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Shipping for a cart of `line_count` distinct lines.
    pub fn shipping(&self, subtotal: Decimal, line_count: usize) -> Decimal {
        if subtotal > self.free_shipping_over {
            return Decimal::ZERO;
        }
        let extra_lines = Decimal::from(line_count.saturating_sub(1));
        self.base_shipping + self.per_extra_line_shipping * extra_lines
    }

    /// Prices a cart given the discount already granted to it.
    pub fn price(&self, lines: &[CartLine], discount: Decimal) -> PriceBreakdown {
        let subtotal = subtotal(lines);
        let tax = self.tax(subtotal, discount);
        let shipping = self.shipping(subtotal, lines.len());
        let total = (subtotal - discount + tax + shipping).max(Decimal::ZERO);

        PriceBreakdown {
            subtotal,
            discount,
            tax,
            shipping,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use common::ProductId;

    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn line(qty: u32, price: &str) -> CartLine {
        CartLine {
            product_id: ProductId::new(),
            qty,
            unit_price: dec(price),
            product_status: "active".to_string(),
        }
    }

    fn two_line_cart() -> Vec<CartLine> {
        vec![line(2, "20.00"), line(1, "15.00")]
    }

    #[test]
    fn prices_cart_without_coupon() {
        let p = PricingPolicy::default().price(&two_line_cart(), Decimal::ZERO);
        assert_eq!(p.subtotal, dec("55.00"));
        assert_eq!(p.shipping, dec("6.98"));
        assert_eq!(p.tax, dec("4.40"));
        assert_eq!(p.total, dec("66.38"));
    }

    #[test]
    fn prices_cart_with_percentage_coupon() {
        let lines = two_line_cart();
        let d = discount(CouponKind::Percentage, dec("10"), subtotal(&lines));
        assert_eq!(d, dec("5.50"));

        let p = PricingPolicy::default().price(&lines, d);
        assert_eq!(p.tax, dec("3.96"));
        assert_eq!(p.total, dec("60.44"));
    }

    #[test]
    fn fixed_discount_is_taken_verbatim() {
        assert_eq!(
            discount(CouponKind::Fixed, dec("7.25"), dec("55.00")),
            dec("7.25")
        );
    }

    #[test]
    fn tax_rounds_half_away_from_zero() {
        let policy = PricingPolicy::default();
        // 0.0625 × 0.08 = 0.005
        assert_eq!(policy.tax(dec("0.0625"), Decimal::ZERO), dec("0.01"));
        assert_eq!(policy.tax(dec("10.06"), Decimal::ZERO), dec("0.80"));
    }

    #[test]
    fn shipping_is_free_only_strictly_above_threshold() {
        let policy = PricingPolicy::default();
        assert_eq!(policy.shipping(dec("100.00"), 1), dec("5.99"));
        assert_eq!(policy.shipping(dec("100.01"), 3), Decimal::ZERO);
        assert_eq!(policy.shipping(dec("30.00"), 4), dec("8.96"));
    }

    #[test]
    fn oversized_fixed_discount_floors_total_but_not_tax() {
        let lines = vec![line(1, "5.00")];
        let p = PricingPolicy::default().price(&lines, dec("20.00"));
        assert_eq!(p.tax, dec("-1.20"));
        assert_eq!(p.total, Decimal::ZERO);
    }

    #[test]
    fn total_identity_holds() {
        let lines = vec![line(3, "19.99"), line(1, "0.35"), line(7, "4.10")];
        let policy = PricingPolicy::default();
        let d = discount(CouponKind::Percentage, dec("15"), subtotal(&lines));
        let p = policy.price(&lines, d);
        assert_eq!(
            p.total,
            (p.subtotal - p.discount + p.tax + p.shipping).max(Decimal::ZERO)
        );
    }
}
