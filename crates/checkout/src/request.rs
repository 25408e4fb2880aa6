//! Checkout input and output.

use common::{CartId, CouponCode, OrderId, ProductId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use store::OrderStatus;

/// One item as sent by the client.
///
/// Informational only: the authoritative item list is the cart's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub product_id: ProductId,
    pub qty: u32,
}

/// A request to turn a cart into an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub user_id: UserId,
    pub cart_id: CartId,
    pub items: Vec<CheckoutItem>,
    pub coupon: Option<CouponCode>,
    /// Client-chosen idempotency key.
    pub payment_ref: String,
}

impl CheckoutRequest {
    pub fn new(user_id: UserId, cart_id: CartId, payment_ref: impl Into<String>) -> Self {
        Self {
            user_id,
            cart_id,
            items: Vec::new(),
            coupon: None,
            payment_ref: payment_ref.into(),
        }
    }

    pub fn with_coupon(mut self, code: impl Into<CouponCode>) -> Self {
        self.coupon = Some(code.into());
        self
    }

    pub fn with_item(mut self, product_id: ProductId, qty: u32) -> Self {
        self.items.push(CheckoutItem { product_id, qty });
        self
    }
}

/// The outcome of a successful checkout.
///
/// This is also what the idempotency store replays, so its serialized form
/// keeps the total as an exact decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutResult {
    pub order_id: OrderId,
    pub status: OrderStatus,
    #[serde(with = "rust_decimal::serde::str")]
    pub total: Decimal,
}
