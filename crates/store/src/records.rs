//! Row types exchanged between the checkout engine and the store.

use chrono::{DateTime, Utc};
use common::{CartId, CouponCode, OrderId, ProductId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Lifecycle of a cart. A cart only ever moves from `Open` to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartStatus {
    Open,
    Closed,
}

impl CartStatus {
    /// Returns the column value for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            CartStatus::Open => "open",
            CartStatus::Closed => "closed",
        }
    }
}

impl std::str::FromStr for CartStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(CartStatus::Open),
            "closed" => Ok(CartStatus::Closed),
            other => Err(StoreError::corrupt("carts", format!("status '{other}'"))),
        }
    }
}

impl std::fmt::Display for CartStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cart item joined with the product's current status.
///
/// `unit_price` is the snapshot taken when the item was put in the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub product_id: ProductId,
    pub qty: u32,
    pub unit_price: Decimal,
    pub product_status: String,
}

impl CartLine {
    /// `qty × unit_price`.
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.qty)
    }
}

/// How a coupon's `value` is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouponKind {
    /// `value` is a percentage of the subtotal.
    Percentage,
    /// `value` is a flat amount.
    Fixed,
}

impl CouponKind {
    /// Returns the column value for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            CouponKind::Percentage => "percentage",
            CouponKind::Fixed => "fixed",
        }
    }
}

impl std::str::FromStr for CouponKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(CouponKind::Percentage),
            "fixed" => Ok(CouponKind::Fixed),
            other => Err(StoreError::corrupt("coupons", format!("type '{other}'"))),
        }
    }
}

/// A coupon row as read under lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coupon {
    pub code: CouponCode,
    pub kind: CouponKind,
    pub value: Decimal,
    /// `None` means unlimited.
    pub max_uses: Option<u32>,
    pub used_count: u32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl Coupon {
    /// Returns true if `now` falls inside `[starts_at, ends_at]`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now <= self.ends_at
    }

    /// Returns true if the global usage cap has been reached.
    pub fn is_exhausted(&self) -> bool {
        self.max_uses
            .is_some_and(|max_uses| self.used_count >= max_uses)
    }
}

/// Capacity of one (product, warehouse) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InventoryLevel {
    pub available_qty: u32,
    pub reserved_qty: u32,
}

impl InventoryLevel {
    pub fn new(available_qty: u32, reserved_qty: u32) -> Self {
        Self {
            available_qty,
            reserved_qty,
        }
    }

    /// Units that can still be reserved.
    pub fn free_qty(&self) -> u32 {
        self.available_qty.saturating_sub(self.reserved_qty)
    }

    /// Returns true if `qty` more units fit without exceeding `available_qty`.
    pub fn can_reserve(&self, qty: u32) -> bool {
        self.free_qty() >= qty
    }
}

/// Status of a freshly created order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An order about to be inserted, together with its items.
///
/// All monetary fields are final; they are never recomputed after insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub id: OrderId,
    pub user_id: UserId,
    pub cart_id: CartId,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    pub items: Vec<NewOrderItem>,
    pub created_at: DateTime<Utc>,
}

/// An order item, copied verbatim from the cart line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub qty: u32,
    pub unit_price: Decimal,
}

impl From<&CartLine> for NewOrderItem {
    fn from(line: &CartLine) -> Self {
        Self {
            product_id: line.product_id,
            qty: line.qty,
            unit_price: line.unit_price,
        }
    }
}

/// A row of the audit log written in the same transaction as the order.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub user_id: UserId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
