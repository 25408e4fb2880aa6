//! Shared identifier types used across the checkout workspace.

mod types;

pub use types::{CartId, CouponCode, OrderId, ProductId, UserId, WarehouseId};
