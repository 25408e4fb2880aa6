//! Relational store for the checkout engine.
//!
//! The engine talks to the store exclusively through [`CheckoutStore`] and
//! the [`CheckoutTransaction`] it hands out. Every `lock_*` method takes a
//! row-level lock that is held until the transaction commits or is dropped.
//!
//! Two implementations are provided:
//! - [`PostgresCheckoutStore`] backed by `sqlx` and `SELECT … FOR UPDATE`
//! - [`InMemoryCheckoutStore`] for tests, which stages writes and serializes
//!   transactions

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryCheckoutStore, InMemoryTransaction};
pub use postgres::{PostgresCheckoutStore, PostgresTransaction};
pub use records::{
    AuditEvent, CartLine, CartStatus, Coupon, CouponKind, InventoryLevel, NewOrder, NewOrderItem,
    OrderStatus,
};
pub use store::{CheckoutStore, CheckoutTransaction};
