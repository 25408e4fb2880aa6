//! Checkout transaction engine.
//!
//! [`CheckoutEngine`] turns an open cart into a pending order. It deduplicates
//! requests by payment reference, rate limits and serializes them per user,
//! then validates the cart, redeems an optional coupon, reserves inventory and
//! persists the order in a single store transaction. Cache-side effects of a
//! committed order are applied afterwards on a best-effort basis.

pub mod clock;
pub mod coupon;
pub mod engine;
pub mod error;
pub mod fanout;
pub mod inventory;
pub mod pricing;
pub mod request;
pub mod settings;
pub mod warehouse;

pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::CheckoutEngine;
pub use error::{CheckoutError, ErrorKind, Result};
pub use pricing::{PriceBreakdown, PricingPolicy};
pub use request::{CheckoutItem, CheckoutRequest, CheckoutResult};
pub use settings::CheckoutSettings;
pub use warehouse::WarehouseDirectory;
