//! Checkout error types.

use cache::CacheError;
use common::ProductId;
use store::StoreError;
use thiserror::Error;

/// Every way a checkout can fail.
///
/// Each named business failure has its own variant; callers map them to
/// responses by matching, never by inspecting the message.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The user exceeded the per-minute checkout budget.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Another checkout for the same user holds the lock.
    #[error("Checkout in progress")]
    CheckoutInProgress,

    /// The cart does not exist, belongs to someone else, or is not open.
    #[error("Cart not found or not open")]
    CartInvalid,

    /// The cart has no items.
    #[error("Cart is empty")]
    CartEmpty,

    /// The coupon is unknown, outside its validity window, or exhausted.
    #[error("Invalid or expired coupon")]
    CouponInvalid,

    /// The user has already redeemed this coupon.
    #[error("Coupon already used")]
    CouponAlreadyUsed,

    /// Not enough free stock for a line at the resolved warehouse.
    #[error("Insufficient inventory for product {product_id}")]
    InsufficientInventory { product_id: ProductId },

    /// Relational store failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Cache or lock backend failure.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Broad classes of [`CheckoutError`], by how a client should react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any transactional work; retry later.
    Rejection,
    /// Business rules forbid the checkout; retrying unchanged will not help.
    Validation,
    /// Contended or exhausted resource; may succeed on retry.
    ResourceConflict,
    /// Backend failure; nothing was committed, safe to retry.
    Infrastructure,
}

impl CheckoutError {
    /// Returns the class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckoutError::RateLimited | CheckoutError::CheckoutInProgress => ErrorKind::Rejection,
            CheckoutError::CartInvalid
            | CheckoutError::CartEmpty
            | CheckoutError::CouponInvalid
            | CheckoutError::CouponAlreadyUsed => ErrorKind::Validation,
            CheckoutError::InsufficientInventory { .. } => ErrorKind::ResourceConflict,
            CheckoutError::Store(_) | CheckoutError::Cache(_) => ErrorKind::Infrastructure,
        }
    }

    /// Returns true if the whole transaction may be re-run as is.
    pub fn is_retryable_transaction(&self) -> bool {
        matches!(self, CheckoutError::Store(e) if e.is_retryable())
    }

    /// Short label used for the `outcome` metric.
    pub fn label(&self) -> &'static str {
        match self {
            CheckoutError::RateLimited => "rate_limited",
            CheckoutError::CheckoutInProgress => "lock_denied",
            CheckoutError::CartInvalid => "cart_invalid",
            CheckoutError::CartEmpty => "cart_empty",
            CheckoutError::CouponInvalid => "coupon_invalid",
            CheckoutError::CouponAlreadyUsed => "coupon_already_used",
            CheckoutError::InsufficientInventory { .. } => "insufficient_inventory",
            CheckoutError::Store(_) => "store_error",
            CheckoutError::Cache(_) => "cache_error",
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
