use std::time::Duration;

use async_trait::async_trait;
use common::{OrderId, UserId};

use crate::Result;

/// Maps a client payment reference to a previously produced checkout result.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Returns the serialized result stored for `payment_ref`, if any.
    async fn get(&self, payment_ref: &str) -> Result<Option<String>>;

    /// Stores `payload` for `payment_ref`, expiring after `ttl`.
    async fn put(&self, payment_ref: &str, payload: &str, ttl: Duration) -> Result<()>;
}

/// Fixed-window request counter.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Atomically increments the counter for `(user_id, window)` and returns
    /// the new count. The first increment in a window sets `expiry` on it.
    async fn increment(&self, user_id: UserId, window: i64, expiry: Duration) -> Result<u64>;
}

/// Opaque value identifying the holder of a [`CheckoutLock`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    /// Generates a fresh random token.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Advisory per-user lock with passive expiry.
#[async_trait]
pub trait CheckoutLock: Send + Sync {
    /// Atomically takes the lock if nobody holds it.
    ///
    /// Returns `None` without waiting when the lock is already held.
    async fn try_acquire(&self, user_id: UserId, ttl: Duration) -> Result<Option<LockToken>>;

    /// Releases the lock if it is still held by `token`.
    ///
    /// Returns false if the lock had already expired or changed hands.
    async fn release(&self, user_id: UserId, token: &LockToken) -> Result<bool>;
}

/// One entry appended to the order event stream.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderStreamEntry {
    pub user_id: UserId,
    pub order_id: OrderId,
    /// Decimal rendering of the order total.
    pub total: String,
}

/// Best-effort side effects of a committed checkout.
#[async_trait]
pub trait FanOutSink: Send + Sync {
    /// Deletes every cached overview summary of the user; returns how many.
    async fn invalidate_user_summaries(&self, user_id: UserId) -> Result<u64>;

    /// Adds `amount` to the user's leaderboard score.
    async fn add_to_leaderboard(&self, user_id: UserId, amount: f64) -> Result<()>;

    /// Appends an entry to the order event stream and returns its ID.
    async fn publish_order_event(&self, entry: &OrderStreamEntry) -> Result<String>;
}

/// Everything the checkout engine needs from the cache tier.
///
/// Blanket-implemented, so any type providing the four capabilities
/// qualifies.
pub trait CacheBackend: IdempotencyStore + RateLimiter + CheckoutLock + FanOutSink {}

impl<T> CacheBackend for T where T: IdempotencyStore + RateLimiter + CheckoutLock + FanOutSink {}
