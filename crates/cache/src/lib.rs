//! Cache and lock backend for the checkout engine.
//!
//! The engine needs four things from this backend, each behind its own trait:
//! - [`IdempotencyStore`]: payment reference → serialized checkout result
//! - [`RateLimiter`]: fixed-window counters per user
//! - [`CheckoutLock`]: short-TTL per-user mutual exclusion
//! - [`FanOutSink`]: summary invalidation, leaderboard and event stream
//!
//! [`RedisCache`] implements all of them on a single connection manager.
//! [`InMemoryCache`] does the same in process for tests.

pub mod backend;
pub mod error;
pub mod keys;
pub mod memory;
pub mod redis_cache;

pub use backend::{
    CacheBackend, CheckoutLock, FanOutSink, IdempotencyStore, LockToken, OrderStreamEntry,
    RateLimiter,
};
pub use error::{CacheError, Result};
pub use memory::InMemoryCache;
pub use redis_cache::RedisCache;
