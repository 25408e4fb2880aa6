//! Engine tunables.

use std::time::Duration;

use crate::pricing::PricingPolicy;
use crate::warehouse::WarehouseDirectory;

/// Length of one rate-limit window, in seconds.
pub const RATE_WINDOW_SECS: i64 = 60;

/// Tunables of [`CheckoutEngine`](crate::CheckoutEngine).
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// How long a successful result is replayed for its payment reference.
    pub idempotency_ttl: Duration,
    /// Checkout attempts allowed per user per wall-clock minute.
    pub rate_limit: u64,
    /// Expiry set on a rate-limit counter by its first increment.
    pub rate_window_expiry: Duration,
    /// Expiry of the per-user checkout lock.
    pub lock_ttl: Duration,
    /// Extra attempts after a deadlock or serialization failure.
    pub transaction_retries: u32,
    pub pricing: PricingPolicy,
    pub warehouses: WarehouseDirectory,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            idempotency_ttl: Duration::from_secs(600),
            rate_limit: 10,
            rate_window_expiry: Duration::from_secs(90),
            lock_ttl: Duration::from_secs(5),
            transaction_retries: 2,
            pricing: PricingPolicy::default(),
            warehouses: WarehouseDirectory::default(),
        }
    }
}

/// Index of the window containing `timestamp` (seconds since the Unix epoch).
pub fn rate_window(timestamp: i64) -> i64 {
    timestamp.div_euclid(RATE_WINDOW_SECS)
}
