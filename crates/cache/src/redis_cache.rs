//! Redis-backed implementation of every cache trait.
//!
//! All operations go through one [`ConnectionManager`], which multiplexes
//! commands and reconnects transparently.

use std::time::Duration;

use async_trait::async_trait;
use common::UserId;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use crate::backend::{
    CheckoutLock, FanOutSink, IdempotencyStore, LockToken, OrderStreamEntry, RateLimiter,
};
use crate::{Result, keys};

/// INCR with an expiry set only by the write that creates the key.
const INCREMENT_WITH_FIRST_TTL: &str = r#"
    local count = redis.call('INCR', KEYS[1])
    if count == 1 then
        redis.call('EXPIRE', KEYS[1], ARGV[1])
    end
    return count
"#;

/// DEL only if the key still holds the caller's token.
const RELEASE_IF_HOLDER: &str = r#"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('DEL', KEYS[1])
    end
    return 0
"#;

/// Keys requested per SCAN round trip.
const SCAN_PAGE_SIZE: usize = 100;

/// Redis cache shared by all checkout requests.
#[derive(Clone)]
pub struct RedisCache {
    conn_manager: ConnectionManager,
}

impl RedisCache {
    /// Connects to Redis at `redis_url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let conn_manager = ConnectionManager::new(client).await.inspect_err(|e| {
            tracing::error!(error = %e, "failed to connect to redis");
        })?;
        tracing::info!("connected to redis");
        Ok(Self { conn_manager })
    }

    /// Sends a PING; used by the health endpoint and at startup.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl IdempotencyStore for RedisCache {
    async fn get(&self, payment_ref: &str) -> Result<Option<String>> {
        let mut conn = self.conn_manager.clone();
        let cached: Option<String> = conn.get(keys::idempotency(payment_ref)).await?;
        Ok(cached)
    }

    async fn put(&self, payment_ref: &str, payload: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .set_ex(keys::idempotency(payment_ref), payload, ttl.as_secs())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RateLimiter for RedisCache {
    async fn increment(&self, user_id: UserId, window: i64, expiry: Duration) -> Result<u64> {
        let mut conn = self.conn_manager.clone();
        let count: u64 = redis::Script::new(INCREMENT_WITH_FIRST_TTL)
            .key(keys::rate_limit(user_id, window))
            .arg(expiry.as_secs())
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl CheckoutLock for RedisCache {
    async fn try_acquire(&self, user_id: UserId, ttl: Duration) -> Result<Option<LockToken>> {
        let mut conn = self.conn_manager.clone();
        let token = LockToken::generate();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);

        let reply: Option<String> = redis::cmd("SET")
            .arg(keys::checkout_lock(user_id))
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;

        Ok(reply.map(|_| token))
    }

    async fn release(&self, user_id: UserId, token: &LockToken) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let deleted: i64 = redis::Script::new(RELEASE_IF_HOLDER)
            .key(keys::checkout_lock(user_id))
            .arg(token.as_str())
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }
}

#[async_trait]
impl FanOutSink for RedisCache {
    async fn invalidate_user_summaries(&self, user_id: UserId) -> Result<u64> {
        let mut conn = self.conn_manager.clone();
        let pattern = keys::user_summary_pattern(user_id);

        // Explicit cursor so a failed page surfaces as an error instead of
        // ending the scan early.
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;
        loop {
            let (next, page): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_PAGE_SIZE)
                .query_async(&mut conn)
                .await?;
            if !page.is_empty() {
                let removed: u64 = conn.del(&page).await?;
                deleted += removed;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        tracing::debug!(%user_id, deleted, "invalidated user summaries");
        Ok(deleted)
    }

    async fn add_to_leaderboard(&self, user_id: UserId, amount: f64) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: f64 = conn
            .zincr(keys::LEADERBOARD, user_id.to_string(), amount)
            .await?;
        Ok(())
    }

    async fn publish_order_event(&self, entry: &OrderStreamEntry) -> Result<String> {
        let mut conn = self.conn_manager.clone();
        let fields = [
            ("userId", entry.user_id.to_string()),
            ("orderId", entry.order_id.to_string()),
            ("total", entry.total.clone()),
        ];
        let id: String = conn.xadd(keys::ORDER_STREAM, "*", &fields[..]).await?;
        Ok(id)
    }
}
