use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::UserId;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::backend::{
    CheckoutLock, FanOutSink, IdempotencyStore, LockToken, OrderStreamEntry, RateLimiter,
};
use crate::{CacheError, Result, keys};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

#[derive(Debug, Default)]
struct InMemoryCacheState {
    entries: HashMap<String, Entry>,
    leaderboard: HashMap<UserId, f64>,
    stream: Vec<OrderStreamEntry>,
    unavailable: bool,
}

impl InMemoryCacheState {
    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            return Err(CacheError::Unavailable("in-memory cache marked down".to_string()));
        }
        Ok(())
    }

    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| !e.is_live(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }
}

/// In-memory cache for testing.
///
/// Expiry follows `tokio::time`, so tests can pause and advance the clock.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    state: Arc<Mutex<InMemoryCacheState>>,
}

impl InMemoryCache {
    /// Creates a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an outage: every call fails until set back to false.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    /// Writes a raw key, as another component (e.g. the overview read path) would.
    pub async fn set_raw(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Option<Duration>,
    ) {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.state.lock().await.entries.insert(
            key.into(),
            Entry {
                value: value.into(),
                expires_at,
            },
        );
    }

    /// Reads a raw key if it exists and has not expired.
    pub async fn get_raw(&self, key: &str) -> Option<String> {
        self.state.lock().await.live(key).map(|e| e.value.clone())
    }

    /// Returns the user's leaderboard score.
    pub async fn leaderboard_score(&self, user_id: UserId) -> Option<f64> {
        self.state.lock().await.leaderboard.get(&user_id).copied()
    }

    /// Returns every entry appended to the order stream.
    pub async fn stream_entries(&self) -> Vec<OrderStreamEntry> {
        self.state.lock().await.stream.clone()
    }
}

/// Supports the only glob shape the engine uses: a literal prefix followed by `*`.
fn matches_prefix_glob(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryCache {
    async fn get(&self, payment_ref: &str) -> Result<Option<String>> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        Ok(state
            .live(&keys::idempotency(payment_ref))
            .map(|e| e.value.clone()))
    }

    async fn put(&self, payment_ref: &str, payload: &str, ttl: Duration) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        state.entries.insert(
            keys::idempotency(payment_ref),
            Entry {
                value: payload.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl RateLimiter for InMemoryCache {
    async fn increment(&self, user_id: UserId, window: i64, expiry: Duration) -> Result<u64> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        let key = keys::rate_limit(user_id, window);

        let count = match state.live(&key) {
            Some(entry) => {
                let next = entry.value.parse::<u64>().unwrap_or(0) + 1;
                entry.value = next.to_string();
                next
            }
            None => {
                state.entries.insert(
                    key,
                    Entry {
                        value: "1".to_string(),
                        expires_at: Some(Instant::now() + expiry),
                    },
                );
                1
            }
        };
        Ok(count)
    }
}

#[async_trait]
impl CheckoutLock for InMemoryCache {
    async fn try_acquire(&self, user_id: UserId, ttl: Duration) -> Result<Option<LockToken>> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        let key = keys::checkout_lock(user_id);

        if state.live(&key).is_some() {
            return Ok(None);
        }
        let token = LockToken::generate();
        state.entries.insert(
            key,
            Entry {
                value: token.as_str().to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(Some(token))
    }

    async fn release(&self, user_id: UserId, token: &LockToken) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        let key = keys::checkout_lock(user_id);

        let held_by_caller = state
            .live(&key)
            .is_some_and(|e| e.value == token.as_str());
        if held_by_caller {
            state.entries.remove(&key);
        }
        Ok(held_by_caller)
    }
}

#[async_trait]
impl FanOutSink for InMemoryCache {
    async fn invalidate_user_summaries(&self, user_id: UserId) -> Result<u64> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        let pattern = keys::user_summary_pattern(user_id);

        let before = state.entries.len();
        state
            .entries
            .retain(|key, _| !matches_prefix_glob(&pattern, key));
        Ok((before - state.entries.len()) as u64)
    }

    async fn add_to_leaderboard(&self, user_id: UserId, amount: f64) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        *state.leaderboard.entry(user_id).or_insert(0.0) += amount;
        Ok(())
    }

    async fn publish_order_event(&self, entry: &OrderStreamEntry) -> Result<String> {
        let mut state = self.state.lock().await;
        state.check_available()?;
        state.stream.push(entry.clone());
        Ok(format!("{}-0", state.stream.len()))
    }
}
