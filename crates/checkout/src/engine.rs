//! The checkout orchestrator.

use std::sync::Arc;

use cache::{CacheBackend, LockToken};
use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use rust_decimal::Decimal;
use store::{AuditEvent, CartStatus, CheckoutStore, CheckoutTransaction, NewOrder, OrderStatus};
use tracing::Instrument;

use crate::clock::{Clock, SystemClock};
use crate::error::{CheckoutError, Result};
use crate::fanout::{self, CommittedOrder};
use crate::request::{CheckoutRequest, CheckoutResult};
use crate::settings::{self, CheckoutSettings};
use crate::{coupon, inventory, pricing};

/// Audit event type written with every new order.
pub const ORDER_CREATED: &str = "ORDER_CREATED";

/// Turns carts into orders.
///
/// A request goes through, in order: idempotent replay, the per-user rate
/// limit, the per-user lock, one store transaction, post-commit fan-out and
/// finally the idempotency write. The lock is released on every path once
/// it has been taken, including when the checkout future is dropped.
pub struct CheckoutEngine<S, C>
where
    S: CheckoutStore,
    C: CacheBackend,
{
    store: S,
    cache: Arc<C>,
    settings: CheckoutSettings,
    clock: Arc<dyn Clock>,
}

impl<S, C> CheckoutEngine<S, C>
where
    S: CheckoutStore,
    C: CacheBackend + 'static,
{
    /// Creates an engine on the system clock.
    pub fn new(store: S, cache: C, settings: CheckoutSettings) -> Self {
        Self::with_clock(store, cache, settings, Arc::new(SystemClock))
    }

    /// Creates an engine reading time from `clock`.
    pub fn with_clock(
        store: S,
        cache: C,
        settings: CheckoutSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            cache: Arc::new(cache),
            settings,
            clock,
        }
    }

    /// Runs one checkout.
    #[tracing::instrument(
        skip(self, request),
        fields(user_id = %request.user_id, cart_id = %request.cart_id)
    )]
    pub async fn checkout(&self, request: &CheckoutRequest) -> Result<CheckoutResult> {
        metrics::counter!("checkout_requests_total").increment(1);
        let start = std::time::Instant::now();

        let outcome = self.checkout_inner(request).await;

        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());
        let label = match &outcome {
            Ok(_) => "ok",
            Err(e) => e.label(),
        };
        metrics::counter!("checkout_outcomes_total", "outcome" => label).increment(1);

        match &outcome {
            Ok(result) => tracing::info!(
                order_id = %result.order_id,
                total = %result.total,
                "checkout completed"
            ),
            Err(e) => tracing::info!(outcome = label, error = %e, "checkout rejected"),
        }
        outcome
    }

    async fn checkout_inner(&self, request: &CheckoutRequest) -> Result<CheckoutResult> {
        if let Some(cached) = self.replay(&request.payment_ref).await {
            metrics::counter!("checkout_idempotent_hits_total").increment(1);
            tracing::info!(order_id = %cached.order_id, "replayed idempotent result");
            return Ok(cached);
        }

        self.enforce_rate_limit(request.user_id).await?;

        let token = self
            .cache
            .try_acquire(request.user_id, self.settings.lock_ttl)
            .await?
            .ok_or(CheckoutError::CheckoutInProgress)?;
        let guard = LockGuard {
            cache: Arc::clone(&self.cache),
            user_id: request.user_id,
            token: Some(token),
        };

        let outcome = self.checkout_locked(request).await;
        guard.release().await;
        outcome
    }

    async fn checkout_locked(&self, request: &CheckoutRequest) -> Result<CheckoutResult> {
        let committed = self.commit_with_retry(request).await?;

        fanout::publish(self.cache.as_ref(), &committed).await;

        let result = CheckoutResult {
            order_id: committed.order_id,
            status: OrderStatus::Pending,
            total: committed.total,
        };
        self.remember(&request.payment_ref, &result).await;
        Ok(result)
    }

    /// Returns the stored result for `payment_ref`. Backend failures and
    /// unreadable entries count as a miss.
    async fn replay(&self, payment_ref: &str) -> Option<CheckoutResult> {
        let payload = match self.cache.get(payment_ref).await {
            Ok(payload) => payload?,
            Err(e) => {
                tracing::warn!(error = %e, "idempotency lookup failed, proceeding");
                return None;
            }
        };
        match serde_json::from_str(&payload) {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable idempotency entry");
                None
            }
        }
    }

    async fn remember(&self, payment_ref: &str, result: &CheckoutResult) {
        let payload = match serde_json::to_string(result) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize checkout result");
                return;
            }
        };
        if let Err(e) = self
            .cache
            .put(payment_ref, &payload, self.settings.idempotency_ttl)
            .await
        {
            tracing::warn!(
                order_id = %result.order_id,
                error = %e,
                "failed to store idempotency entry"
            );
        }
    }

    /// Counts the attempt, then rejects it if the user is over budget.
    /// Rejected attempts keep their increment.
    async fn enforce_rate_limit(&self, user_id: UserId) -> Result<()> {
        let window = settings::rate_window(self.clock.now().timestamp());
        let count = self
            .cache
            .increment(user_id, window, self.settings.rate_window_expiry)
            .await?;
        if count > self.settings.rate_limit {
            return Err(CheckoutError::RateLimited);
        }
        Ok(())
    }

    /// Runs the transaction, re-running it from scratch when the store
    /// aborts it for a deadlock or serialization failure.
    async fn commit_with_retry(&self, request: &CheckoutRequest) -> Result<CommittedOrder> {
        let mut attempt = 0;
        loop {
            match self.commit_order(request).await {
                Err(e)
                    if e.is_retryable_transaction()
                        && attempt < self.settings.transaction_retries =>
                {
                    attempt += 1;
                    tracing::warn!(attempt, error = %e, "retrying aborted checkout transaction");
                }
                outcome => return outcome,
            }
        }
    }

    /// One attempt at the transactional part. Any error drops `tx`, which
    /// rolls back every write and releases every row lock.
    async fn commit_order(&self, request: &CheckoutRequest) -> Result<CommittedOrder> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        match tx.lock_cart(request.cart_id, request.user_id).await? {
            Some(CartStatus::Open) => {}
            _ => return Err(CheckoutError::CartInvalid),
        }
        let lines = tx.cart_lines(request.cart_id).await?;
        if lines.is_empty() {
            return Err(CheckoutError::CartEmpty);
        }

        let discount = match &request.coupon {
            Some(code) => {
                let subtotal = pricing::subtotal(&lines);
                coupon::redeem(&mut tx, request.user_id, code, subtotal, now).await?
            }
            None => Decimal::ZERO,
        };

        let warehouse_id = self
            .settings
            .warehouses
            .resolve(&mut tx, request.user_id)
            .await?;
        inventory::reserve_lines(&mut tx, &lines, warehouse_id).await?;

        let price = self.settings.pricing.price(&lines, discount);
        let order = NewOrder {
            id: OrderId::new(),
            user_id: request.user_id,
            cart_id: request.cart_id,
            status: OrderStatus::Pending,
            subtotal: price.subtotal,
            discount: price.discount,
            tax: price.tax,
            shipping: price.shipping,
            total: price.total,
            items: lines.iter().map(Into::into).collect(),
            created_at: now,
        };
        tx.insert_order(&order).await?;
        tx.close_cart(request.cart_id).await?;
        tx.append_audit_event(&order_created(&order, now)).await?;
        tx.commit().await?;

        tracing::debug!(order_id = %order.id, %warehouse_id, "checkout transaction committed");
        Ok(CommittedOrder {
            order_id: order.id,
            user_id: order.user_id,
            total: order.total,
        })
    }
}

/// Holds the per-user checkout lock.
///
/// Dropped without [`LockGuard::release`], as when the checkout future is
/// cancelled, it releases the lock from a spawned task.
struct LockGuard<C: CacheBackend + 'static> {
    cache: Arc<C>,
    user_id: UserId,
    token: Option<LockToken>,
}

impl<C: CacheBackend + 'static> LockGuard<C> {
    async fn release(mut self) {
        if let Some(token) = &self.token {
            release_lock(self.cache.as_ref(), self.user_id, token).await;
        }
        self.token = None;
    }
}

impl<C: CacheBackend + 'static> Drop for LockGuard<C> {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no runtime to release checkout lock, leaving it to expire");
            return;
        };
        tracing::info!("checkout cancelled, releasing lock in the background");
        let cache = Arc::clone(&self.cache);
        let user_id = self.user_id;
        runtime.spawn(
            async move { release_lock(cache.as_ref(), user_id, &token).await }
                .instrument(tracing::Span::current()),
        );
    }
}

async fn release_lock<C: CacheBackend + ?Sized>(cache: &C, user_id: UserId, token: &LockToken) {
    match cache.release(user_id, token).await {
        Ok(true) => {}
        Ok(false) => tracing::warn!("checkout lock expired before release"),
        Err(e) => {
            metrics::counter!("checkout_lock_release_failures_total").increment(1);
            tracing::warn!(error = %e, "failed to release checkout lock");
        }
    }
}

fn order_created(order: &NewOrder, now: DateTime<Utc>) -> AuditEvent {
    AuditEvent {
        user_id: order.user_id,
        event_type: ORDER_CREATED.to_string(),
        payload: serde_json::json!({
            "orderId": order.id,
            "total": order.total.to_string(),
            "cartId": order.cart_id,
        }),
        created_at: now,
    }
}
