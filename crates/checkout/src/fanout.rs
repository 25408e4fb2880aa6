//! Post-commit fan-out.
//!
//! Runs after the order is durable. Each step is attempted independently and
//! a failure is only logged and counted; it never fails the checkout.

use cache::{FanOutSink, OrderStreamEntry};
use common::{OrderId, UserId};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// What the fan-out needs to know about a committed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommittedOrder {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub total: Decimal,
}

const STEP_INVALIDATE: &str = "invalidate_summaries";
const STEP_LEADERBOARD: &str = "leaderboard";
const STEP_STREAM: &str = "order_stream";

/// Invalidates the user's cached summaries, credits the leaderboard and
/// publishes the order event.
#[tracing::instrument(
    skip(sink, order),
    fields(order_id = %order.order_id, user_id = %order.user_id)
)]
pub async fn publish<F>(sink: &F, order: &CommittedOrder)
where
    F: FanOutSink + ?Sized,
{
    match sink.invalidate_user_summaries(order.user_id).await {
        Ok(deleted) => tracing::debug!(deleted, "invalidated user summaries"),
        Err(e) => step_failed(STEP_INVALIDATE, &e),
    }

    match order.total.to_f64() {
        Some(amount) => {
            if let Err(e) = sink.add_to_leaderboard(order.user_id, amount).await {
                step_failed(STEP_LEADERBOARD, &e);
            }
        }
        None => tracing::warn!(total = %order.total, "total not representable as a score"),
    }

    let entry = OrderStreamEntry {
        user_id: order.user_id,
        order_id: order.order_id,
        total: order.total.to_string(),
    };
    match sink.publish_order_event(&entry).await {
        Ok(id) => tracing::debug!(stream_id = %id, "published order event"),
        Err(e) => step_failed(STEP_STREAM, &e),
    }
}

fn step_failed(step: &'static str, error: &cache::CacheError) {
    tracing::warn!(step, error = %error, "post-commit step failed");
    metrics::counter!("checkout_fanout_failures_total", "step" => step).increment(1);
}
