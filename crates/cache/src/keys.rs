//! Key layout shared with the overview read path.

use common::UserId;

/// Sorted set of lifetime spend per user.
pub const LEADERBOARD: &str = "leaderboard:top_buyers";

/// Append-only stream of committed orders.
pub const ORDER_STREAM: &str = "stream:order_events";

pub fn idempotency(payment_ref: &str) -> String {
    format!("idem:checkout:{payment_ref}")
}

/// `window` is the minute index since the Unix epoch.
pub fn rate_limit(user_id: UserId, window: i64) -> String {
    format!("rl:user:{user_id}:checkout:{window}")
}

pub fn checkout_lock(user_id: UserId) -> String {
    format!("lock:checkout:{user_id}")
}

/// Matches every cached overview summary of a user.
pub fn user_summary_pattern(user_id: UserId) -> String {
    format!("cache:user:{user_id}:summary:*")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_formats() {
        let user = UserId::parse("11111111-1111-1111-1111-111111111111").unwrap();
        assert_eq!(idempotency("pay-1"), "idem:checkout:pay-1");
        assert_eq!(
            rate_limit(user, 29_000_000),
            "rl:user:11111111-1111-1111-1111-111111111111:checkout:29000000"
        );
        assert_eq!(
            checkout_lock(user),
            "lock:checkout:11111111-1111-1111-1111-111111111111"
        );
        assert_eq!(
            user_summary_pattern(user),
            "cache:user:11111111-1111-1111-1111-111111111111:summary:*"
        );
    }
}
