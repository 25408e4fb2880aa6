//! Coupon validation and redemption.

use chrono::{DateTime, Utc};
use common::{CouponCode, UserId};
use rust_decimal::Decimal;
use store::CheckoutTransaction;

use crate::error::{CheckoutError, Result};
use crate::pricing;

/// Validates `code` for `user_id` and records its use, returning the
/// discount it grants on `subtotal`.
///
/// The coupon row and the user's usage row are both locked before the
/// counters are bumped, so concurrent redemptions of the same coupon
/// serialize on the coupon row and can never push `used_count` past
/// `max_uses`.
pub async fn redeem<T>(
    tx: &mut T,
    user_id: UserId,
    code: &CouponCode,
    subtotal: Decimal,
    now: DateTime<Utc>,
) -> Result<Decimal>
where
    T: CheckoutTransaction + ?Sized,
{
    let coupon = tx
        .lock_coupon(code)
        .await?
        .ok_or(CheckoutError::CouponInvalid)?;

    if !coupon.is_active_at(now) || coupon.is_exhausted() {
        tracing::debug!(%code, "coupon outside window or at cap");
        return Err(CheckoutError::CouponInvalid);
    }

    let prior_uses = tx.lock_coupon_usage(user_id, code).await?;
    if matches!(prior_uses, Some(n) if n >= 1) {
        return Err(CheckoutError::CouponAlreadyUsed);
    }

    tx.record_coupon_use(user_id, code).await?;

    Ok(pricing::discount(coupon.kind, coupon.value, subtotal))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use store::{CheckoutStore, Coupon, CouponKind, InMemoryCheckoutStore};

    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    async fn store_with(coupon: Coupon) -> InMemoryCheckoutStore {
        let store = InMemoryCheckoutStore::new();
        store.insert_coupon(coupon).await;
        store
    }

    fn coupon(kind: CouponKind, value: &str, max_uses: Option<u32>, used_count: u32) -> Coupon {
        let now = Utc::now();
        Coupon {
            code: CouponCode::from("SAVE"),
            kind,
            value: dec(value),
            max_uses,
            used_count,
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(1),
        }
    }

    #[tokio::test]
    async fn redeems_percentage_coupon_once() {
        let store = store_with(coupon(CouponKind::Percentage, "10", None, 0)).await;
        let user = UserId::new();
        let code = CouponCode::from("SAVE");

        let mut tx = store.begin().await.unwrap();
        let discount = redeem(&mut tx, user, &code, dec("55.00"), Utc::now())
            .await
            .unwrap();
        assert_eq!(discount, dec("5.50"));
        tx.commit().await.unwrap();

        assert_eq!(store.coupon_usage(user, &code).await, Some(1));
        assert_eq!(store.coupon(&code).await.unwrap().used_count, 1);

        let mut tx = store.begin().await.unwrap();
        let err = redeem(&mut tx, user, &code, dec("55.00"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::CouponAlreadyUsed));
    }

    #[tokio::test]
    async fn zero_usage_row_is_not_a_prior_use() {
        let store = store_with(coupon(CouponKind::Fixed, "5", None, 0)).await;
        let user = UserId::new();
        let code = CouponCode::from("SAVE");
        store.set_coupon_usage(user, &code, 0).await;

        let mut tx = store.begin().await.unwrap();
        let discount = redeem(&mut tx, user, &code, dec("20.00"), Utc::now())
            .await
            .unwrap();
        assert_eq!(discount, dec("5"));
        tx.commit().await.unwrap();

        assert_eq!(store.coupon_usage(user, &code).await, Some(1));
    }

    #[tokio::test]
    async fn unknown_code_is_invalid() {
        let store = InMemoryCheckoutStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = redeem(
            &mut tx,
            UserId::new(),
            &CouponCode::from("NOPE"),
            dec("10"),
            Utc::now(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CheckoutError::CouponInvalid));
    }

    #[tokio::test]
    async fn expired_or_exhausted_coupon_is_invalid() {
        let c = coupon(CouponKind::Fixed, "5", Some(3), 3);
        let store = store_with(c.clone()).await;
        let mut tx = store.begin().await.unwrap();
        let err = redeem(&mut tx, UserId::new(), &c.code, dec("10"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::CouponInvalid));
        drop(tx);

        let c = coupon(CouponKind::Fixed, "5", None, 0);
        let store = store_with(c.clone()).await;
        let mut tx = store.begin().await.unwrap();
        let err = redeem(
            &mut tx,
            UserId::new(),
            &c.code,
            dec("10"),
            c.ends_at + Duration::seconds(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CheckoutError::CouponInvalid));
    }

    #[tokio::test]
    async fn rejected_redemption_writes_nothing() {
        let c = coupon(CouponKind::Fixed, "5", Some(1), 1);
        let store = store_with(c.clone()).await;
        let user = UserId::new();

        let mut tx = store.begin().await.unwrap();
        assert!(redeem(&mut tx, user, &c.code, dec("10"), Utc::now()).await.is_err());
        drop(tx);

        assert_eq!(store.coupon_usage(user, &c.code).await, None);
        assert_eq!(store.coupon(&c.code).await.unwrap().used_count, 1);
    }
}
