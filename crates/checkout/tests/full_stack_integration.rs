//! Engine tests against real PostgreSQL and Redis containers.
//!
//! These tests need a Docker daemon. Run with:
//!
//! ```bash
//! cargo test -p checkout --test full_stack_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use cache::RedisCache;
use checkout::{
    CheckoutEngine, CheckoutError, CheckoutRequest, CheckoutSettings, WarehouseDirectory,
};
use common::{CartId, ProductId, UserId, WarehouseId};
use rust_decimal::Decimal;
use sqlx::PgPool;
use store::PostgresCheckoutStore;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use testcontainers_modules::redis::{REDIS_PORT, Redis};
use tokio::sync::OnceCell;

struct Containers {
    #[allow(dead_code)] // Containers must stay alive for tests
    postgres: ContainerAsync<Postgres>,
    #[allow(dead_code)]
    redis: ContainerAsync<Redis>,
    database_url: String,
    redis_url: String,
}

static CONTAINERS: OnceCell<Arc<Containers>> = OnceCell::const_new();

async fn containers() -> Arc<Containers> {
    CONTAINERS
        .get_or_init(|| async {
            let postgres = Postgres::default().start().await.unwrap();
            let pg_host = postgres.get_host().await.unwrap();
            let pg_port = postgres.get_host_port_ipv4(5432).await.unwrap();
            let redis = Redis::default().start().await.unwrap();
            let redis_host = redis.get_host().await.unwrap();
            let redis_port = redis.get_host_port_ipv4(REDIS_PORT).await.unwrap();

            Arc::new(Containers {
                postgres,
                redis,
                database_url: format!("postgres://postgres:postgres@{pg_host}:{pg_port}/postgres"),
                redis_url: format!("redis://{redis_host}:{redis_port}"),
            })
        })
        .await
        .clone()
}

struct Stack {
    engine: Arc<CheckoutEngine<PostgresCheckoutStore, RedisCache>>,
    pool: PgPool,
    redis: redis::aio::MultiplexedConnection,
    warehouse: WarehouseId,
}

async fn stack() -> Stack {
    let info = containers().await;
    let pool = PgPool::connect(&info.database_url).await.unwrap();
    let store = PostgresCheckoutStore::new(pool.clone());
    store.run_migrations().await.unwrap();
    sqlx::query(
        "TRUNCATE TABLE events, order_items, orders, inventory, user_coupon_usage, coupons, \
         cart_items, carts, warehouses, products, users",
    )
    .execute(&pool)
    .await
    .unwrap();

    let warehouse = WarehouseDirectory::default().for_region(Some("us-east"));
    sqlx::query("INSERT INTO warehouses (id, region) VALUES ($1, 'us-east')")
        .bind(warehouse.as_uuid())
        .execute(&pool)
        .await
        .unwrap();

    let client = redis::Client::open(info.redis_url.as_str()).unwrap();
    let mut redis = client.get_multiplexed_async_connection().await.unwrap();
    let _: () = redis::cmd("FLUSHALL").query_async(&mut redis).await.unwrap();

    let cache = RedisCache::new(&info.redis_url).await.unwrap();
    let engine = CheckoutEngine::new(store, cache, CheckoutSettings::default());
    Stack {
        engine: Arc::new(engine),
        pool,
        redis,
        warehouse,
    }
}

impl Stack {
    /// Seeds a user with an open cart of 2 × 20.00 and 1 × 15.00.
    async fn seed_reference_cart(&self) -> (UserId, CartId) {
        let user = UserId::new();
        let cart = CartId::new();
        sqlx::query("INSERT INTO users (id, region) VALUES ($1, 'us-east')")
            .bind(user.as_uuid())
            .execute(&self.pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO carts (id, user_id, status) VALUES ($1, $2, 'open')")
            .bind(cart.as_uuid())
            .bind(user.as_uuid())
            .execute(&self.pool)
            .await
            .unwrap();

        for (qty, price) in [(2, Decimal::new(2000, 2)), (1, Decimal::new(1500, 2))] {
            let product = ProductId::new();
            sqlx::query("INSERT INTO products (id, name, price) VALUES ($1, 'Item', $2)")
                .bind(product.as_uuid())
                .bind(price)
                .execute(&self.pool)
                .await
                .unwrap();
            sqlx::query(
                "INSERT INTO cart_items (id, cart_id, product_id, qty, unit_price) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(uuid::Uuid::new_v4())
            .bind(cart.as_uuid())
            .bind(product.as_uuid())
            .bind(qty)
            .bind(price)
            .execute(&self.pool)
            .await
            .unwrap();
            sqlx::query(
                "INSERT INTO inventory (product_id, warehouse_id, available_qty, reserved_qty) \
                 VALUES ($1, $2, 10, 0)",
            )
            .bind(product.as_uuid())
            .bind(self.warehouse.as_uuid())
            .execute(&self.pool)
            .await
            .unwrap();
        }
        (user, cart)
    }
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn checkout_persists_order_and_fans_out() {
    let s = stack().await;
    let (user, cart) = s.seed_reference_cart().await;

    let result = s
        .engine
        .checkout(&CheckoutRequest::new(user, cart, "pay-1"))
        .await
        .unwrap();
    assert_eq!(result.total, Decimal::new(6638, 2));

    let (total, status): (Decimal, String) =
        sqlx::query_as("SELECT total, status FROM orders WHERE id = $1")
            .bind(result.order_id.as_uuid())
            .fetch_one(&s.pool)
            .await
            .unwrap();
    assert_eq!(total, result.total);
    assert_eq!(status, "pending");

    let cart_status: String = sqlx::query_scalar("SELECT status FROM carts WHERE id = $1")
        .bind(cart.as_uuid())
        .fetch_one(&s.pool)
        .await
        .unwrap();
    assert_eq!(cart_status, "closed");

    let mut redis = s.redis.clone();
    let stream_len: u64 = redis::cmd("XLEN")
        .arg("stream:order_events")
        .query_async(&mut redis)
        .await
        .unwrap();
    assert_eq!(stream_len, 1);

    // Replay is served from Redis.
    let again = s
        .engine
        .checkout(&CheckoutRequest::new(user, cart, "pay-1"))
        .await
        .unwrap();
    assert_eq!(again, result);
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn concurrent_redemptions_respect_coupon_cap() {
    let s = stack().await;
    sqlx::query(
        "INSERT INTO coupons (code, type, value, max_uses, used_count, starts_at, ends_at) \
         VALUES ('LIMITED', 'percentage', 10, 2, 0, NOW() - INTERVAL '1 day', \
         NOW() + INTERVAL '1 day')",
    )
    .execute(&s.pool)
    .await
    .unwrap();

    let mut handles = Vec::new();
    for i in 0..6 {
        let (user, cart) = s.seed_reference_cart().await;
        let engine = Arc::clone(&s.engine);
        handles.push(tokio::spawn(async move {
            let request =
                CheckoutRequest::new(user, cart, format!("pay-{i}")).with_coupon("LIMITED");
            engine.checkout(&request).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(result) => {
                assert_eq!(result.total, Decimal::new(6044, 2));
                succeeded += 1;
            }
            Err(e) => assert!(matches!(e, CheckoutError::CouponInvalid), "unexpected: {e}"),
        }
    }
    assert_eq!(succeeded, 2);

    let used: i32 = sqlx::query_scalar("SELECT used_count FROM coupons WHERE code = 'LIMITED'")
        .fetch_one(&s.pool)
        .await
        .unwrap();
    assert_eq!(used, 2);
}
