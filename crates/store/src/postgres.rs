use async_trait::async_trait;
use common::{CartId, CouponCode, ProductId, UserId, WarehouseId};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AuditEvent, CartLine, CartStatus, Coupon, CouponKind, InventoryLevel, NewOrder, Result,
    StoreError,
    store::{CheckoutStore, CheckoutTransaction},
};

/// PostgreSQL-backed checkout store.
#[derive(Clone)]
pub struct PostgresCheckoutStore {
    pool: PgPool,
}

impl PostgresCheckoutStore {
    /// Creates a new PostgreSQL checkout store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl CheckoutStore for PostgresCheckoutStore {
    type Transaction = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        Ok(PostgresTransaction {
            tx: self.pool.begin().await?,
        })
    }
}

/// An open PostgreSQL transaction. Rolled back on drop unless committed.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

fn qty_to_db(table: &'static str, qty: u32) -> Result<i32> {
    i32::try_from(qty).map_err(|_| StoreError::corrupt(table, format!("quantity {qty} overflows")))
}

fn qty_from_db(table: &'static str, value: i32) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::corrupt(table, format!("negative quantity {value}")))
}

fn row_to_coupon(row: PgRow) -> Result<Coupon> {
    let kind: String = row.try_get("type")?;
    let max_uses: Option<i32> = row.try_get("max_uses")?;

    Ok(Coupon {
        code: CouponCode::new(row.try_get::<String, _>("code")?),
        kind: kind.parse::<CouponKind>()?,
        value: row.try_get("value")?,
        max_uses: max_uses
            .map(|max| qty_from_db("coupons", max))
            .transpose()?,
        used_count: qty_from_db("coupons", row.try_get("used_count")?)?,
        starts_at: row.try_get("starts_at")?,
        ends_at: row.try_get("ends_at")?,
    })
}

#[async_trait]
impl CheckoutTransaction for PostgresTransaction {
    async fn lock_cart(
        &mut self,
        cart_id: CartId,
        user_id: UserId,
    ) -> Result<Option<CartStatus>> {
        let status: Option<String> = sqlx::query_scalar(
            "SELECT status FROM carts WHERE id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(cart_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        status.map(|s| s.parse::<CartStatus>()).transpose()
    }

    async fn cart_lines(&mut self, cart_id: CartId) -> Result<Vec<CartLine>> {
        let rows = sqlx::query(
            r#"
            SELECT ci.product_id, ci.qty, ci.unit_price, p.status
            FROM cart_items ci
            JOIN products p ON p.id = ci.product_id
            WHERE ci.cart_id = $1
            ORDER BY ci.product_id ASC
            "#,
        )
        .bind(cart_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<CartLine> {
                Ok(CartLine {
                    product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
                    qty: qty_from_db("cart_items", row.try_get("qty")?)?,
                    unit_price: row.try_get::<Decimal, _>("unit_price")?,
                    product_status: row.try_get("status")?,
                })
            })
            .collect()
    }

    async fn lock_coupon(&mut self, code: &CouponCode) -> Result<Option<Coupon>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT code, type, value, max_uses, used_count, starts_at, ends_at
            FROM coupons
            WHERE code = $1
            FOR UPDATE
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_coupon).transpose()
    }

    async fn lock_coupon_usage(
        &mut self,
        user_id: UserId,
        code: &CouponCode,
    ) -> Result<Option<u32>> {
        let used: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT used_count FROM user_coupon_usage
            WHERE user_id = $1 AND coupon_code = $2
            FOR UPDATE
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(code.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        used.map(|n| qty_from_db("user_coupon_usage", n)).transpose()
    }

    async fn record_coupon_use(&mut self, user_id: UserId, code: &CouponCode) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_coupon_usage (user_id, coupon_code, used_count)
            VALUES ($1, $2, 1)
            ON CONFLICT (user_id, coupon_code)
            DO UPDATE SET used_count = user_coupon_usage.used_count + 1
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(code.as_str())
        .execute(&mut *self.tx)
        .await?;

        sqlx::query("UPDATE coupons SET used_count = used_count + 1 WHERE code = $1")
            .bind(code.as_str())
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn user_region(&mut self, user_id: UserId) -> Result<Option<String>> {
        let region: Option<String> = sqlx::query_scalar("SELECT region FROM users WHERE id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(region)
    }

    async fn lock_inventory(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<InventoryLevel>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT available_qty, reserved_qty FROM inventory
            WHERE product_id = $1 AND warehouse_id = $2
            FOR UPDATE
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(warehouse_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(Some(InventoryLevel {
                available_qty: qty_from_db("inventory", row.try_get("available_qty")?)?,
                reserved_qty: qty_from_db("inventory", row.try_get("reserved_qty")?)?,
            })),
            None => Ok(None),
        }
    }

    async fn reserve_inventory(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        qty: u32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE inventory
            SET reserved_qty = reserved_qty + $1, updated_at = NOW()
            WHERE product_id = $2 AND warehouse_id = $3
            "#,
        )
        .bind(qty_to_db("inventory", qty)?)
        .bind(product_id.as_uuid())
        .bind(warehouse_id.as_uuid())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, status, subtotal, discount, tax, shipping, total, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.subtotal)
        .bind(order.discount)
        .bind(order.tax)
        .bind(order.shipping)
        .bind(order.total)
        .bind(order.created_at)
        .execute(&mut *self.tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, product_id, qty, unit_price)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(order.id.as_uuid())
            .bind(item.product_id.as_uuid())
            .bind(qty_to_db("order_items", item.qty)?)
            .bind(item.unit_price)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn close_cart(&mut self, cart_id: CartId) -> Result<()> {
        sqlx::query("UPDATE carts SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(CartStatus::Closed.as_str())
            .bind(cart_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn append_audit_event(&mut self, event: &AuditEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO events (user_id, type, payload_json, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(event.user_id.as_uuid())
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
