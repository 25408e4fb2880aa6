use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{CartId, CouponCode, ProductId, UserId, WarehouseId};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    AuditEvent, CartLine, CartStatus, Coupon, InventoryLevel, NewOrder, Result, StoreError,
    store::{CheckoutStore, CheckoutTransaction},
};

#[derive(Debug, Clone)]
struct CartRow {
    user_id: UserId,
    status: CartStatus,
}

#[derive(Debug, Clone)]
struct CartItemRow {
    product_id: ProductId,
    qty: u32,
    unit_price: Decimal,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    user_regions: HashMap<UserId, String>,
    product_status: HashMap<ProductId, String>,
    carts: HashMap<CartId, CartRow>,
    cart_items: HashMap<CartId, Vec<CartItemRow>>,
    coupons: HashMap<CouponCode, Coupon>,
    coupon_usage: HashMap<(UserId, CouponCode), u32>,
    inventory: HashMap<(ProductId, WarehouseId), InventoryLevel>,
    orders: Vec<NewOrder>,
    events: Vec<AuditEvent>,
    pending_conflicts: u32,
}

/// In-memory checkout store for testing.
///
/// A transaction takes exclusive ownership of all tables for its lifetime,
/// which is a superset of the row locks the PostgreSQL store takes. Writes
/// are made against a private copy and only published on commit.
#[derive(Clone, Default)]
pub struct InMemoryCheckoutStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryCheckoutStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user and their region.
    pub async fn insert_user(&self, user_id: UserId, region: impl Into<String>) {
        self.tables
            .lock()
            .await
            .user_regions
            .insert(user_id, region.into());
    }

    /// Registers a product with the given status.
    pub async fn insert_product(&self, product_id: ProductId, status: impl Into<String>) {
        self.tables
            .lock()
            .await
            .product_status
            .insert(product_id, status.into());
    }

    /// Creates a cart owned by `user_id`.
    pub async fn insert_cart(&self, cart_id: CartId, user_id: UserId, status: CartStatus) {
        self.tables
            .lock()
            .await
            .carts
            .insert(cart_id, CartRow { user_id, status });
    }

    /// Adds an item to a cart, snapshotting `unit_price`.
    pub async fn insert_cart_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        qty: u32,
        unit_price: Decimal,
    ) {
        self.tables
            .lock()
            .await
            .cart_items
            .entry(cart_id)
            .or_default()
            .push(CartItemRow {
                product_id,
                qty,
                unit_price,
            });
    }

    /// Inserts or replaces a coupon.
    pub async fn insert_coupon(&self, coupon: Coupon) {
        self.tables
            .lock()
            .await
            .coupons
            .insert(coupon.code.clone(), coupon);
    }

    /// Seeds a user's usage row for a coupon.
    pub async fn set_coupon_usage(&self, user_id: UserId, code: &CouponCode, used_count: u32) {
        self.tables
            .lock()
            .await
            .coupon_usage
            .insert((user_id, code.clone()), used_count);
    }

    /// Sets the inventory level of a (product, warehouse) pair.
    pub async fn set_inventory(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        level: InventoryLevel,
    ) {
        self.tables
            .lock()
            .await
            .inventory
            .insert((product_id, warehouse_id), level);
    }

    /// Makes the next `count` commits fail with a retryable
    /// [`StoreError::Conflict`], as a deadlock victim would.
    pub async fn inject_conflicts(&self, count: u32) {
        self.tables.lock().await.pending_conflicts = count;
    }

    /// Returns all committed orders in insertion order.
    pub async fn orders(&self) -> Vec<NewOrder> {
        self.tables.lock().await.orders.clone()
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }

    /// Returns the committed status of a cart.
    pub async fn cart_status(&self, cart_id: CartId) -> Option<CartStatus> {
        self.tables.lock().await.carts.get(&cart_id).map(|c| c.status)
    }

    /// Returns the committed state of a coupon.
    pub async fn coupon(&self, code: &CouponCode) -> Option<Coupon> {
        self.tables.lock().await.coupons.get(code).cloned()
    }

    /// Returns how many times a user has redeemed a coupon.
    pub async fn coupon_usage(&self, user_id: UserId, code: &CouponCode) -> Option<u32> {
        self.tables
            .lock()
            .await
            .coupon_usage
            .get(&(user_id, code.clone()))
            .copied()
    }

    /// Returns the committed inventory level of a (product, warehouse) pair.
    pub async fn inventory(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Option<InventoryLevel> {
        self.tables
            .lock()
            .await
            .inventory
            .get(&(product_id, warehouse_id))
            .copied()
    }

    /// Returns all committed audit events.
    pub async fn audit_events(&self) -> Vec<AuditEvent> {
        self.tables.lock().await.events.clone()
    }
}

#[async_trait]
impl CheckoutStore for InMemoryCheckoutStore {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(InMemoryTransaction { guard, staged })
    }
}

/// A transaction over [`InMemoryCheckoutStore`].
///
/// Holds the store's lock until it is committed or dropped.
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

#[async_trait]
impl CheckoutTransaction for InMemoryTransaction {
    async fn lock_cart(
        &mut self,
        cart_id: CartId,
        user_id: UserId,
    ) -> Result<Option<CartStatus>> {
        Ok(self
            .staged
            .carts
            .get(&cart_id)
            .filter(|cart| cart.user_id == user_id)
            .map(|cart| cart.status))
    }

    async fn cart_lines(&mut self, cart_id: CartId) -> Result<Vec<CartLine>> {
        let Some(items) = self.staged.cart_items.get(&cart_id) else {
            return Ok(Vec::new());
        };

        // Inner join: items whose product is unknown are skipped.
        let mut lines: Vec<CartLine> = items
            .iter()
            .filter_map(|item| {
                self.staged
                    .product_status
                    .get(&item.product_id)
                    .map(|status| CartLine {
                        product_id: item.product_id,
                        qty: item.qty,
                        unit_price: item.unit_price,
                        product_status: status.clone(),
                    })
            })
            .collect();
        lines.sort_by_key(|line| line.product_id);
        Ok(lines)
    }

    async fn lock_coupon(&mut self, code: &CouponCode) -> Result<Option<Coupon>> {
        Ok(self.staged.coupons.get(code).cloned())
    }

    async fn lock_coupon_usage(
        &mut self,
        user_id: UserId,
        code: &CouponCode,
    ) -> Result<Option<u32>> {
        Ok(self
            .staged
            .coupon_usage
            .get(&(user_id, code.clone()))
            .copied())
    }

    async fn record_coupon_use(&mut self, user_id: UserId, code: &CouponCode) -> Result<()> {
        *self
            .staged
            .coupon_usage
            .entry((user_id, code.clone()))
            .or_insert(0) += 1;

        let coupon = self
            .staged
            .coupons
            .get_mut(code)
            .ok_or_else(|| StoreError::corrupt("coupons", format!("no coupon '{code}'")))?;
        coupon.used_count += 1;
        // Mirrors the `coupon_usage_within_cap` check constraint.
        if coupon.max_uses.is_some_and(|max| coupon.used_count > max) {
            return Err(StoreError::corrupt(
                "coupons",
                format!("used_count exceeds max_uses for '{code}'"),
            ));
        }
        Ok(())
    }

    async fn user_region(&mut self, user_id: UserId) -> Result<Option<String>> {
        Ok(self.staged.user_regions.get(&user_id).cloned())
    }

    async fn lock_inventory(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<InventoryLevel>> {
        Ok(self
            .staged
            .inventory
            .get(&(product_id, warehouse_id))
            .copied())
    }

    async fn reserve_inventory(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        qty: u32,
    ) -> Result<()> {
        // Mirrors the `reserved_within_available` check constraint.
        if let Some(level) = self.staged.inventory.get_mut(&(product_id, warehouse_id)) {
            if !level.can_reserve(qty) {
                return Err(StoreError::corrupt(
                    "inventory",
                    format!("reserved_qty would exceed available_qty for {product_id}"),
                ));
            }
            level.reserved_qty += qty;
        }
        Ok(())
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<()> {
        self.staged.orders.push(order.clone());
        Ok(())
    }

    async fn close_cart(&mut self, cart_id: CartId) -> Result<()> {
        if let Some(cart) = self.staged.carts.get_mut(&cart_id) {
            cart.status = CartStatus::Closed;
        }
        Ok(())
    }

    async fn append_audit_event(&mut self, event: &AuditEvent) -> Result<()> {
        self.staged.events.push(event.clone());
        Ok(())
    }

    async fn commit(mut self) -> Result<()> {
        if self.guard.pending_conflicts > 0 {
            self.guard.pending_conflicts -= 1;
            return Err(StoreError::Conflict(
                "deadlock detected (injected)".to_string(),
            ));
        }
        let pending_conflicts = self.guard.pending_conflicts;
        *self.guard = std::mem::take(&mut self.staged);
        self.guard.pending_conflicts = pending_conflicts;
        Ok(())
    }
}
