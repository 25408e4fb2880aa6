use async_trait::async_trait;
use common::{CartId, CouponCode, ProductId, UserId, WarehouseId};

use crate::{AuditEvent, CartLine, CartStatus, Coupon, InventoryLevel, NewOrder, Result};

/// Entry point to the relational store.
///
/// Implementations must be thread-safe; each checkout runs in its own
/// transaction obtained from [`CheckoutStore::begin`].
#[async_trait]
pub trait CheckoutStore: Send + Sync {
    /// The transaction handle produced by this store.
    type Transaction: CheckoutTransaction;

    /// Opens a new transaction.
    async fn begin(&self) -> Result<Self::Transaction>;
}

/// A single multi-statement transaction.
///
/// Nothing written through a transaction is visible to others until
/// [`commit`](CheckoutTransaction::commit) returns `Ok`. Dropping the handle
/// without committing rolls everything back and releases all row locks.
#[async_trait]
pub trait CheckoutTransaction: Send {
    /// Locks the cart row owned by `user_id` and returns its status.
    ///
    /// Returns `None` if no such cart exists for that user.
    async fn lock_cart(&mut self, cart_id: CartId, user_id: UserId)
    -> Result<Option<CartStatus>>;

    /// Loads the cart's items joined with product status, ordered by product.
    ///
    /// Items are read, not locked; they never change after cart creation.
    async fn cart_lines(&mut self, cart_id: CartId) -> Result<Vec<CartLine>>;

    /// Locks the coupon row with the given code.
    async fn lock_coupon(&mut self, code: &CouponCode) -> Result<Option<Coupon>>;

    /// Locks the per-user usage row for a coupon and returns its count.
    async fn lock_coupon_usage(
        &mut self,
        user_id: UserId,
        code: &CouponCode,
    ) -> Result<Option<u32>>;

    /// Upserts the usage row for `(user_id, code)` and increments the
    /// coupon's global `used_count`.
    async fn record_coupon_use(&mut self, user_id: UserId, code: &CouponCode) -> Result<()>;

    /// Returns the user's region, or `None` for an unknown user.
    async fn user_region(&mut self, user_id: UserId) -> Result<Option<String>>;

    /// Locks the inventory row for `(product_id, warehouse_id)`.
    async fn lock_inventory(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<InventoryLevel>>;

    /// Adds `qty` to the row's `reserved_qty`.
    async fn reserve_inventory(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        qty: u32,
    ) -> Result<()>;

    /// Inserts the order row and all of its items.
    async fn insert_order(&mut self, order: &NewOrder) -> Result<()>;

    /// Moves the cart to `closed`.
    async fn close_cart(&mut self, cart_id: CartId) -> Result<()>;

    /// Appends a row to the audit log.
    async fn append_audit_event(&mut self, event: &AuditEvent) -> Result<()>;

    /// Commits every write made through this transaction.
    async fn commit(self) -> Result<()>;
}
