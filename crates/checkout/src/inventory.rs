//! Inventory reservation.

use common::WarehouseId;
use store::{CartLine, CheckoutTransaction};

use crate::error::{CheckoutError, Result};

/// Reserves every cart line at `warehouse_id`.
///
/// Rows are locked one at a time in line order; lines arrive sorted by
/// product, which gives every transaction the same lock order. The first
/// line that cannot be covered fails the whole reservation, and the caller
/// drops the transaction to undo the lines already reserved.
pub async fn reserve_lines<T>(
    tx: &mut T,
    lines: &[CartLine],
    warehouse_id: WarehouseId,
) -> Result<()>
where
    T: CheckoutTransaction + ?Sized,
{
    for line in lines {
        let level = tx.lock_inventory(line.product_id, warehouse_id).await?;

        match level {
            Some(level) if level.can_reserve(line.qty) => {
                tx.reserve_inventory(line.product_id, warehouse_id, line.qty)
                    .await?;
            }
            _ => {
                tracing::debug!(
                    product_id = %line.product_id,
                    %warehouse_id,
                    requested = line.qty,
                    free = ?level.map(|l| l.free_qty()),
                    "insufficient inventory"
                );
                return Err(CheckoutError::InsufficientInventory {
                    product_id: line.product_id,
                });
            }
        }
    }
    Ok(())
}
