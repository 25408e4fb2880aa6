//! Region to warehouse resolution.

use std::collections::HashMap;

use common::{UserId, WarehouseId};
use store::CheckoutTransaction;
use uuid::Uuid;

/// Region used when a user's region is unknown or unmapped.
pub const FALLBACK_REGION: &str = "us-east";

const DEFAULT_WAREHOUSES: [(&str, u128); 4] = [
    ("us-east", 0x11111111_1111_1111_1111_111111111111),
    ("us-west", 0x22222222_2222_2222_2222_222222222222),
    ("eu-west", 0x33333333_3333_3333_3333_333333333333),
    ("ap-southeast", 0x44444444_4444_4444_4444_444444444444),
];

/// Static mapping from user region to the single warehouse serving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseDirectory {
    by_region: HashMap<String, WarehouseId>,
    fallback: WarehouseId,
}

impl WarehouseDirectory {
    /// Creates a directory whose unmapped regions resolve to `fallback`.
    pub fn new(by_region: HashMap<String, WarehouseId>, fallback: WarehouseId) -> Self {
        Self {
            by_region,
            fallback,
        }
    }

    /// Returns the warehouse for `region`, or the fallback.
    pub fn for_region(&self, region: Option<&str>) -> WarehouseId {
        region
            .and_then(|r| self.by_region.get(r))
            .copied()
            .unwrap_or(self.fallback)
    }

    /// Looks up the user's region inside `tx` and resolves its warehouse.
    pub async fn resolve<T>(&self, tx: &mut T, user_id: UserId) -> store::Result<WarehouseId>
    where
        T: CheckoutTransaction + ?Sized,
    {
        let region = tx.user_region(user_id).await?;
        let warehouse_id = self.for_region(region.as_deref());
        tracing::debug!(%user_id, region = ?region, %warehouse_id, "resolved warehouse");
        Ok(warehouse_id)
    }
}

impl Default for WarehouseDirectory {
    fn default() -> Self {
        let by_region: HashMap<String, WarehouseId> = DEFAULT_WAREHOUSES
            .iter()
            .map(|(region, id)| {
                (
                    region.to_string(),
                    WarehouseId::from_uuid(Uuid::from_u128(*id)),
                )
            })
            .collect();
        // DEFAULT_WAREHOUSES[0] is the fallback region.
        let fallback = WarehouseId::from_uuid(Uuid::from_u128(DEFAULT_WAREHOUSES[0].1));
        Self::new(by_region, fallback)
    }
}
