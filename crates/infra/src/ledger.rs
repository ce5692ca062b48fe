//! Stock ledger: transaction-scoped locked read and write of an item.

use chrono::{DateTime, Utc};

use warehousex_core::{DomainError, ItemId};
use warehousex_inventory::InventoryItem;
use warehousex_requests::RequestType;

use crate::error::ApprovalError;
use crate::store::StoreTransaction;

/// Item state on both sides of a settled movement.
#[derive(Debug, Clone, PartialEq)]
pub struct StockMovement {
    pub before: InventoryItem,
    pub after: InventoryItem,
}

/// Read `item_id` under an exclusive row lock held until `tx` ends.
pub async fn locked_read<T>(tx: &mut T, item_id: ItemId) -> Result<InventoryItem, ApprovalError>
where
    T: StoreTransaction,
{
    tx.locked_read_item(item_id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("item {item_id} not found")).into())
}

pub async fn write<T>(tx: &mut T, item: &InventoryItem) -> Result<(), ApprovalError>
where
    T: StoreTransaction,
{
    tx.write_item(item).await?;
    Ok(())
}

/// Apply one request's movement to the locked item and stage the write.
///
/// Outbound sufficiency is re-checked here, under the row lock; on shortage
/// nothing is written.
pub async fn settle<T>(
    tx: &mut T,
    kind: RequestType,
    item_id: ItemId,
    quantity: i64,
    now: DateTime<Utc>,
) -> Result<StockMovement, ApprovalError>
where
    T: StoreTransaction,
{
    let before = locked_read(tx, item_id).await?;
    let mut after = before.clone();
    match kind {
        RequestType::Inbound => after.receive(quantity, now)?,
        RequestType::Outbound => after.issue(quantity, now)?,
    }
    write(tx, &after).await?;
    Ok(StockMovement { before, after })
}
