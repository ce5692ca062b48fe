use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warehousex_core::{DomainError, DomainResult, ItemId};

pub const DEFAULT_UNIT: &str = "pcs";

/// A stock record.
///
/// `quantity` never drops below zero and `version` grows by exactly one on
/// every successful mutation. The version is informational (audit, ETags);
/// writers are serialized by the row lock, not by version checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: ItemId,
    pub item_name: String,
    pub sku: String,
    pub quantity: i64,
    pub unit: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// A freshly registered item at version 1.
    pub fn new(
        item_name: impl Into<String>,
        sku: impl Into<String>,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let item_name = item_name.into();
        let sku = sku.into();

        if item_name.trim().is_empty() {
            return Err(DomainError::invalid_input("item name cannot be empty"));
        }
        if sku.trim().is_empty() {
            return Err(DomainError::invalid_input("sku cannot be empty"));
        }
        if quantity < 0 {
            return Err(DomainError::invalid_input("quantity cannot be negative"));
        }

        Ok(Self {
            id: ItemId::new(),
            item_name,
            sku,
            quantity,
            unit: DEFAULT_UNIT.to_string(),
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// Optimistic check used at submission time; re-validated under lock on approval.
    pub fn ensure_available(&self, requested: i64) -> DomainResult<()> {
        if self.quantity < requested {
            return Err(DomainError::InsufficientStock {
                available: self.quantity,
                requested,
            });
        }
        Ok(())
    }

    /// Inbound settlement: add `amount` to stock.
    pub fn receive(&mut self, amount: i64, now: DateTime<Utc>) -> DomainResult<()> {
        ensure_positive(amount)?;
        let quantity = self
            .quantity
            .checked_add(amount)
            .ok_or_else(|| DomainError::invalid_input("quantity overflow"))?;
        self.bump(quantity, now);
        Ok(())
    }

    /// Outbound settlement: remove `amount` from stock, all or nothing.
    pub fn issue(&mut self, amount: i64, now: DateTime<Utc>) -> DomainResult<()> {
        ensure_positive(amount)?;
        self.ensure_available(amount)?;
        let quantity = self.quantity - amount;
        self.bump(quantity, now);
        Ok(())
    }

    fn bump(&mut self, quantity: i64, now: DateTime<Utc>) {
        self.quantity = quantity;
        self.version += 1;
        self.updated_at = now;
    }
}

fn ensure_positive(amount: i64) -> DomainResult<()> {
    if amount <= 0 {
        return Err(DomainError::invalid_input("quantity must be at least 1"));
    }
    Ok(())
}
