//! Audit recorder: immutable before/after snapshots of every mutation.
//!
//! Entries are only ever appended through a [`StoreTransaction`], so an entry
//! commits together with the mutation it documents or not at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use warehousex_core::{AuditEntryId, UserId};
use warehousex_requests::{Request, RequestType};

use crate::error::ApprovalError;
use crate::ledger::StockMovement;
use crate::store::StoreTransaction;

pub const ENTITY_INVENTORY: &str = "inventory";
pub const ENTITY_REQUEST: &str = "request";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    CreateInbound,
    CreateOutbound,
    InboundApproved,
    OutboundApproved,
    Rejected,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::CreateInbound => "CREATE_INBOUND",
            AuditAction::CreateOutbound => "CREATE_OUTBOUND",
            AuditAction::InboundApproved => "INBOUND_APPROVED",
            AuditAction::OutboundApproved => "OUTBOUND_APPROVED",
            AuditAction::Rejected => "REJECTED",
        }
    }

    pub fn created(kind: RequestType) -> Self {
        match kind {
            RequestType::Inbound => AuditAction::CreateInbound,
            RequestType::Outbound => AuditAction::CreateOutbound,
        }
    }

    pub fn approved(kind: RequestType) -> Self {
        match kind {
            RequestType::Inbound => AuditAction::InboundApproved,
            RequestType::Outbound => AuditAction::OutboundApproved,
        }
    }
}

impl core::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub entity: String,
    pub entity_id: Uuid,
    pub action: AuditAction,
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Entry for a settled stock movement (entity `inventory`).
    pub fn stock_movement(
        action: AuditAction,
        user_id: UserId,
        movement: &StockMovement,
        now: DateTime<Utc>,
    ) -> Result<Self, ApprovalError> {
        Ok(Self {
            id: AuditEntryId::new(),
            entity: ENTITY_INVENTORY.to_string(),
            entity_id: *movement.after.id.as_uuid(),
            action,
            user_id,
            before: Some(snapshot(&movement.before)?),
            after: Some(snapshot(&movement.after)?),
            created_at: now,
        })
    }

    /// Entry for a request-only change (submission, rejection).
    pub fn request_change(
        action: AuditAction,
        user_id: UserId,
        request: &Request,
        now: DateTime<Utc>,
    ) -> Result<Self, ApprovalError> {
        Ok(Self {
            id: AuditEntryId::new(),
            entity: ENTITY_REQUEST.to_string(),
            entity_id: *request.id.as_uuid(),
            action,
            user_id,
            before: None,
            after: Some(snapshot(request)?),
            created_at: now,
        })
    }
}

fn snapshot<T: Serialize>(value: &T) -> Result<JsonValue, ApprovalError> {
    serde_json::to_value(value)
        .map_err(|e| ApprovalError::Internal(format!("audit snapshot serialization failed: {e}")))
}

/// Append `entry` inside `tx`. A failure here aborts the enclosing transaction.
pub async fn record<T>(tx: &mut T, entry: &AuditEntry) -> Result<(), ApprovalError>
where
    T: StoreTransaction,
{
    tx.write_audit_entry(entry).await?;
    tracing::debug!(
        action = %entry.action,
        entity = %entry.entity,
        entity_id = %entry.entity_id,
        "audit entry staged"
    );
    Ok(())
}
