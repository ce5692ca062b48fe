use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warehousex_core::{DomainError, DomainResult, ItemId, RequestId, UserId};

/// Direction of a stock movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    Inbound,
    Outbound,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Inbound => "INBOUND",
            RequestType::Outbound => "OUTBOUND",
        }
    }
}

/// Lifecycle status of a request.
///
/// ```text
/// PENDING ──► APPROVED ──► COMPLETED
///    │
///    └──────► REJECTED
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Rejected => "REJECTED",
            RequestStatus::Completed => "COMPLETED",
        }
    }

    /// Statuses reachable in one step from `self`.
    pub fn allowed_transitions(&self) -> &'static [RequestStatus] {
        match self {
            RequestStatus::Pending => &[RequestStatus::Approved, RequestStatus::Rejected],
            RequestStatus::Approved => &[RequestStatus::Completed],
            RequestStatus::Rejected | RequestStatus::Completed => &[],
        }
    }

    pub fn can_transition_to(&self, to: RequestStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    pub fn ensure_transition(&self, to: RequestStatus) -> DomainResult<()> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(DomainError::invalid_transition(self, to))
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

impl core::fmt::Display for RequestType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INBOUND" => Ok(RequestType::Inbound),
            "OUTBOUND" => Ok(RequestType::Outbound),
            other => Err(DomainError::invalid_input(format!("unknown request type '{other}'"))),
        }
    }
}

impl FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RequestStatus::Pending),
            "APPROVED" => Ok(RequestStatus::Approved),
            "REJECTED" => Ok(RequestStatus::Rejected),
            "COMPLETED" => Ok(RequestStatus::Completed),
            other => Err(DomainError::invalid_input(format!("unknown request status '{other}'"))),
        }
    }
}

/// A request to move stock of a single item in or out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    #[serde(rename = "type")]
    pub kind: RequestType,
    pub status: RequestStatus,
    pub item_id: ItemId,
    pub quantity: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
    pub created_by: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Request {
    /// A new PENDING request.
    pub fn submit(
        kind: RequestType,
        item_id: ItemId,
        quantity: i64,
        notes: impl Into<String>,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if quantity < 1 {
            return Err(DomainError::invalid_input("quantity must be at least 1"));
        }

        Ok(Self {
            id: RequestId::new(),
            kind,
            status: RequestStatus::Pending,
            item_id,
            quantity,
            notes: notes.into(),
            created_by,
            approved_by: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Lifecycle and self-approval checks for an approval by `approver`.
    pub fn check_approval(&self, approver: UserId) -> DomainResult<()> {
        self.status.ensure_transition(RequestStatus::Approved)?;
        if self.created_by == approver {
            return Err(DomainError::SelfApproval);
        }
        Ok(())
    }

    /// Lifecycle check for a rejection. Creators may reject their own requests.
    pub fn check_rejection(&self) -> DomainResult<()> {
        self.status.ensure_transition(RequestStatus::Rejected)
    }

    /// Settle an approval.
    ///
    /// Approval is validated as PENDING → APPROVED but persisted as COMPLETED
    /// in the same step: the stock movement happens in the same transaction,
    /// so there is no observable window where the request is merely approved.
    pub fn complete(&mut self, approver: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        self.check_approval(approver)?;
        self.status = RequestStatus::Completed;
        self.approved_by = Some(approver);
        self.updated_at = now;
        Ok(())
    }

    pub fn reject(&mut self, reviewer: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        self.check_rejection()?;
        self.status = RequestStatus::Rejected;
        self.approved_by = Some(reviewer);
        self.updated_at = now;
        Ok(())
    }
}
