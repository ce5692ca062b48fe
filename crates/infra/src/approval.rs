//! Approval transaction coordinator.
//!
//! Orchestrates the four externally visible mutations (submit inbound,
//! submit outbound, approve, reject) plus request lookup and listing.
//!
//! ## Approval Flow
//!
//! ```text
//! approve_request(request_id, reviewer)
//!   ↓
//! 1. Role check + lifecycle / self-approval check (no lock, no transaction)
//!   ↓
//! 2. OUTBOUND only: acquire lease `lock:item:<item_id>` (fail fast → Conflict)
//!   ↓
//! 3. begin transaction
//!   ↓
//! 4. Re-read request FOR UPDATE, re-check PENDING
//!   ↓
//! 5. Re-read item FOR UPDATE, apply movement (outbound re-checks stock)
//!   ↓
//! 6. Write item, write request (COMPLETED), append audit entry
//!   ↓
//! 7. commit (any failure in 4-6 rolls back everything)
//!   ↓
//! 8. OUTBOUND only: release lease, whatever the outcome
//!   ↓
//! 9. Re-fetch request with item / creator / approver
//! ```
//!
//! The request row lock in step 4 makes two approvals of the same request (or
//! an approval racing a rejection) settle at most once, independent of the
//! lease. Inbound approvals are serialized by the row locks alone.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use warehousex_auth::{Reviewer, RolePolicy};
use warehousex_core::{DomainError, ItemId, RequestId, UserId};
use warehousex_requests::{Request, RequestStatus, RequestType};

use crate::audit::{self, AuditAction, AuditEntry};
use crate::error::ApprovalError;
use crate::ledger::{self, StockMovement};
use crate::lock::{CoordinationLock, with_lease};
use crate::store::{RequestDetails, RequestFilter, Store, StoreTransaction};

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Submission payload for a new inbound or outbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    pub item_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub notes: String,
}

impl NewRequest {
    pub fn new(item_id: ItemId, quantity: i64, notes: impl Into<String>) -> Self {
        Self {
            item_id: item_id.to_string(),
            quantity,
            notes: notes.into(),
        }
    }

    /// Parsed item id, or `InvalidInput`.
    pub fn validate(&self) -> Result<ItemId, ApprovalError> {
        let item_id: ItemId = self.item_id.parse()?;
        if self.quantity < 1 {
            return Err(DomainError::invalid_input("quantity must be at least 1").into());
        }
        Ok(item_id)
    }
}

/// Listing query as supplied by a caller. Out-of-range paging values are
/// normalized rather than rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRequests {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default, rename = "type")]
    pub kind: Option<RequestType>,
    #[serde(default)]
    pub status: Option<RequestStatus>,
}

impl ListRequests {
    /// 1-based page; missing or non-positive becomes 1.
    pub fn page(&self) -> u32 {
        self.page
            .filter(|page| *page > 0)
            .map_or(1, |page| u32::try_from(page).unwrap_or(u32::MAX))
    }

    /// Missing or non-positive becomes [`DEFAULT_PAGE_LIMIT`]; anything above
    /// [`MAX_PAGE_LIMIT`] is capped.
    pub fn limit(&self) -> u32 {
        match self.limit {
            Some(limit) if limit > 0 => {
                u32::try_from(limit.min(i64::from(MAX_PAGE_LIMIT))).unwrap_or(MAX_PAGE_LIMIT)
            }
            _ => DEFAULT_PAGE_LIMIT,
        }
    }

    pub fn filter(&self) -> RequestFilter {
        RequestFilter {
            kind: self.kind,
            status: self.status,
        }
    }
}

/// One page of a request listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPage {
    pub data: Vec<RequestDetails>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

pub struct ApprovalCoordinator<S, L> {
    store: S,
    locks: Arc<L>,
    policy: RolePolicy,
}

impl<S, L> ApprovalCoordinator<S, L>
where
    S: Store,
    L: CoordinationLock,
{
    pub fn new(store: S, locks: Arc<L>, policy: RolePolicy) -> Self {
        Self {
            store,
            locks,
            policy,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn locks(&self) -> &Arc<L> {
        &self.locks
    }

    pub fn policy(&self) -> &RolePolicy {
        &self.policy
    }

    #[instrument(skip(self, input), fields(created_by = %created_by), err)]
    pub async fn create_inbound_request(
        &self,
        input: NewRequest,
        created_by: UserId,
    ) -> Result<RequestDetails, ApprovalError> {
        self.submit(RequestType::Inbound, input, created_by).await
    }

    #[instrument(skip(self, input), fields(created_by = %created_by), err)]
    pub async fn create_outbound_request(
        &self,
        input: NewRequest,
        created_by: UserId,
    ) -> Result<RequestDetails, ApprovalError> {
        self.submit(RequestType::Outbound, input, created_by).await
    }

    #[instrument(
        skip(self, reviewer),
        fields(request_id = %request_id, reviewer = %reviewer.user_id),
        err
    )]
    pub async fn approve_request(
        &self,
        request_id: RequestId,
        reviewer: &Reviewer,
    ) -> Result<RequestDetails, ApprovalError> {
        self.authorize(reviewer)?;
        let current = self.load(request_id).await?;
        current.request.check_approval(reviewer.user_id)?;

        let kind = current.request.kind;
        let item_id = current.request.item_id;
        let approver = reviewer.user_id;

        let movement = match kind {
            RequestType::Outbound => {
                with_lease(&self.locks, item_id, || {
                    self.settle_approval(request_id, approver)
                })
                .await?
            }
            RequestType::Inbound => self.settle_approval(request_id, approver).await?,
        };

        info!(
            request_id = %request_id,
            item_id = %item_id,
            kind = %kind,
            before = movement.before.quantity,
            after = movement.after.quantity,
            version = movement.after.version,
            "request approved"
        );
        self.load(request_id).await
    }

    #[instrument(
        skip(self, reviewer),
        fields(request_id = %request_id, reviewer = %reviewer.user_id),
        err
    )]
    pub async fn reject_request(
        &self,
        request_id: RequestId,
        reviewer: &Reviewer,
    ) -> Result<RequestDetails, ApprovalError> {
        self.authorize(reviewer)?;
        let current = self.load(request_id).await?;
        current.request.check_rejection()?;

        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let outcome = stage_rejection(&mut tx, request_id, reviewer.user_id, now).await;
        finish(tx, outcome).await?;

        info!(request_id = %request_id, "request rejected");
        self.load(request_id).await
    }

    pub async fn get_request(&self, request_id: RequestId) -> Result<RequestDetails, ApprovalError> {
        self.load(request_id).await
    }

    /// Requests matching the query, newest first.
    #[instrument(skip(self), err)]
    pub async fn list_requests(&self, query: ListRequests) -> Result<RequestPage, ApprovalError> {
        let page = query.page();
        let limit = query.limit();
        let offset = u64::from(page - 1) * u64::from(limit);

        let (data, total) = self
            .store
            .list_requests(query.filter(), offset, limit)
            .await?;
        Ok(RequestPage {
            data,
            total,
            page,
            limit,
        })
    }

    fn authorize(&self, reviewer: &Reviewer) -> Result<(), ApprovalError> {
        if !self.policy.can_approve(&reviewer.role) {
            return Err(DomainError::permission_denied(format!(
                "role '{}' cannot review requests",
                reviewer.role
            ))
            .into());
        }
        Ok(())
    }

    async fn load(&self, request_id: RequestId) -> Result<RequestDetails, ApprovalError> {
        self.store
            .find_request(request_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("request {request_id} not found")).into())
    }

    async fn submit(
        &self,
        kind: RequestType,
        input: NewRequest,
        created_by: UserId,
    ) -> Result<RequestDetails, ApprovalError> {
        let item_id = input.validate()?;
        let item = self
            .store
            .find_item(item_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("item {item_id} not found")))?;
        if kind == RequestType::Outbound {
            item.ensure_available(input.quantity)?;
        }

        let now = Utc::now();
        let request = Request::submit(kind, item_id, input.quantity, input.notes, created_by, now)?;

        let mut tx = self.store.begin().await?;
        let outcome = stage_submission(&mut tx, &request, now).await;
        finish(tx, outcome).await?;

        info!(request_id = %request.id, item_id = %item_id, kind = %kind, "request submitted");
        self.load(request.id).await
    }

    async fn settle_approval(
        &self,
        request_id: RequestId,
        approver: UserId,
    ) -> Result<StockMovement, ApprovalError> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let outcome = stage_approval(&mut tx, request_id, approver, now).await;
        finish(tx, outcome).await
    }
}

async fn stage_submission<T: StoreTransaction>(
    tx: &mut T,
    request: &Request,
    now: DateTime<Utc>,
) -> Result<(), ApprovalError> {
    tx.write_request(request).await?;
    let entry = AuditEntry::request_change(
        AuditAction::created(request.kind),
        request.created_by,
        request,
        now,
    )?;
    audit::record(tx, &entry).await
}

async fn stage_approval<T: StoreTransaction>(
    tx: &mut T,
    request_id: RequestId,
    approver: UserId,
    now: DateTime<Utc>,
) -> Result<StockMovement, ApprovalError> {
    let mut request = locked_request(tx, request_id).await?;
    request.complete(approver, now)?;

    let movement = ledger::settle(tx, request.kind, request.item_id, request.quantity, now).await?;
    tx.write_request(&request).await?;

    let entry =
        AuditEntry::stock_movement(AuditAction::approved(request.kind), approver, &movement, now)?;
    audit::record(tx, &entry).await?;
    Ok(movement)
}

async fn stage_rejection<T: StoreTransaction>(
    tx: &mut T,
    request_id: RequestId,
    reviewer: UserId,
    now: DateTime<Utc>,
) -> Result<(), ApprovalError> {
    let mut request = locked_request(tx, request_id).await?;
    request.reject(reviewer, now)?;
    tx.write_request(&request).await?;

    let entry = AuditEntry::request_change(AuditAction::Rejected, reviewer, &request, now)?;
    audit::record(tx, &entry).await
}

async fn locked_request<T: StoreTransaction>(
    tx: &mut T,
    request_id: RequestId,
) -> Result<Request, ApprovalError> {
    tx.locked_read_request(request_id)
        .await?
        .ok_or_else(|| DomainError::not_found(format!("request {request_id} not found")).into())
}

/// Commit on success, roll back on failure. The staged error wins over a
/// rollback failure.
async fn finish<T, V>(tx: T, outcome: Result<V, ApprovalError>) -> Result<V, ApprovalError>
where
    T: StoreTransaction,
{
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "rollback failed");
            }
            Err(err)
        }
    }
}
