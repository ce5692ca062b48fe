//! Persistence boundary for the approval path.
//!
//! A [`Store`] opens [`StoreTransaction`]s; every ledger, request and audit
//! write goes through one, so a unit of work either commits completely or
//! leaves no trace. Dropping an uncommitted transaction rolls it back.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use warehousex_auth::User;
use warehousex_core::{ItemId, RequestId};
use warehousex_inventory::InventoryItem;
use warehousex_requests::{Request, RequestStatus, RequestType};

use crate::audit::AuditEntry;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },

    /// Unique constraint hit (e.g. SKU or primary key already taken).
    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("failed to decode row: {0}")]
    Decode(String),

    #[error("store state poisoned")]
    Poisoned,
}

/// A request with its relations resolved, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDetails {
    #[serde(flatten)]
    pub request: Request,
    pub item: InventoryItem,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver: Option<User>,
}

/// Optional equality filters for request listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub kind: Option<RequestType>,
    pub status: Option<RequestStatus>,
}

impl RequestFilter {
    pub fn matches(&self, request: &Request) -> bool {
        self.kind.is_none_or(|kind| request.kind == kind)
            && self.status.is_none_or(|status| request.status == status)
    }
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Tx: StoreTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    async fn find_item(&self, id: ItemId) -> Result<Option<InventoryItem>, StoreError>;

    async fn find_request(&self, id: RequestId) -> Result<Option<RequestDetails>, StoreError>;

    /// Matching requests newest first, skipping `offset` and returning at
    /// most `limit`, plus the total number of matches.
    async fn list_requests(
        &self,
        filter: RequestFilter,
        offset: u64,
        limit: u32,
    ) -> Result<(Vec<RequestDetails>, u64), StoreError>;
}

/// A typed transaction context.
///
/// `locked_read_*` take an exclusive row lock that is held until the
/// transaction ends; concurrent lockers of the same row wait.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn locked_read_item(&mut self, id: ItemId) -> Result<Option<InventoryItem>, StoreError>;

    async fn locked_read_request(&mut self, id: RequestId) -> Result<Option<Request>, StoreError>;

    async fn write_item(&mut self, item: &InventoryItem) -> Result<(), StoreError>;

    /// Insert or update.
    async fn write_request(&mut self, request: &Request) -> Result<(), StoreError>;

    async fn write_audit_entry(&mut self, entry: &AuditEntry) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}
