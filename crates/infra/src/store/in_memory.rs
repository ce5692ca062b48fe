use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};

use warehousex_auth::User;
use warehousex_core::{ItemId, RequestId, UserId};
use warehousex_inventory::InventoryItem;
use warehousex_requests::Request;

use super::{RequestDetails, RequestFilter, Store, StoreError, StoreTransaction};
use crate::audit::AuditEntry;

#[derive(Debug, Default)]
struct Tables {
    items: HashMap<ItemId, InventoryItem>,
    requests: HashMap<RequestId, Request>,
    users: HashMap<UserId, User>,
    audit_log: Vec<AuditEntry>,
}

/// Per-row exclusive locks, created on first use.
#[derive(Debug)]
struct RowLocks<K> {
    rows: Mutex<HashMap<K, Arc<RowMutex<()>>>>,
}

impl<K> Default for RowLocks<K> {
    fn default() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Copy> RowLocks<K> {
    async fn lock(&self, key: K) -> Result<OwnedMutexGuard<()>, StoreError> {
        let row = {
            let mut rows = self.rows.lock().map_err(|_| StoreError::Poisoned)?;
            Arc::clone(rows.entry(key).or_default())
        };
        Ok(row.lock_owned().await)
    }
}

#[derive(Debug, Default)]
struct Shared {
    tables: RwLock<Tables>,
    item_rows: RowLocks<ItemId>,
    request_rows: RowLocks<RequestId>,
}

/// In-memory store with row-lock emulation.
///
/// Intended for tests/dev. Locked reads take a per-row async mutex that the
/// transaction keeps until it commits or is dropped; writes are staged and
/// applied in one step on commit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an item. SKUs are unique.
    pub fn insert_item(&self, item: InventoryItem) -> Result<(), StoreError> {
        let mut tables = self.shared.tables.write().map_err(|_| StoreError::Poisoned)?;
        if tables
            .items
            .values()
            .any(|existing| existing.sku == item.sku && existing.id != item.id)
        {
            return Err(StoreError::Duplicate(format!("sku '{}' already exists", item.sku)));
        }
        tables.items.insert(item.id, item);
        Ok(())
    }

    pub fn insert_user(&self, user: User) -> Result<(), StoreError> {
        let mut tables = self.shared.tables.write().map_err(|_| StoreError::Poisoned)?;
        tables.users.insert(user.id, user);
        Ok(())
    }

    /// Committed state of an item.
    pub fn item(&self, id: ItemId) -> Option<InventoryItem> {
        self.read_tables().items.get(&id).cloned()
    }

    /// Committed state of a request.
    pub fn request(&self, id: RequestId) -> Option<Request> {
        self.read_tables().requests.get(&id).cloned()
    }

    /// Committed audit log, oldest first.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.read_tables().audit_log.clone()
    }

    fn read_tables(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.shared
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(InMemoryTransaction {
            shared: Arc::clone(&self.shared),
            item_guards: HashMap::new(),
            request_guards: HashMap::new(),
            items: HashMap::new(),
            requests: HashMap::new(),
            audit: Vec::new(),
        })
    }

    async fn find_item(&self, id: ItemId) -> Result<Option<InventoryItem>, StoreError> {
        let tables = self.shared.tables.read().map_err(|_| StoreError::Poisoned)?;
        Ok(tables.items.get(&id).cloned())
    }

    async fn find_request(&self, id: RequestId) -> Result<Option<RequestDetails>, StoreError> {
        let tables = self.shared.tables.read().map_err(|_| StoreError::Poisoned)?;
        tables
            .requests
            .get(&id)
            .map(|request| tables.details(request.clone()))
            .transpose()
    }

    async fn list_requests(
        &self,
        filter: RequestFilter,
        offset: u64,
        limit: u32,
    ) -> Result<(Vec<RequestDetails>, u64), StoreError> {
        let tables = self.shared.tables.read().map_err(|_| StoreError::Poisoned)?;
        let mut matching: Vec<&Request> = tables
            .requests
            .values()
            .filter(|request| filter.matches(request))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(limit as usize)
            .map(|request| tables.details(request.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((page, total))
    }
}

impl Tables {
    fn details(&self, request: Request) -> Result<RequestDetails, StoreError> {
        let item = self.items.get(&request.item_id).cloned().ok_or_else(|| {
            StoreError::Decode(format!(
                "request {} references missing item {}",
                request.id, request.item_id
            ))
        })?;
        let creator = self.users.get(&request.created_by).cloned();
        let approver = request
            .approved_by
            .and_then(|user_id| self.users.get(&user_id).cloned());

        Ok(RequestDetails {
            request,
            item,
            creator,
            approver,
        })
    }
}

/// Unit of work against an [`InMemoryStore`].
#[derive(Debug)]
pub struct InMemoryTransaction {
    shared: Arc<Shared>,
    item_guards: HashMap<ItemId, OwnedMutexGuard<()>>,
    request_guards: HashMap<RequestId, OwnedMutexGuard<()>>,
    items: HashMap<ItemId, InventoryItem>,
    requests: HashMap<RequestId, Request>,
    audit: Vec<AuditEntry>,
}

impl InMemoryTransaction {
    async fn lock_item(&mut self, id: ItemId) -> Result<(), StoreError> {
        if !self.item_guards.contains_key(&id) {
            let guard = self.shared.item_rows.lock(id).await?;
            self.item_guards.insert(id, guard);
        }
        Ok(())
    }

    async fn lock_request(&mut self, id: RequestId) -> Result<(), StoreError> {
        if !self.request_guards.contains_key(&id) {
            let guard = self.shared.request_rows.lock(id).await?;
            self.request_guards.insert(id, guard);
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn locked_read_item(&mut self, id: ItemId) -> Result<Option<InventoryItem>, StoreError> {
        self.lock_item(id).await?;
        if let Some(staged) = self.items.get(&id) {
            return Ok(Some(staged.clone()));
        }
        let tables = self.shared.tables.read().map_err(|_| StoreError::Poisoned)?;
        Ok(tables.items.get(&id).cloned())
    }

    async fn locked_read_request(&mut self, id: RequestId) -> Result<Option<Request>, StoreError> {
        self.lock_request(id).await?;
        if let Some(staged) = self.requests.get(&id) {
            return Ok(Some(staged.clone()));
        }
        let tables = self.shared.tables.read().map_err(|_| StoreError::Poisoned)?;
        Ok(tables.requests.get(&id).cloned())
    }

    async fn write_item(&mut self, item: &InventoryItem) -> Result<(), StoreError> {
        if item.quantity < 0 {
            return Err(StoreError::Database {
                operation: "write_item",
                message: format!("quantity check violated for item {}", item.id),
            });
        }
        self.lock_item(item.id).await?;
        self.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn write_request(&mut self, request: &Request) -> Result<(), StoreError> {
        self.lock_request(request.id).await?;
        self.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn write_audit_entry(&mut self, entry: &AuditEntry) -> Result<(), StoreError> {
        self.audit.push(entry.clone());
        Ok(())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        let mut tables = self.shared.tables.write().map_err(|_| StoreError::Poisoned)?;

        if let Some(dup) = self
            .audit
            .iter()
            .find(|staged| tables.audit_log.iter().any(|e| e.id == staged.id))
        {
            return Err(StoreError::Duplicate(format!("audit entry {} already exists", dup.id)));
        }

        tables.items.extend(self.items.drain());
        tables.requests.extend(self.requests.drain());
        tables.audit_log.append(&mut self.audit);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}
