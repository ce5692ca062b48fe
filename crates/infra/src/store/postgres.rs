//! Postgres-backed store.
//!
//! Row locks are real `SELECT ... FOR UPDATE` locks taken inside a
//! `sqlx::Transaction`; an uncommitted transaction rolls back when dropped.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Database (other) | any other | `Database` |
//! | column decode failure | N/A | `Decode` |
//! | anything else | N/A | `Database` |

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use warehousex_auth::{Role, User};
use warehousex_core::{ItemId, RequestId, UserId};
use warehousex_inventory::InventoryItem;
use warehousex_requests::{Request, RequestStatus, RequestType};

use super::{RequestDetails, RequestFilter, Store, StoreError, StoreTransaction};
use crate::audit::AuditEntry;

const SCHEMA: &str = include_str!("../../migrations/0001_warehouse.sql");

const ITEM_COLUMNS: &str =
    "id, item_name, sku, quantity, unit, version, created_at, updated_at";
const REQUEST_COLUMNS: &str =
    "id, type, status, item_id, quantity, notes, created_by, approved_by, created_at, updated_at";
// NULL parameters disable the corresponding filter.
const REQUEST_FILTER: &str = "($1::text IS NULL OR type = $1) AND ($2::text IS NULL OR status = $2)";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables if missing. Idempotent.
    pub async fn apply_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("apply_schema", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Register an item outside the approval path (seeding, tests).
    pub async fn insert_item(&self, item: &InventoryItem) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;
        tx.write_item(item).await?;
        tx.commit().await
    }

    pub async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, role)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
                SET name = EXCLUDED.name, email = EXCLUDED.email, role = EXCLUDED.role
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;
        Ok(())
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT id, name, email, role FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user", e))?;
        row.as_ref().map(user_from_row).transpose()
    }
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresTransaction { tx })
    }

    #[instrument(skip(self), fields(item_id = %id), err)]
    async fn find_item(&self, id: ItemId) -> Result<Option<InventoryItem>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM inventory WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_item", e))?;
        row.as_ref().map(item_from_row).transpose()
    }

    #[instrument(skip(self), fields(request_id = %id), err)]
    async fn find_request(&self, id: RequestId) -> Result<Option<RequestDetails>, StoreError> {
        let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_request", e))?;
        let Some(request) = row.as_ref().map(request_from_row).transpose()? else {
            return Ok(None);
        };
        self.details(request).await.map(Some)
    }

    #[instrument(skip(self), err)]
    async fn list_requests(
        &self,
        filter: RequestFilter,
        offset: u64,
        limit: u32,
    ) -> Result<(Vec<RequestDetails>, u64), StoreError> {
        let kind = filter.kind.map(|kind| kind.as_str());
        let status = filter.status.map(|status| status.as_str());

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM requests WHERE {REQUEST_FILTER}"
        ))
        .bind(kind)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_requests", e))?;

        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM requests WHERE {REQUEST_FILTER} \
             ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4"
        ))
        .bind(kind)
        .bind(status)
        .bind(i64::from(limit))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_requests", e))?;

        let mut page = Vec::with_capacity(rows.len());
        for row in &rows {
            page.push(self.details(request_from_row(row)?).await?);
        }
        Ok((page, u64::try_from(total).unwrap_or_default()))
    }
}

impl PostgresStore {
    async fn details(&self, request: Request) -> Result<RequestDetails, StoreError> {
        let item = self.find_item(request.item_id).await?.ok_or_else(|| {
            StoreError::Decode(format!(
                "request {} references missing item {}",
                request.id, request.item_id
            ))
        })?;
        let creator = self.find_user(request.created_by).await?;
        let approver = match request.approved_by {
            Some(user_id) => self.find_user(user_id).await?,
            None => None,
        };

        Ok(RequestDetails {
            request,
            item,
            creator,
            approver,
        })
    }
}

pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn locked_read_item(&mut self, id: ItemId) -> Result<Option<InventoryItem>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM inventory WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("locked_read_item", e))?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn locked_read_request(&mut self, id: RequestId) -> Result<Option<Request>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM requests WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("locked_read_request", e))?;
        row.as_ref().map(request_from_row).transpose()
    }

    async fn write_item(&mut self, item: &InventoryItem) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO inventory (id, item_name, sku, quantity, unit, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE
                SET item_name = EXCLUDED.item_name,
                    sku = EXCLUDED.sku,
                    quantity = EXCLUDED.quantity,
                    unit = EXCLUDED.unit,
                    version = EXCLUDED.version,
                    updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(&item.item_name)
        .bind(&item.sku)
        .bind(item.quantity)
        .bind(&item.unit)
        .bind(item.version)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("write_item", e))?;
        Ok(())
    }

    async fn write_request(&mut self, request: &Request) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO requests (id, type, status, item_id, quantity, notes, created_by, approved_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE
                SET status = EXCLUDED.status,
                    notes = EXCLUDED.notes,
                    approved_by = EXCLUDED.approved_by,
                    updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(request.id.as_uuid())
        .bind(request.kind.as_str())
        .bind(request.status.as_str())
        .bind(request.item_id.as_uuid())
        .bind(request.quantity)
        .bind(&request.notes)
        .bind(request.created_by.as_uuid())
        .bind(request.approved_by.map(Uuid::from))
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("write_request", e))?;
        Ok(())
    }

    async fn write_audit_entry(&mut self, entry: &AuditEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, entity, entity_id, action, user_id, before, after, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(&entry.entity)
        .bind(entry.entity_id)
        .bind(entry.action.as_str())
        .bind(entry.user_id.as_uuid())
        .bind(&entry.before)
        .bind(&entry.after)
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("write_audit_entry", e))?;
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn decode<T>(column: &'static str, value: Result<T, sqlx::Error>) -> Result<T, StoreError> {
    value.map_err(|e| StoreError::Decode(format!("column {column}: {e}")))
}

fn item_from_row(row: &PgRow) -> Result<InventoryItem, StoreError> {
    Ok(InventoryItem {
        id: ItemId::from_uuid(decode("id", row.try_get::<Uuid, _>("id"))?),
        item_name: decode("item_name", row.try_get("item_name"))?,
        sku: decode("sku", row.try_get("sku"))?,
        quantity: decode("quantity", row.try_get("quantity"))?,
        unit: decode("unit", row.try_get("unit"))?,
        version: decode("version", row.try_get("version"))?,
        created_at: decode("created_at", row.try_get("created_at"))?,
        updated_at: decode("updated_at", row.try_get("updated_at"))?,
    })
}

fn request_from_row(row: &PgRow) -> Result<Request, StoreError> {
    let kind: String = decode("type", row.try_get("type"))?;
    let status: String = decode("status", row.try_get("status"))?;
    let approved_by: Option<Uuid> = decode("approved_by", row.try_get("approved_by"))?;

    Ok(Request {
        id: RequestId::from_uuid(decode("id", row.try_get::<Uuid, _>("id"))?),
        kind: RequestType::from_str(&kind).map_err(|e| StoreError::Decode(e.to_string()))?,
        status: RequestStatus::from_str(&status).map_err(|e| StoreError::Decode(e.to_string()))?,
        item_id: ItemId::from_uuid(decode("item_id", row.try_get::<Uuid, _>("item_id"))?),
        quantity: decode("quantity", row.try_get("quantity"))?,
        notes: decode("notes", row.try_get("notes"))?,
        created_by: UserId::from_uuid(decode("created_by", row.try_get::<Uuid, _>("created_by"))?),
        approved_by: approved_by.map(UserId::from_uuid),
        created_at: decode("created_at", row.try_get("created_at"))?,
        updated_at: decode("updated_at", row.try_get("updated_at"))?,
    })
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    let role: String = decode("role", row.try_get("role"))?;
    Ok(User {
        id: UserId::from_uuid(decode("id", row.try_get::<Uuid, _>("id"))?),
        name: decode("name", row.try_get("name"))?,
        email: decode("email", row.try_get("email"))?,
        role: Role::new(role),
    })
}

fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_string();
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Duplicate(format!("{operation}: {message}")),
                _ => StoreError::Database { operation, message },
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Decode(format!("{operation}: {err}"))
        }
        other => StoreError::Database {
            operation,
            message: other.to_string(),
        },
    }
}
