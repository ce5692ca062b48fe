//! Backend selection and the approval coordinator behind the routes.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use warehousex_auth::{Reviewer, RolePolicy};
use warehousex_core::{RequestId, UserId};
use warehousex_infra::{
    ApprovalCoordinator, ApprovalError, Config, InMemoryLock, InMemoryStore, ListRequests,
    LockError, NewRequest, PostgresStore, RequestDetails, RequestPage, StoreError,
};
#[cfg(feature = "redis")]
use warehousex_infra::lock::RedisLock;

type InMemoryCoordinator = ApprovalCoordinator<InMemoryStore, InMemoryLock>;
type PostgresCoordinator = ApprovalCoordinator<PostgresStore, InMemoryLock>;
#[cfg(feature = "redis")]
type PersistentCoordinator = ApprovalCoordinator<PostgresStore, RedisLock>;

#[derive(Debug, Error)]
pub enum ServicesError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// The coordinator wired to whichever backends the configuration selects.
pub enum AppServices {
    /// In-memory store + in-process lease table (dev/tests).
    InMemory { coordinator: InMemoryCoordinator },
    /// Postgres store, single-process leases.
    Postgres { coordinator: PostgresCoordinator },
    /// Postgres store + Redis leases (multi-process deployments).
    #[cfg(feature = "redis")]
    Persistent { coordinator: PersistentCoordinator },
}

macro_rules! with_coordinator {
    ($services:expr, $c:ident => $body:expr) => {
        match $services {
            AppServices::InMemory { coordinator: $c } => $body,
            AppServices::Postgres { coordinator: $c } => $body,
            #[cfg(feature = "redis")]
            AppServices::Persistent { coordinator: $c } => $body,
        }
    };
}

impl AppServices {
    pub fn in_memory(store: InMemoryStore, locks: Arc<InMemoryLock>, policy: RolePolicy) -> Self {
        AppServices::InMemory {
            coordinator: ApprovalCoordinator::new(store, locks, policy),
        }
    }

    pub fn backend(&self) -> &'static str {
        match self {
            AppServices::InMemory { .. } => "in_memory",
            AppServices::Postgres { .. } => "postgres",
            #[cfg(feature = "redis")]
            AppServices::Persistent { .. } => "postgres+redis",
        }
    }

    pub fn policy(&self) -> &RolePolicy {
        with_coordinator!(self, c => c.policy())
    }

    pub async fn create_inbound_request(
        &self,
        input: NewRequest,
        created_by: UserId,
    ) -> Result<RequestDetails, ApprovalError> {
        with_coordinator!(self, c => c.create_inbound_request(input, created_by).await)
    }

    pub async fn create_outbound_request(
        &self,
        input: NewRequest,
        created_by: UserId,
    ) -> Result<RequestDetails, ApprovalError> {
        with_coordinator!(self, c => c.create_outbound_request(input, created_by).await)
    }

    pub async fn approve_request(
        &self,
        request_id: RequestId,
        reviewer: &Reviewer,
    ) -> Result<RequestDetails, ApprovalError> {
        with_coordinator!(self, c => c.approve_request(request_id, reviewer).await)
    }

    pub async fn reject_request(
        &self,
        request_id: RequestId,
        reviewer: &Reviewer,
    ) -> Result<RequestDetails, ApprovalError> {
        with_coordinator!(self, c => c.reject_request(request_id, reviewer).await)
    }

    pub async fn get_request(&self, request_id: RequestId) -> Result<RequestDetails, ApprovalError> {
        with_coordinator!(self, c => c.get_request(request_id).await)
    }

    pub async fn list_requests(&self, query: ListRequests) -> Result<RequestPage, ApprovalError> {
        with_coordinator!(self, c => c.list_requests(query).await)
    }
}

/// Build services from configuration.
///
/// Missing `DATABASE_URL` falls back to the in-memory store; missing
/// `REDIS_URL` falls back to the in-process lease table, which only
/// serializes approvals within this process.
pub async fn build_services(config: &Config) -> Result<AppServices, ServicesError> {
    let policy = RolePolicy::default();

    let Some(database_url) = config.database_url.as_deref() else {
        warn!("DATABASE_URL not set; using in-memory store");
        if config.redis_url.is_some() {
            warn!("REDIS_URL ignored without DATABASE_URL");
        }
        return Ok(AppServices::in_memory(
            InMemoryStore::new(),
            Arc::new(InMemoryLock::new(config.lock_ttl)),
            policy,
        ));
    };

    let store = PostgresStore::connect(database_url, config.db_max_connections).await?;
    store.apply_schema().await?;
    info!(max_connections = config.db_max_connections, "postgres store ready");

    if let Some(services) = redis_services(config, &store, &policy).await? {
        return Ok(services);
    }

    warn!("REDIS_URL not set; leases are process-local");
    Ok(AppServices::Postgres {
        coordinator: ApprovalCoordinator::new(
            store,
            Arc::new(InMemoryLock::new(config.lock_ttl)),
            policy,
        ),
    })
}

#[cfg(feature = "redis")]
async fn redis_services(
    config: &Config,
    store: &PostgresStore,
    policy: &RolePolicy,
) -> Result<Option<AppServices>, ServicesError> {
    let Some(redis_url) = config.redis_url.as_deref() else {
        return Ok(None);
    };
    let locks = RedisLock::connect(redis_url, config.lock_ttl).await?;
    info!(lock_ttl_secs = config.lock_ttl.as_secs(), "redis leases ready");

    Ok(Some(AppServices::Persistent {
        coordinator: ApprovalCoordinator::new(store.clone(), Arc::new(locks), policy.clone()),
    }))
}

#[cfg(not(feature = "redis"))]
async fn redis_services(
    config: &Config,
    _store: &PostgresStore,
    _policy: &RolePolicy,
) -> Result<Option<AppServices>, ServicesError> {
    if config.redis_url.is_some() {
        warn!("built without the `redis` feature; REDIS_URL ignored");
    }
    Ok(None)
}
