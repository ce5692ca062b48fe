//! Short-lived per-item mutual exclusion across processes.
//!
//! A lease lives under `lock:item:<item_id>` with a unique token and a fixed
//! expiry. Acquisition never waits: a held key fails fast with
//! [`LockError::Busy`]. Release is compare-and-delete on the token, so a
//! holder whose lease expired can never delete a successor's lease.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use in_memory::InMemoryLock;
#[cfg(feature = "redis")]
pub use self::redis::RedisLock;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use warehousex_core::ItemId;

pub const LEASE_KEY_PREFIX: &str = "lock:item:";
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(10);

pub fn lease_key(item_id: ItemId) -> String {
    format!("{LEASE_KEY_PREFIX}{item_id}")
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("item {0} is locked by another approval")]
    Busy(ItemId),

    #[error("lock backend error: {0}")]
    Backend(String),
}

/// Proof of a held lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub item_id: ItemId,
    pub key: String,
    pub token: Uuid,
}

impl Lease {
    pub fn new(item_id: ItemId) -> Self {
        Self {
            item_id,
            key: lease_key(item_id),
            token: Uuid::now_v7(),
        }
    }
}

#[async_trait]
pub trait CoordinationLock: Send + Sync + 'static {
    async fn acquire(&self, item_id: ItemId) -> Result<Lease, LockError>;

    /// `Ok(false)` when the lease had already expired or been taken over.
    async fn release(&self, lease: &Lease) -> Result<bool, LockError>;
}

/// Holds a lease until released.
///
/// Call [`LeaseGuard::release`] on every normal exit. If the guard is dropped
/// while still holding (panic, cancelled future) the release is spawned onto
/// the current runtime; with no runtime the lease simply expires.
pub struct LeaseGuard<L: CoordinationLock> {
    lock: Arc<L>,
    lease: Option<Lease>,
}

impl<L: CoordinationLock> LeaseGuard<L> {
    pub async fn acquire(lock: &Arc<L>, item_id: ItemId) -> Result<Self, LockError> {
        let lease = lock.acquire(item_id).await?;
        debug!(item_id = %item_id, key = %lease.key, "lease acquired");
        Ok(Self {
            lock: Arc::clone(lock),
            lease: Some(lease),
        })
    }

    pub fn lease(&self) -> Option<&Lease> {
        self.lease.as_ref()
    }

    pub async fn release(mut self) {
        if let Some(lease) = self.lease.take() {
            release_logged(self.lock.as_ref(), &lease).await;
        }
    }
}

impl<L: CoordinationLock> Drop for LeaseGuard<L> {
    fn drop(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let lock = Arc::clone(&self.lock);
                handle.spawn(async move {
                    release_logged(lock.as_ref(), &lease).await;
                });
            }
            Err(_) => {
                warn!(key = %lease.key, "no runtime to release lease; leaving it to expire");
            }
        }
    }
}

async fn release_logged<L: CoordinationLock + ?Sized>(lock: &L, lease: &Lease) {
    match lock.release(lease).await {
        Ok(true) => debug!(key = %lease.key, "lease released"),
        Ok(false) => warn!(key = %lease.key, "lease already expired or taken over"),
        Err(e) => warn!(key = %lease.key, error = %e, "lease release failed"),
    }
}

/// Run `section` while holding the lease for `item_id`.
///
/// The lease is released whatever `section` returns.
pub async fn with_lease<L, F, Fut, T, E>(lock: &Arc<L>, item_id: ItemId, section: F) -> Result<T, E>
where
    L: CoordinationLock,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<LockError>,
{
    let guard = LeaseGuard::acquire(lock, item_id).await?;
    let outcome = section().await;
    guard.release().await;
    outcome
}
