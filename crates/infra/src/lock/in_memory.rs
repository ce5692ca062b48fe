use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;

use warehousex_core::ItemId;

use super::{CoordinationLock, Lease, LockError, lease_key};

/// Process-local lease table with expiry.
///
/// Intended for tests/dev and single-process deployments.
#[derive(Debug)]
pub struct InMemoryLock {
    ttl: Duration,
    leases: Mutex<HashMap<String, (Uuid, Instant)>>,
}

impl InMemoryLock {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            leases: Mutex::new(HashMap::new()),
        }
    }

    /// Whether an unexpired lease exists for `item_id`.
    pub fn is_held(&self, item_id: ItemId) -> bool {
        let leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
        leases
            .get(&lease_key(item_id))
            .is_some_and(|(_, expires_at)| *expires_at > Instant::now())
    }
}

impl Default for InMemoryLock {
    fn default() -> Self {
        Self::new(super::DEFAULT_LEASE_TTL)
    }
}

#[async_trait]
impl CoordinationLock for InMemoryLock {
    async fn acquire(&self, item_id: ItemId) -> Result<Lease, LockError> {
        let lease = Lease::new(item_id);
        let now = Instant::now();
        let mut leases = self
            .leases
            .lock()
            .map_err(|_| LockError::Backend("lease table poisoned".to_string()))?;

        if let Some((_, expires_at)) = leases.get(&lease.key) {
            if *expires_at > now {
                return Err(LockError::Busy(item_id));
            }
        }
        leases.insert(lease.key.clone(), (lease.token, now + self.ttl));
        Ok(lease)
    }

    async fn release(&self, lease: &Lease) -> Result<bool, LockError> {
        let mut leases = self
            .leases
            .lock()
            .map_err(|_| LockError::Backend("lease table poisoned".to_string()))?;

        match leases.get(&lease.key) {
            Some((token, _)) if *token == lease.token => {
                leases.remove(&lease.key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_is_busy_until_release() {
        let lock = InMemoryLock::default();
        let item_id = ItemId::new();

        let lease = lock.acquire(item_id).await.unwrap();
        assert!(matches!(lock.acquire(item_id).await, Err(LockError::Busy(_))));

        assert!(lock.release(&lease).await.unwrap());
        assert!(lock.acquire(item_id).await.is_ok());
    }

    #[tokio::test]
    async fn expired_lease_can_be_taken_over_and_stale_release_is_a_no_op() {
        let lock = InMemoryLock::new(Duration::from_millis(10));
        let item_id = ItemId::new();

        let stale = lock.acquire(item_id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!lock.is_held(item_id));

        let fresh = lock.acquire(item_id).await.unwrap();
        assert!(!lock.release(&stale).await.unwrap());
        assert!(lock.is_held(item_id));
        assert!(lock.release(&fresh).await.unwrap());
    }

    #[tokio::test]
    async fn leases_are_per_item() {
        let lock = InMemoryLock::default();
        let _a = lock.acquire(ItemId::new()).await.unwrap();
        assert!(lock.acquire(ItemId::new()).await.is_ok());
    }
}
