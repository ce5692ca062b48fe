//! Redis-backed lease (`SET key token NX EX ttl` + Lua compare-and-delete).

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;

use warehousex_core::ItemId;

use super::{CoordinationLock, Lease, LockError};

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

#[derive(Clone)]
pub struct RedisLock {
    conn: MultiplexedConnection,
    ttl: Duration,
    release: std::sync::Arc<redis::Script>,
}

impl RedisLock {
    pub async fn connect(redis_url: impl AsRef<str>, ttl: Duration) -> Result<Self, LockError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| LockError::Backend(format!("failed to create redis client: {e}")))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| LockError::Backend(format!("failed to connect to redis: {e}")))?;

        Ok(Self {
            conn,
            ttl,
            release: std::sync::Arc::new(redis::Script::new(RELEASE_SCRIPT)),
        })
    }

    fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs().max(1)
    }
}

#[async_trait]
impl CoordinationLock for RedisLock {
    async fn acquire(&self, item_id: ItemId) -> Result<Lease, LockError> {
        let lease = Lease::new(item_id);
        let mut conn = self.conn.clone();

        let reply: Option<String> = redis::cmd("SET")
            .arg(&lease.key)
            .arg(lease.token.to_string())
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs())
            .query_async(&mut conn)
            .await
            .map_err(|e| LockError::Backend(format!("SET NX failed: {e}")))?;

        match reply {
            Some(_) => Ok(lease),
            None => Err(LockError::Busy(item_id)),
        }
    }

    async fn release(&self, lease: &Lease) -> Result<bool, LockError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .release
            .key(&lease.key)
            .arg(lease.token.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| LockError::Backend(format!("release script failed: {e}")))?;
        Ok(deleted == 1)
    }
}
