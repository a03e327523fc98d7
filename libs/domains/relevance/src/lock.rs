use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::{RelevanceError, RelevanceResult};
use crate::models::Polarity;

/// Lock key serializing preference updates for one (user, polarity) slot.
pub fn preference_lock_key(user_id: Uuid, polarity: Polarity) -> String {
    format!("preference_lock:{}:{}", user_id, polarity.as_str())
}

/// Held lock, released explicitly through [`LockManager::release`].
///
/// The TTL passed at acquire time is a backstop: a crashed holder's lock
/// expires on its own.
#[derive(Debug)]
pub struct LockGuard {
    key: String,
    token: String,
    local: Option<OwnedMutexGuard<()>>,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Distributed mutual exclusion seam
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Acquire `key`, blocking up to `wait`. The lock auto-expires after
    /// `ttl` if never released.
    async fn acquire(&self, key: &str, ttl: Duration, wait: Duration)
    -> RelevanceResult<LockGuard>;

    /// Release a held lock. Releasing an already-expired lock is a no-op.
    async fn release(&self, guard: LockGuard) -> RelevanceResult<()>;
}

/// Redis-backed lock: SET NX PX to acquire, token-checked Lua script to
/// release so an expired-and-reacquired lock is never deleted by the old
/// holder.
pub struct RedisLockManager {
    conn: redis::aio::ConnectionManager,
}

const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(50);

const RELEASE_SCRIPT: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
"#;

impl RedisLockManager {
    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn connect(url: &str) -> RelevanceResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl LockManager for RedisLockManager {
    async fn acquire(
        &self,
        key: &str,
        ttl: Duration,
        wait: Duration,
    ) -> RelevanceResult<LockGuard> {
        let token = Uuid::new_v4().to_string();
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            let mut conn = self.conn.clone();
            let acquired: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(ttl.as_millis() as u64)
                .query_async(&mut conn)
                .await?;

            if acquired.is_some() {
                return Ok(LockGuard {
                    key: key.to_string(),
                    token,
                    local: None,
                });
            }

            if tokio::time::Instant::now() + ACQUIRE_POLL_INTERVAL > deadline {
                return Err(RelevanceError::LockTimeout(key.to_string()));
            }
            tokio::time::sleep(ACQUIRE_POLL_INTERVAL).await;
        }
    }

    async fn release(&self, guard: LockGuard) -> RelevanceResult<()> {
        let mut conn = self.conn.clone();
        let _released: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(&guard.key)
            .arg(&guard.token)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}

/// Process-local lock manager: one keyed mutex per lock key.
///
/// Suitable for single-worker deployments and tests. The TTL backstop is not
/// needed here since a dropped guard unlocks immediately.
#[derive(Default)]
pub struct LocalLockManager {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LocalLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl LockManager for LocalLockManager {
    async fn acquire(
        &self,
        key: &str,
        _ttl: Duration,
        wait: Duration,
    ) -> RelevanceResult<LockGuard> {
        let slot = self.slot(key).await;
        let local = tokio::time::timeout(wait, slot.lock_owned())
            .await
            .map_err(|_| RelevanceError::LockTimeout(key.to_string()))?;

        Ok(LockGuard {
            key: key.to_string(),
            token: Uuid::new_v4().to_string(),
            local: Some(local),
        })
    }

    async fn release(&self, guard: LockGuard) -> RelevanceResult<()> {
        drop(guard.local);
        Ok(())
    }
}
