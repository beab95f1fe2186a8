//! Distributed mutex over Redis.
//!
//! Acquisition is a plain `SET key token NX PX ttl` (already atomic). Release
//! needs a compare-and-delete so a holder can never release a lock it no
//! longer owns (`openibank-db::cache::CacheManager::release_lock` just does
//! an unconditional `DEL`, which would let an expired holder delete someone
//! else's fresh lock) — done via a Lua script, `redis`'s `Script` API.

use std::time::Duration;

use deadpool_redis::Pool as RedisPool;
use redis::Script;
use uuid::Uuid;

use crate::error::{LockError, LockResult};

const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// Opaque proof of ownership returned by a successful `try_acquire`. Only the
/// holder presenting the matching token can release the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub struct DistributedMutex {
    pool: RedisPool,
}

impl DistributedMutex {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    fn key(name: &str) -> String {
        format!("lock:{name}")
    }

    pub async fn try_acquire(&self, name: &str, ttl: Duration) -> LockResult<Option<LockToken>> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| LockError::Connection(e.to_string()))?;
        let token = LockToken::new();
        let set: Option<String> = redis::cmd("SET")
            .arg(Self::key(name))
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| LockError::ScriptError(e.to_string()))?;
        Ok(set.map(|_| token))
    }

    pub async fn release(&self, name: &str, token: &LockToken) -> LockResult<bool> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| LockError::Connection(e.to_string()))?;
        let deleted: i64 = Script::new(RELEASE_SCRIPT)
            .key(Self::key(name))
            .arg(token.as_str())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| LockError::ScriptError(e.to_string()))?;
        Ok(deleted > 0)
    }
}
