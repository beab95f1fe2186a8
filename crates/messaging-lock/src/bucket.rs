//! Server-side token bucket, generalizing `openibank-db::cache::CacheManager`'s
//! `rate_limit_incr` + `check_rate_limit` pair into one atomic round trip so
//! the increment and the limit check can't race between two calls.

use std::time::Duration;

use deadpool_redis::Pool as RedisPool;
use redis::Script;

use crate::error::{LockError, LockResult};

const EVALUATE_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current == false then
    redis.call('SET', KEYS[1], 1, 'PX', ARGV[2])
    return {1, tonumber(ARGV[2])}
end
local count = tonumber(current)
if count >= tonumber(ARGV[1]) then
    local ttl = redis.call('PTTL', KEYS[1])
    return {-1, ttl}
end
local updated = redis.call('INCR', KEYS[1])
local ttl = redis.call('PTTL', KEYS[1])
return {updated, ttl}
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketResult {
    pub count: i64,
    pub ttl: Duration,
    pub ok: bool,
}

pub struct RedisTokenBucket {
    pool: RedisPool,
}

impl RedisTokenBucket {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    fn key(name: &str) -> String {
        format!("rate:{name}")
    }

    pub async fn evaluate(&self, name: &str, max: i64, window: Duration) -> LockResult<BucketResult> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| LockError::Connection(e.to_string()))?;
        let (count, ttl_ms): (i64, i64) = Script::new(EVALUATE_SCRIPT)
            .key(Self::key(name))
            .arg(max)
            .arg(window.as_millis() as u64)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| LockError::ScriptError(e.to_string()))?;
        Ok(BucketResult {
            count,
            ttl: Duration::from_millis(ttl_ms.max(0) as u64),
            ok: count >= 0 && count <= max,
        })
    }
}
