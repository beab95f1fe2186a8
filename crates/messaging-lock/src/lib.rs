//! Distributed mutex and rate-limit backend.
//!
//! `LockBackend` owns an optional Redis connection pool. When present, locks
//! and token buckets run as atomic Redis operations/scripts. When absent —
//! deliberately, e.g. in embedded/local deployments — mutex acquisition
//! returns `None` (the caller decides whether to proceed or skip, per spec)
//! and rate limiting falls back to `InMemoryBucket`, unless the caller is
//! running in strict mode, in which case bucket evaluation surfaces a typed
//! error instead of silently degrading.

mod bucket;
mod error;
mod memory;
mod mutex;

pub use bucket::BucketResult;
pub use error::{LockError, LockResult};
pub use memory::InMemoryBucket;
pub use mutex::{DistributedMutex, LockToken};

use std::time::Duration;

use deadpool_redis::Pool as RedisPool;

pub struct LockBackend {
    redis: Option<RedisPool>,
    fallback: InMemoryBucket,
}

impl LockBackend {
    pub fn new(redis: Option<RedisPool>) -> Self {
        Self {
            redis,
            fallback: InMemoryBucket::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn is_connected(&self) -> bool {
        self.redis.is_some()
    }

    /// `tryAcquire`. Returns `None` both on a held lock and on a missing
    /// backend — the caller can't distinguish, and is left to decide
    /// whether to proceed or skip either way.
    pub async fn try_acquire(&self, key: &str, ttl: Duration) -> LockResult<Option<LockToken>> {
        match &self.redis {
            Some(pool) => DistributedMutex::new(pool.clone()).try_acquire(key, ttl).await,
            None => Ok(None),
        }
    }

    pub async fn release(&self, key: &str, token: &LockToken) -> LockResult<bool> {
        match &self.redis {
            Some(pool) => DistributedMutex::new(pool.clone()).release(key, token).await,
            None => Ok(false),
        }
    }

    /// Token-bucket evaluation. `ip`/`route` are only used for the in-memory
    /// fallback key; the Redis path keys purely on `key`.
    pub async fn evaluate_bucket(
        &self,
        key: &str,
        ip: &str,
        route: &str,
        max: i64,
        window: Duration,
        strict: bool,
    ) -> LockResult<BucketResult> {
        match &self.redis {
            Some(pool) => bucket::RedisTokenBucket::new(pool.clone()).evaluate(key, max, window).await,
            None if strict => Err(LockError::Connection(
                "rate-limit backend unavailable in strict mode".into(),
            )),
            None => Ok(self.fallback.evaluate(ip, route, max, window)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_backend_never_blocks_acquire() {
        let backend = LockBackend::disabled();
        let acquired = backend.try_acquire("worker", Duration::from_secs(5)).await.unwrap();
        assert!(acquired.is_none());
    }

    #[tokio::test]
    async fn disabled_backend_falls_back_to_memory_outside_strict_mode() {
        let backend = LockBackend::disabled();
        let result = backend
            .evaluate_bucket("send:alice", "1.1.1.1", "/send", 2, Duration::from_secs(60), false)
            .await
            .unwrap();
        assert!(result.ok);
    }

    #[tokio::test]
    async fn disabled_backend_errors_in_strict_mode() {
        let backend = LockBackend::disabled();
        let result = backend
            .evaluate_bucket("send:alice", "1.1.1.1", "/send", 2, Duration::from_secs(60), true)
            .await;
        assert!(result.is_err());
    }
}
