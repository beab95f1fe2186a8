//! In-process fallback bucket used when the Redis backend is absent and mode
//! is not strict. Keyed by `(client ip, route)`.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::bucket::BucketResult;

struct Entry {
    count: i64,
    resets_at: Instant,
}

pub struct InMemoryBucket {
    entries: DashMap<String, Entry>,
}

impl InMemoryBucket {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    fn key(ip: &str, route: &str) -> String {
        format!("{ip}|{route}")
    }

    pub fn evaluate(&self, ip: &str, route: &str, max: i64, window: Duration) -> BucketResult {
        let key = Self::key(ip, route);
        let now = Instant::now();
        let mut entry = self.entries.entry(key).or_insert_with(|| Entry {
            count: 0,
            resets_at: now + window,
        });

        if now >= entry.resets_at {
            entry.count = 0;
            entry.resets_at = now + window;
        }

        if entry.count >= max {
            return BucketResult {
                count: -1,
                ttl: entry.resets_at.saturating_duration_since(now),
                ok: false,
            };
        }

        entry.count += 1;
        BucketResult {
            count: entry.count,
            ttl: entry.resets_at.saturating_duration_since(now),
            ok: true,
        }
    }
}

impl Default for InMemoryBucket {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_max_then_blocks() {
        let bucket = InMemoryBucket::new();
        for i in 1..=3 {
            let r = bucket.evaluate("1.2.3.4", "/send", 3, Duration::from_secs(60));
            assert!(r.ok, "request {i} should be allowed");
            assert_eq!(r.count, i);
        }
        let blocked = bucket.evaluate("1.2.3.4", "/send", 3, Duration::from_secs(60));
        assert!(!blocked.ok);
        assert_eq!(blocked.count, -1);
    }

    #[test]
    fn distinct_routes_have_independent_counters() {
        let bucket = InMemoryBucket::new();
        let a = bucket.evaluate("1.2.3.4", "/send", 1, Duration::from_secs(60));
        let b = bucket.evaluate("1.2.3.4", "/inbox", 1, Duration::from_secs(60));
        assert!(a.ok);
        assert!(b.ok);
    }
}
