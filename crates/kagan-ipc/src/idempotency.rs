//! Idempotency cache for mutating dispatcher calls (§4.5). Keyed by
//! `(session_id, capability, method, idempotency_key)`; entries expire
//! after a TTL of at least 10 minutes per the spec's Open Question, and
//! only successful results are ever cached.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;

pub type IdempotencyKey = (String, String, String, String);

const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

struct Entry {
    result: Value,
    expires_at: Instant,
}

pub struct IdempotencyCache {
    ttl: Duration,
    entries: DashMap<IdempotencyKey, Entry>,
}

impl Default for IdempotencyCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl IdempotencyCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, key: &IdempotencyKey) -> Option<Value> {
        match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.result.clone()),
            Some(_) => {
                drop(self.entries.remove(key));
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: IdempotencyKey, result: Value) {
        self.entries.insert(
            key,
            Entry {
                result,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: &str) -> IdempotencyKey {
        ("s1".into(), "tasks".into(), "create".into(), k.into())
    }

    #[test]
    fn replay_within_ttl_returns_cached_value() {
        let cache = IdempotencyCache::new(Duration::from_secs(60));
        cache.put(key("k1"), serde_json::json!({"id": 1}));
        assert_eq!(cache.get(&key("k1")), Some(serde_json::json!({"id": 1})));
    }

    #[test]
    fn expired_entry_is_evicted() {
        let cache = IdempotencyCache::new(Duration::from_millis(1));
        cache.put(key("k1"), serde_json::json!({"id": 1}));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&key("k1")), None);
    }

    #[test]
    fn distinct_keys_do_not_collide() {
        let cache = IdempotencyCache::new(Duration::from_secs(60));
        cache.put(key("k1"), serde_json::json!(1));
        assert_eq!(cache.get(&key("k2")), None);
    }
}
