//! Response cache for terminology requests.
//!
//! The cache is keyed by the fully resolved request URL and stores the
//! serialized successful response. It is the only mitigation against
//! repeatedly re-issuing identical requests (there is no retry policy), so
//! it is process-wide and shared across requests. Entries are immutable
//! once written; concurrent same-key writes are idempotent (last write
//! wins). Eviction is TTL-based and lazy.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

/// A cache backend failure. Lookups degrade to a miss; store failures are
/// logged by the client and never fail the action.
#[derive(Debug, Error)]
#[error("terminology cache failure: {0}")]
pub struct CacheError(pub String);

/// Injected key-value cache with TTL semantics.
pub trait TerminologyCache: Send + Sync {
    /// The cached response for `key`, if present and fresh.
    fn get(&self, key: &str) -> Option<Value>;

    /// Store the successful response for `key`.
    fn put(&self, key: &str, response: &Value) -> Result<(), CacheError>;
}

struct CacheEntry {
    response: Value,
    expires_at: Instant,
}

/// In-memory TTL cache. The production default, and what tests inject.
pub struct InMemoryCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new(ttl: Duration) -> Self {
        InMemoryCache {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl TerminologyCache for InMemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.response.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: &str, response: &Value) -> Result<(), CacheError> {
        self.entries.lock().insert(
            key.to_string(),
            CacheEntry {
                response: response.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hit_returns_stored_response() {
        let cache = InMemoryCache::new(Duration::from_secs(60));
        assert!(cache.get("k").is_none());
        cache.put("k", &json!({"resourceType": "ValueSet"})).unwrap();
        assert_eq!(cache.get("k"), Some(json!({"resourceType": "ValueSet"})));
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = InMemoryCache::new(Duration::from_millis(10));
        cache.put("k", &json!(1)).unwrap();
        std::thread::sleep(Duration::from_millis(25));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn same_key_writes_are_last_write_wins() {
        let cache = InMemoryCache::new(Duration::from_secs(60));
        cache.put("k", &json!(1)).unwrap();
        cache.put("k", &json!(2)).unwrap();
        assert_eq!(cache.get("k"), Some(json!(2)));
    }
}
