//! Ephemeral TTL cache.
//!
//! Two users: the enqueue path parks mutating requests here when the queue
//! backend itself is unreachable (`queued_request_<id>`, 1 h), and the
//! worker records dead-lettered messages for operator forensics
//! (`failed_request_<id>`, 24 h). Nothing drains this cache; entries exist
//! so operators can inspect what was lost.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};
use tracing::debug;

/// A cached value with its expiry time
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// In-memory TTL cache with a background sweeper
#[derive(Clone)]
pub struct FallbackCache {
    storage: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl Default for FallbackCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackCache {
    pub fn new() -> Self {
        let cache = Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
        };
        cache.start_cleanup_task();
        cache
    }

    /// Store a value for `ttl_secs` seconds
    pub async fn put(&self, key: String, value: Value, ttl_secs: u64) {
        let entry = CacheEntry {
            value,
            expires_at: Utc::now() + ChronoDuration::seconds(ttl_secs as i64),
        };
        self.storage.write().await.insert(key, entry);
    }

    /// Fetch a value if present and not expired
    pub async fn get(&self, key: &str) -> Option<Value> {
        let storage = self.storage.read().await;
        storage.get(key).and_then(|entry| {
            if entry.is_expired() {
                None
            } else {
                Some(entry.value.clone())
            }
        })
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let storage = self.storage.read().await;
        storage.values().filter(|e| !e.is_expired()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn start_cleanup_task(&self) {
        let storage = Arc::clone(&self.storage);

        tokio::spawn(async move {
            let mut cleanup_interval = interval(Duration::from_secs(60));

            loop {
                cleanup_interval.tick().await;

                let mut guard = storage.write().await;
                let before = guard.len();
                guard.retain(|_, entry| !entry.is_expired());
                let removed = before - guard.len();

                if removed > 0 {
                    debug!("Cleaned up {} expired cache entries", removed);
                }
            }
        });
    }
}
