use crate::domain::ports::Cache;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// Short-TTL in-memory cache for hot reads (CL). Read-lock check, write-lock
/// update on miss/expiry, the same shape as the teacher's `assets_cache`/
/// `spread_cache` manual TTL pattern.
pub struct TtlCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl TtlCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for TtlCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(key) {
                if entry.expires_at > Instant::now() {
                    return Some(entry.value.clone());
                }
            } else {
                return None;
            }
        }
        // Expired: drop it on the write path.
        let mut entries = self.entries.write().await;
        entries.remove(key);
        None
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_within_ttl() {
        let cache = TtlCache::new();
        cache.set("k", b"v".to_vec(), Duration::from_secs(10)).await;
        assert_eq!(cache.get("k").await, Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn expired_entry_is_evicted() {
        let cache = TtlCache::new();
        cache.set("k", b"v".to_vec(), Duration::from_millis(5)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await, None);
    }
}
