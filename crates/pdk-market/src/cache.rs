//! TTL cache for upstream responses.
//!
//! Entries are immutable once stored and replaced wholesale on refresh.
//! Expired entries are evicted lazily by the read path.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

struct Entry<T> {
    inserted_at: Instant,
    value: T,
}

/// Read-mostly cache keyed by a caller-built fingerprint string.
pub struct TtlCache<T: Clone> {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry<T>>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fresh value for `key`, if present. A stale hit is removed on the spot.
    pub async fn get(&self, key: &str) -> Option<T> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(e) if e.inserted_at.elapsed() < self.ttl => return Some(e.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Stale: upgrade to a write lock and evict.
        let mut entries = self.entries.write().await;
        if let Some(e) = entries.get(key) {
            if e.inserted_at.elapsed() < self.ttl {
                return Some(e.value.clone());
            }
            entries.remove(key);
        }
        None
    }

    pub async fn insert(&self, key: String, value: T) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            Entry {
                inserted_at: Instant::now(),
                value,
            },
        );
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hit_within_ttl() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("quote:AAPL".to_string(), 42u32).await;
        assert_eq!(cache.get("quote:AAPL").await, Some(42));
    }

    #[tokio::test]
    async fn miss_on_absent_key() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60));
        assert_eq!(cache.get("quote:MSFT").await, None);
    }

    #[tokio::test]
    async fn stale_entry_evicted_on_read() {
        let cache = TtlCache::new(Duration::from_millis(1));
        cache.insert("quote:AAPL".to_string(), 42u32).await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(cache.get("quote:AAPL").await, None);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn reinsert_replaces_wholesale() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("k".to_string(), 1u32).await;
        cache.insert("k".to_string(), 2u32).await;
        assert_eq!(cache.get("k").await, Some(2));
        assert_eq!(cache.len().await, 1);
    }
}
