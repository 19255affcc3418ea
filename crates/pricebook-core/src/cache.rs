//! In-memory memoization of statistics results.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long a statistics result stays fresh.
pub const DEFAULT_STATISTICS_TTL: Duration = Duration::from_secs(50);

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

#[derive(Debug)]
struct CacheInner<K, V> {
    map: HashMap<K, CacheEntry<V>>,
    ttl: Duration,
}

impl<K: Eq + Hash, V: Clone> CacheInner<K, V> {
    fn get(&self, key: &K) -> Option<V> {
        self.map.get(key).and_then(|entry| {
            if Instant::now() <= entry.expires_at {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }

    fn put(&mut self, key: K, value: V) {
        let expires_at = Instant::now() + self.ttl;
        self.map.insert(key, CacheEntry { value, expires_at });
    }

    fn clear_expired(&mut self) {
        let now = Instant::now();
        self.map.retain(|_, entry| entry.expires_at > now);
    }
}

/// Thread-safe TTL cache shared by clones.
///
/// A zero TTL disables the cache: `put` becomes a no-op.
#[derive(Debug, Clone)]
pub struct TtlCache<K, V> {
    inner: Arc<tokio::sync::RwLock<CacheInner<K, V>>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(CacheInner {
                map: HashMap::new(),
                ttl,
            })),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let store = self.inner.read().await;
        store.get(key)
    }

    pub async fn put(&self, key: K, value: V) {
        let mut store = self.inner.write().await;
        if store.ttl == Duration::ZERO {
            return;
        }
        // drop stale entries so distinct keys do not accumulate forever
        store.clear_expired();
        store.put(key, value);
    }

    pub async fn clear(&self) {
        self.inner.write().await.map.clear();
    }

    /// Entries held, including expired ones not yet evicted.
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_and_overwrites_values() {
        let cache = TtlCache::new(Duration::from_secs(1));
        assert!(cache.get(&"key").await.is_none());

        cache.put("key", 1).await;
        assert_eq!(cache.get(&"key").await, Some(1));

        cache.put("key", 2).await;
        assert_eq!(cache.get(&"key").await, Some(2));
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = TtlCache::new(Duration::from_millis(100));
        cache.put("key", 1).await;
        assert!(cache.get(&"key").await.is_some());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(cache.get(&"key").await.is_none());

        cache.put("other", 2).await;
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn disabled_cache_stores_nothing() {
        let cache = TtlCache::disabled();
        cache.put("key", 1).await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let clone = cache.clone();
        cache.put("key", 1).await;
        assert_eq!(clone.get(&"key").await, Some(1));

        clone.clear().await;
        assert!(cache.is_empty().await);
    }
}
