use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Cached value with its insertion time
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    inserted_at: Instant,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() >= ttl
    }
}

/// In-memory string-keyed cache with a fixed TTL.
///
/// Expired entries read as absent but stay in memory until overwritten or
/// deleted; nothing sweeps them in the background. Consistency after a write
/// elsewhere in the system is the caller's job: delete the key.
pub struct TtlCache<T> {
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
    ttl: Duration,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Get cached value if it exists and has not expired
    pub fn get(&self, key: &str) -> Option<T> {
        let entries = self.entries.read();

        match entries.get(key) {
            Some(entry) if !entry.is_expired(self.ttl) => {
                debug!("✓ Cache hit: {}", key);
                Some(entry.value.clone())
            }
            Some(_) => {
                debug!("⚠ Cache stale: {}", key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: &str, value: T) {
        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
        };

        self.entries.write().insert(key.to_string(), entry);
        debug!("💾 Cached: {}", key);
    }

    pub fn delete(&self, key: &str) {
        if self.entries.write().remove(key).is_some() {
            debug!("🗑️ Cache invalidated: {}", key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_get_after_set() {
        let cache = TtlCache::new(Duration::from_secs(60));

        cache.set("pocket", vec![1u64, 2, 3]);

        assert_eq!(cache.get("pocket"), Some(vec![1, 2, 3]));
        assert_eq!(cache.get("beta"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_expiry() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("pocket", 42i64);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("pocket"), Some(42));

        // age == ttl already counts as expired
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("pocket"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_refreshes_timestamp() {
        let cache = TtlCache::new(Duration::from_secs(10));
        cache.set("pocket", 1i64);

        tokio::time::advance(Duration::from_secs(8)).await;
        cache.set("pocket", 2i64);

        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get("pocket"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_invalidates_regardless_of_ttl() {
        let cache = TtlCache::new(Duration::from_secs(3600));
        cache.set("pocket", "apps".to_string());

        cache.delete("pocket");
        assert_eq!(cache.get("pocket"), None);

        // deleting a missing key is a no-op
        cache.delete("pocket");
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(60)));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    let key = format!("net-{}", i % 2);
                    for n in 0..100i64 {
                        cache.set(&key, n);
                        let _ = cache.get(&key);
                        if n % 10 == 0 {
                            cache.delete(&key);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        cache.set("net-0", 7);
        assert_eq!(cache.get("net-0"), Some(7));
    }
}
