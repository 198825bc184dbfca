//! In-memory TTL store with stale reads.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::entry::CacheEntry;

/// Default TTL when none is given at construction (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Snapshot of cache contents for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub keys: Vec<String>,
}

/// A thread-safe keyed cache with per-entry TTL.
///
/// Clones share the same underlying map.
#[derive(Debug, Clone)]
pub struct Cache<T> {
    inner: Arc<DashMap<String, CacheEntry<T>>>,
    default_ttl: Duration,
}

impl<T: Clone> Cache<T> {
    /// Create an empty cache with the given default TTL.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            default_ttl,
        }
    }

    /// The TTL applied by `set` when none is given.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get the value only if it is still fresh.
    pub fn get(&self, key: &str) -> Option<T> {
        self.inner
            .get(key)
            .filter(|entry| entry.is_fresh())
            .map(|entry| entry.data.clone())
    }

    /// Get the value regardless of age. Fallback path only.
    pub fn get_stale(&self, key: &str) -> Option<T> {
        self.inner.get(key).map(|entry| entry.data.clone())
    }

    /// Whether a fresh entry exists for the key.
    pub fn is_fresh(&self, key: &str) -> bool {
        self.inner.get(key).is_some_and(|entry| entry.is_fresh())
    }

    /// Age of the entry, if present.
    pub fn get_age(&self, key: &str) -> Option<Duration> {
        self.inner.get(key).map(|entry| entry.age())
    }

    /// Insert or overwrite, resetting the timestamp to now.
    pub fn set(&self, key: impl Into<String>, data: T, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        self.inner.insert(key.into(), CacheEntry::new(data, ttl));
    }

    /// Remove an entry. Returns true if one existed.
    pub fn delete(&self, key: &str) -> bool {
        self.inner.remove(key).is_some()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.inner.clear();
    }

    /// Drop entries older than twice their TTL, returning how many went.
    pub fn prune(&self) -> usize {
        let mut pruned = 0;
        self.inner.retain(|_, entry| {
            let keep = !entry.is_prunable();
            if !keep {
                pruned += 1;
            }
            keep
        });
        if pruned > 0 {
            tracing::debug!(pruned, remaining = self.inner.len(), "Pruned cache entries");
        }
        pruned
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Current size and keys.
    pub fn stats(&self) -> CacheStats {
        let mut keys: Vec<String> = self.inner.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        CacheStats {
            size: keys.len(),
            keys,
        }
    }
}

impl<T: Clone> Default for Cache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn test_fresh_then_stale() {
        let cache = Cache::new(Duration::from_millis(1000));
        cache.set("x", 42, None);
        assert_eq!(cache.get("x"), Some(42));

        advance(Duration::from_millis(1500)).await;
        assert_eq!(cache.get("x"), None);
        assert_eq!(cache.get_stale("x"), Some(42));
        assert!(!cache.is_fresh("x"));
        assert_eq!(cache.len(), 1, "stale reads must not delete");
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_overwrites_and_resets_timestamp() {
        let cache = Cache::new(Duration::from_millis(100));
        cache.set("k", "old", None);
        advance(Duration::from_millis(90)).await;
        cache.set("k", "new", None);
        advance(Duration::from_millis(50)).await;

        assert_eq!(cache.get("k"), Some("new"));
        assert_eq!(cache.get_age("k"), Some(Duration::from_millis(50)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_ttl_wins_over_default() {
        let cache = Cache::new(Duration::from_millis(100));
        cache.set("long", 1, Some(Duration::from_secs(10)));
        advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("long"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_only_removes_twice_expired() {
        let cache = Cache::new(Duration::from_millis(100));
        cache.set("a", 1, None);
        cache.set("b", 2, Some(Duration::from_secs(60)));

        advance(Duration::from_millis(150)).await;
        assert_eq!(cache.prune(), 0, "expired but younger than 2x ttl");

        advance(Duration::from_millis(100)).await;
        assert_eq!(cache.prune(), 1);
        assert_eq!(cache.get_stale("a"), None);
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn test_prune_count_ignores_concurrent_writes() {
        let cache = Cache::new(Duration::from_secs(60));
        for i in 0..100 {
            cache.set(format!("old-{i}"), i, Some(Duration::ZERO));
        }
        std::thread::sleep(Duration::from_millis(5));

        let pruned = std::thread::scope(|scope| {
            let writer = cache.clone();
            scope.spawn(move || {
                for i in 0..1000 {
                    writer.set(format!("new-{i}"), i, None);
                }
            });
            cache.prune()
        });

        assert_eq!(pruned, 100);
        assert_eq!(cache.len(), 1000);
    }

    #[test]
    fn test_missing_key() {
        let cache: Cache<u32> = Cache::default();
        assert_eq!(cache.get("nope"), None);
        assert_eq!(cache.get_stale("nope"), None);
        assert_eq!(cache.get_age("nope"), None);
        assert!(!cache.is_fresh("nope"));
        assert!(!cache.delete("nope"));
    }

    #[test]
    fn test_delete_clear_and_stats() {
        let cache = Cache::default();
        cache.set("b", 2, None);
        cache.set("a", 1, None);

        let stats = cache.stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.keys, vec!["a".to_string(), "b".to_string()]);

        assert!(cache.delete("a"));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
