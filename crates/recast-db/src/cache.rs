//! TTL-bounded caching for introspection results.
//!
//! A [`CacheRegistry`] owns a set of named caches, one per introspection
//! method and dialect. Entries expire after a configurable TTL and each
//! cache is size-bounded, evicting its oldest entry at capacity. Values are
//! stored as JSON so a single cache can hold any serializable result.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// Cache tuning knobs, deserializable from application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entries per named cache before eviction kicks in.
    pub max_entries: usize,
    /// Entry lifetime in seconds.
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 50,
            ttl_seconds: 300,
        }
    }
}

struct CacheEntry {
    value: serde_json::Value,
    cached_at: Instant,
}

/// One named cache with TTL expiry and oldest-first eviction.
pub struct TtlCache {
    name: String,
    max_entries: usize,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl TtlCache {
    fn new(name: &str, config: &CacheConfig) -> Self {
        Self {
            name: name.to_string(),
            max_entries: config.max_entries.max(1),
            ttl: Duration::from_secs(config.ttl_seconds),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The cache's registered name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a key, removing it when expired.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let mut entries = self.lock();
        let expired = entries
            .get(key)
            .is_some_and(|e| e.cached_at.elapsed() >= self.ttl);
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|e| e.value.clone())
    }

    /// Stores a value, evicting the oldest entry at capacity.
    pub fn insert(&self, key: String, value: serde_json::Value) {
        let mut entries = self.lock();
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.cached_at)
                .map(|(k, _)| k.clone());
            if let Some(k) = oldest {
                debug!(cache = %self.name, key = %k, "evicting oldest entry");
                entries.remove(&k);
            }
        }
        entries.insert(
            key,
            CacheEntry {
                value,
                cached_at: Instant::now(),
            },
        );
    }

    /// Removes a single key.
    pub fn remove(&self, key: &str) {
        self.lock().remove(key);
    }

    /// Removes every entry whose key contains `needle`, case-insensitively.
    /// Returns the number of entries removed.
    pub fn remove_matching(&self, needle: &str) -> usize {
        let needle = needle.to_lowercase();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.to_lowercase().contains(&needle));
        before - entries.len()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of live entries, expired ones included until touched.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        // A poisoned cache only means a panic mid-insert; stale data is
        // acceptable for a cache, so keep going with whatever is there.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns every named cache. Passed explicitly to whatever needs caching;
/// there is no global instance.
pub struct CacheRegistry {
    config: CacheConfig,
    caches: Mutex<HashMap<String, Arc<TtlCache>>>,
}

impl CacheRegistry {
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            caches: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cache registered under `name`, creating it on first use.
    pub fn cache(&self, name: &str) -> Arc<TtlCache> {
        let mut caches = self.lock();
        caches
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TtlCache::new(name, &self.config)))
            .clone()
    }

    /// Invalidates every cached entry whose key mentions `table`, across
    /// all named caches. Called after DDL or bulk writes.
    pub fn clear_for_table(&self, table: &str) {
        let caches: Vec<Arc<TtlCache>> = self.lock().values().cloned().collect();
        let mut removed = 0;
        for cache in caches {
            removed += cache.remove_matching(table);
        }
        if removed > 0 {
            debug!(table, removed, "invalidated cached introspection entries");
        }
    }

    /// Drops every entry in every cache.
    pub fn clear_all(&self) {
        for cache in self.lock().values() {
            cache.clear();
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<TtlCache>>> {
        self.caches.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

/// Runs `loader` through the named cache: a fresh hit short-circuits, a
/// miss stores the loaded value. `bypass` skips both the lookup and the
/// store. Serialization problems are logged and degrade to uncached calls
/// rather than failing the operation.
pub async fn memoized<T, F, Fut>(
    registry: &CacheRegistry,
    cache_name: &str,
    key: String,
    bypass: bool,
    loader: F,
) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if bypass {
        return loader().await;
    }
    let cache = registry.cache(cache_name);
    if let Some(value) = cache.get(&key) {
        match serde_json::from_value(value) {
            Ok(hit) => {
                debug!(cache = cache_name, key = %key, "cache hit");
                return Ok(hit);
            }
            Err(err) => {
                warn!(cache = cache_name, key = %key, %err, "discarding undecodable cache entry");
                cache.remove(&key);
            }
        }
    }
    let fresh = loader().await?;
    match serde_json::to_value(&fresh) {
        Ok(value) => cache.insert(key, value),
        Err(err) => warn!(cache = cache_name, key = %key, %err, "result not cacheable"),
    }
    Ok(fresh)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_entries: usize, ttl_seconds: u64) -> CacheConfig {
        CacheConfig {
            max_entries,
            ttl_seconds,
        }
    }

    #[test]
    fn test_get_and_insert() {
        let cache = TtlCache::new("t", &config(10, 300));
        assert!(cache.get("k").is_none());
        cache.insert("k".into(), serde_json::json!([1, 2]));
        assert_eq!(cache.get("k"), Some(serde_json::json!([1, 2])));
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let cache = TtlCache::new("t", &config(10, 0));
        cache.insert("k".into(), serde_json::json!(1));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_eviction_keeps_capacity() {
        let cache = TtlCache::new("t", &config(2, 300));
        cache.insert("a".into(), serde_json::json!(1));
        cache.insert("b".into(), serde_json::json!(2));
        cache.insert("c".into(), serde_json::json!(3));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("c"), Some(serde_json::json!(3)));
    }

    #[test]
    fn test_remove_matching_is_case_insensitive() {
        let cache = TtlCache::new("t", &config(10, 300));
        cache.insert("Instruments".into(), serde_json::json!(1));
        cache.insert("instruments:uq".into(), serde_json::json!(2));
        cache.insert("orders".into(), serde_json::json!(3));
        assert_eq!(cache.remove_matching("INSTRUMENTS"), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_registry_reuses_named_caches() {
        let registry = CacheRegistry::default();
        let a = registry.cache("columns_sqlite");
        let b = registry.cache("columns_sqlite");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_clear_for_table_spans_caches() {
        let registry = CacheRegistry::default();
        registry
            .cache("columns_sqlite")
            .insert("instruments".into(), serde_json::json!(1));
        registry
            .cache("unique_sqlite")
            .insert("instruments".into(), serde_json::json!(2));
        registry.clear_for_table("instruments");
        assert!(registry.cache("columns_sqlite").get("instruments").is_none());
        assert!(registry.cache("unique_sqlite").get("instruments").is_none());
    }

    #[tokio::test]
    async fn test_memoized_caches_loader_result() {
        let registry = CacheRegistry::default();
        let first: Vec<String> = memoized(&registry, "cols", "t".into(), false, || async {
            Ok(vec!["id".to_string()])
        })
        .await
        .unwrap();
        assert_eq!(first, vec!["id"]);

        // A second call must not reach the loader.
        let second: Vec<String> = memoized(&registry, "cols", "t".into(), false, || async {
            panic!("loader must not run on a cache hit")
        })
        .await
        .unwrap();
        assert_eq!(second, vec!["id"]);
    }

    #[tokio::test]
    async fn test_memoized_bypass_skips_cache() {
        let registry = CacheRegistry::default();
        registry
            .cache("cols")
            .insert("t".into(), serde_json::json!(["stale"]));
        let fresh: Vec<String> = memoized(&registry, "cols", "t".into(), true, || async {
            Ok(vec!["fresh".to_string()])
        })
        .await
        .unwrap();
        assert_eq!(fresh, vec!["fresh"]);
        // Bypass must not overwrite the stored entry either.
        assert_eq!(
            registry.cache("cols").get("t"),
            Some(serde_json::json!(["stale"]))
        );
    }
}
