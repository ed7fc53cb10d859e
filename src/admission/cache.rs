//! Response cache with per-class TTLs
//!
//! [`CacheStore`] is the backing-store seam; [`MemoryCacheStore`] is the
//! in-process implementation. [`ResponseCache`] layers JSON serialisation,
//! TTL selection and fail-open error handling on top of a store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock as AsyncRwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::StoreError;
use super::keys::{CacheKey, Invalidation, ResourceClass, glob_match};

/// Lifetimes for each [`ResourceClass`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub item: Duration,
    pub search: Duration,
    pub listing: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            item: Duration::from_secs(5 * 60),
            search: Duration::from_secs(2 * 60),
            listing: Duration::from_secs(10 * 60),
        }
    }
}

impl CacheTtls {
    pub fn for_class(&self, class: ResourceClass) -> Duration {
        match class {
            ResourceClass::Item => self.item,
            ResourceClass::Search => self.search,
            ResourceClass::Listing => self.listing,
        }
    }
}

/// Backing store for serialised responses.
///
/// Implementations must apply each call atomically; the response cache never
/// performs read-modify-write sequences on top of them.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    /// Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Delete every key matching a `*` glob. Returns the number removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, StoreError>;

    /// Number of live entries, if the store can report it.
    async fn len(&self) -> Result<usize, StoreError>;
}

#[derive(Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// Writes between opportunistic sweeps of expired entries.
const SWEEP_EVERY: u64 = 256;

/// In-memory TTL store.
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    writes: AtomicU64,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            writes: AtomicU64::new(0),
        }
    }

    /// Remove all expired entries
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if now < entry.expires_at => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: drop it so it is never observed again.
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|e| e.expires_at <= now) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.entries.write().insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );

        if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            let purged = self.purge_expired();
            if purged > 0 {
                debug!(purged, "Swept expired cache entries");
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .write()
            .remove(key)
            .is_some_and(|e| e.expires_at > now))
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, StoreError> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !glob_match(pattern, key));
        Ok((before - entries.len()) as u64)
    }

    async fn len(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .values()
            .filter(|e| e.expires_at > now)
            .count())
    }
}

/// Store used when caching is disabled: every read misses.
pub struct NoopCacheStore;

#[async_trait]
impl CacheStore for NoopCacheStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), StoreError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
        Ok(false)
    }

    async fn delete_pattern(&self, _pattern: &str) -> Result<u64, StoreError> {
        Ok(0)
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

/// JSON response cache over a [`CacheStore`].
///
/// Store failures are logged and treated as misses: caching is an
/// optimisation, never a reason to fail a request.
///
/// Every invalidation advances a generation counter. A value computed before
/// an invalidation is never stored after it: [`put`](Self::put) compares the
/// generation observed before computing and the check and store run under
/// the same lock that invalidation holds exclusively.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    ttls: CacheTtls,
    generation: Arc<AsyncRwLock<u64>>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>, ttls: CacheTtls) -> Self {
        Self {
            store,
            ttls,
            generation: Arc::new(AsyncRwLock::new(0)),
        }
    }

    /// Current invalidation generation. Take it before computing a value
    /// that will be passed to [`put`](Self::put).
    pub async fn generation(&self) -> u64 {
        *self.generation.read().await
    }

    /// Look up a cached payload. Backend and decode errors are misses.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        match self.store.get(key.as_str()).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    debug!(key = %key, "Cache HIT");
                    Some(value)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Cache JSON decode error");
                    None
                }
            },
            Ok(None) => {
                debug!(key = %key, "Cache MISS");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache get error, computing directly");
                None
            }
        }
    }

    /// Store a payload with its class TTL unless an invalidation happened
    /// since `generation` was read. Returns whether it was stored.
    pub async fn put<T: Serialize>(&self, key: &CacheKey, value: &T, generation: u64) -> bool {
        let current = self.generation.read().await;
        if *current != generation {
            debug!(key = %key, "Cache SET skipped, invalidated while computing");
            return false;
        }

        let ttl = self.ttls.for_class(key.class());
        let serialized = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache serialization error");
                return false;
            }
        };

        match self.store.set(key.as_str(), serialized, ttl).await {
            Ok(()) => {
                debug!(key = %key, ttl_secs = ttl.as_secs(), "Cache SET");
                true
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache set error");
                false
            }
        }
    }

    /// Evict everything a write may have made stale. Returns the number of
    /// entries removed; failures are logged and counted as zero.
    pub async fn invalidate(&self, invalidation: Invalidation) -> u64 {
        let mut generation = self.generation.write().await;
        *generation += 1;

        let mut removed = 0u64;
        for key in invalidation.keys() {
            match self.store.delete(&key).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(key = %key, error = %e, "Cache delete error"),
            }
        }
        for pattern in invalidation.patterns() {
            match self.store.delete_pattern(&pattern).await {
                Ok(n) => removed += n,
                Err(e) => warn!(pattern = %pattern, error = %e, "Cache delete pattern error"),
            }
        }
        debug!(?invalidation, removed, "Cache invalidated");
        removed
    }

    /// Live entry count, `None` when the store is unreachable.
    pub async fn len(&self) -> Option<usize> {
        self.store.len().await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::testing::UnreachableStore;

    fn memory_cache() -> ResponseCache {
        ResponseCache::new(Arc::new(MemoryCacheStore::new()), CacheTtls::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_served_until_ttl_then_never() {
        let store = MemoryCacheStore::new();
        store
            .set("book:1", "{\"id\":1}".into(), Duration::from_secs(300))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(store.get("book:1").await.unwrap().as_deref(), Some("{\"id\":1}"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.get("book:1").await.unwrap(), None);
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_pattern_only_hits_matches() {
        let store = MemoryCacheStore::new();
        let ttl = Duration::from_secs(60);
        store.set("books:page=1", "a".into(), ttl).await.unwrap();
        store.set("books:page=2", "b".into(), ttl).await.unwrap();
        store.set("book:1", "c".into(), ttl).await.unwrap();

        assert_eq!(store.delete_pattern("books:*").await.unwrap(), 2);
        assert_eq!(store.get("book:1").await.unwrap().as_deref(), Some("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = MemoryCacheStore::new();
        store.set("a", "1".into(), Duration::from_secs(1)).await.unwrap();
        store.set("b", "2".into(), Duration::from_secs(10)).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_cache_uses_class_ttl() {
        let cache = memory_cache();
        let search = CacheKey::search(Some("orwell"), None, None, 1, 10);
        let item = CacheKey::book(1);
        let generation = cache.generation().await;
        assert!(cache.put(&search, &vec![1, 2, 3], generation).await);
        assert!(cache.put(&item, &"dune", generation).await);

        tokio::time::advance(Duration::from_secs(121)).await;
        assert_eq!(cache.get::<Vec<i32>>(&search).await, None);
        assert_eq!(cache.get::<String>(&item).await.as_deref(), Some("dune"));
    }

    #[tokio::test]
    async fn test_unreachable_store_degrades_to_miss() {
        let cache = ResponseCache::new(Arc::new(UnreachableStore), CacheTtls::default());
        let key = CacheKey::book(1);
        assert!(!cache.put(&key, &"x", 0).await);
        assert_eq!(cache.get::<String>(&key).await, None);
        assert_eq!(cache.invalidate(Invalidation::Book { id: Some(1) }).await, 0);
        assert_eq!(cache.len().await, None);
    }

    #[tokio::test]
    async fn test_noop_store_never_hits() {
        let cache = ResponseCache::new(Arc::new(NoopCacheStore), CacheTtls::default());
        let key = CacheKey::book(1);
        assert!(cache.put(&key, &"x", 0).await);
        assert_eq!(cache.get::<String>(&key).await, None);
    }

    #[tokio::test]
    async fn test_put_skipped_after_invalidation() {
        let cache = memory_cache();
        let key = CacheKey::book(1);
        let before = cache.generation().await;

        cache.invalidate(Invalidation::Book { id: Some(1) }).await;

        assert!(!cache.put(&key, &"stale", before).await);
        assert_eq!(cache.get::<String>(&key).await, None);

        let now = cache.generation().await;
        assert_eq!(now, before + 1);
        assert!(cache.put(&key, &"fresh", now).await);
        assert_eq!(cache.get::<String>(&key).await.as_deref(), Some("fresh"));
    }
}
