//! Read-through cache over a [`CacheStore`].
//!
//! Reads consult the cache first and fall back to a loader on a miss,
//! populating the cache with the loaded value. A cache transport failure is
//! an error, never a miss: the loader only runs when the cache positively
//! reported the key absent. A failed populate after a successful load is
//! logged and the loaded value is still returned.
//!
//! Misses on the same key are serialized per process: a caller that waits
//! behind an in-flight load re-checks the cache before loading, so
//! concurrent readers observe the value the first load populated.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use hip_core::StoreError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;

use super::read::{CacheRead, CacheStats, StatsRecorder};
use crate::keys::CacheKey;
use crate::traits::{CacheLookup, CacheStore};

/// Configuration for the read-through cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL written with every populated entry. Bounds staleness after a
    /// write whose invalidation was lost.
    pub entry_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            entry_ttl: Duration::from_secs(3600),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }
}

/// Read-through failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// The cache could not be consulted.
    #[error("Cache backend error: {0}")]
    Backend(StoreError),

    /// A cached entry could not be decoded.
    #[error("Corrupt cache entry at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// The loader failed after a confirmed miss.
    #[error(transparent)]
    Load(StoreError),
}

/// Claim on the per-key lock. Dropping it, including when the caller's
/// future is dropped mid-wait, removes the map entry once no other claim
/// holds it.
struct SlotHandle {
    in_flight: Arc<DashMap<String, Arc<Mutex<()>>>>,
    key: String,
    lock: Arc<Mutex<()>>,
}

impl SlotHandle {
    async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

impl Drop for SlotHandle {
    fn drop(&mut self) {
        // Two references remain at most: the map's and this handle's.
        self.in_flight
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) <= 2);
    }
}

/// Read-through cache.
///
/// Cloning is cheap; clones share the backend and the counters.
pub struct ReadThroughCache<C>
where
    C: CacheStore + ?Sized,
{
    backend: Arc<C>,
    config: CacheConfig,
    stats: Arc<StatsRecorder>,
    in_flight: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl<C> Clone for ReadThroughCache<C>
where
    C: CacheStore + ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            config: self.config.clone(),
            stats: Arc::clone(&self.stats),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<C> ReadThroughCache<C>
where
    C: CacheStore + ?Sized,
{
    pub fn new(backend: Arc<C>, config: CacheConfig) -> Self {
        Self {
            backend,
            config,
            stats: Arc::new(StatsRecorder::default()),
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn with_defaults(backend: Arc<C>) -> Self {
        Self::new(backend, CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn backend(&self) -> &C {
        &self.backend
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Return the cached value for `key`, or load, populate and return it.
    pub async fn read_through<T, F, Fut>(
        &self,
        key: &CacheKey,
        load: F,
    ) -> Result<CacheRead<T>, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, StoreError>> + Send,
    {
        if let Some(read) = self.lookup(key).await? {
            return Ok(read);
        }

        let slot = self.slot(key);
        let _guard = slot.lock().await;
        // A load that finished while we waited has already populated.
        match self.lookup(key).await? {
            Some(read) => Ok(read),
            None => {
                self.stats.miss();
                self.load_and_populate(key, load).await
            }
        }
    }

    fn slot(&self, key: &CacheKey) -> SlotHandle {
        let encoded = key.encode();
        let lock = Arc::clone(self.in_flight.entry(encoded.clone()).or_default().value());
        SlotHandle {
            in_flight: Arc::clone(&self.in_flight),
            key: encoded,
            lock,
        }
    }

    /// Consult the cache. `None` means the key is confirmed absent.
    async fn lookup<T>(&self, key: &CacheKey) -> Result<Option<CacheRead<T>>, CacheError>
    where
        T: DeserializeOwned,
    {
        match self.backend.get(key).await.map_err(CacheError::Backend)? {
            CacheLookup::Hit { bytes, ttl } => {
                match serde_json::from_slice::<T>(&bytes) {
                    Ok(value) => {
                        self.stats.hit();
                        Ok(Some(CacheRead::from_cache(value, ttl)))
                    }
                    Err(e) => {
                        self.stats.corrupt();
                        // Evict so the next read repopulates from storage.
                        if let Err(evict) = self.backend.delete(key).await {
                            warn!(key = %key.encode(), error = %evict, "Failed to evict corrupt cache entry");
                        }
                        Err(CacheError::Corrupt {
                            key: key.encode(),
                            reason: e.to_string(),
                        })
                    }
                }
            }
            CacheLookup::Absent => Ok(None),
        }
    }

    /// Skip the cache lookup, load from storage and repopulate the entry.
    pub async fn refresh<T, F, Fut>(&self, key: &CacheKey, load: F) -> Result<CacheRead<T>, CacheError>
    where
        T: Serialize + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, StoreError>> + Send,
    {
        let slot = self.slot(key);
        let _guard = slot.lock().await;
        self.load_and_populate(key, load).await
    }

    /// Write `value` under `key` with the configured TTL.
    pub async fn put<T>(&self, key: &CacheKey, value: &T) -> Result<(), CacheError>
    where
        T: Serialize + Sync,
    {
        let bytes = serde_json::to_vec(value).map_err(|e| {
            CacheError::Backend(StoreError::Serialization {
                entity: key.namespace().as_str().to_string(),
                reason: e.to_string(),
            })
        })?;
        self.backend
            .set(key, bytes, self.config.entry_ttl)
            .await
            .map_err(CacheError::Backend)
    }

    /// Remove the entry for `key`.
    ///
    /// Waits for an in-flight load of the same key in this process, so a
    /// load that read storage before the caller's write cannot repopulate
    /// after the delete.
    pub async fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError> {
        let slot = self.slot(key);
        let _guard = slot.lock().await;
        self.backend.delete(key).await.map_err(CacheError::Backend)
    }

    async fn load_and_populate<T, F, Fut>(
        &self,
        key: &CacheKey,
        load: F,
    ) -> Result<CacheRead<T>, CacheError>
    where
        T: Serialize + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, StoreError>> + Send,
    {
        let value = load().await.map_err(CacheError::Load)?;

        if let Err(e) = self.put(key, &value).await {
            self.stats.populate_failed();
            warn!(key = %key.encode(), error = %e, "Failed to populate cache after load");
        }

        Ok(CacheRead::from_storage(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCache;
    use hip_core::ProviderId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key() -> CacheKey {
        CacheKey::preferences(&ProviderId::new("HCID1").expect("valid id"))
    }

    fn cache() -> (Arc<MemoryCache>, ReadThroughCache<MemoryCache>) {
        let backend = Arc::new(MemoryCache::new());
        let cache = ReadThroughCache::new(
            Arc::clone(&backend),
            CacheConfig::new().with_ttl(Duration::from_secs(60)),
        );
        (backend, cache)
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_then_hit_loads_once() -> Result<(), CacheError> {
        let (_, cache) = cache();
        let loads = AtomicUsize::new(0);

        let first = cache
            .read_through(&key(), || async {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok::<_, StoreError>(41_u32)
            })
            .await?;
        assert!(!first.was_cache_hit());

        tokio::time::advance(Duration::from_secs(10)).await;

        let second = cache
            .read_through(&key(), || async {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok::<_, StoreError>(99_u32)
            })
            .await?;
        assert!(second.was_cache_hit());
        assert_eq!(*second.value(), 41);
        assert_eq!(second.refresh_in_secs(), Some(50));
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() -> Result<(), CacheError> {
        let (_, cache) = cache();
        cache.put(&key(), &1_u32).await?;

        tokio::time::advance(Duration::from_secs(61)).await;

        let read = cache
            .read_through(&key(), || async { Ok::<_, StoreError>(2_u32) })
            .await?;
        assert!(!read.was_cache_hit());
        assert_eq!(read.into_value(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_backend_failure_is_not_a_miss() {
        let (backend, cache) = cache();
        backend.set_unavailable(true);
        let loads = AtomicUsize::new(0);

        let result = cache
            .read_through(&key(), || async {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok::<_, StoreError>(1_u32)
            })
            .await;

        assert!(matches!(result, Err(CacheError::Backend(_))));
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_loader_error_surfaces_as_load() {
        let (_, cache) = cache();
        let result = cache
            .read_through::<u32, _, _>(&key(), || async {
                Err(StoreError::not_found("provider", "HCID1"))
            })
            .await;
        assert!(matches!(result, Err(CacheError::Load(StoreError::NotFound { .. }))));
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_reported_and_evicted() -> Result<(), StoreError> {
        let (backend, cache) = cache();
        backend
            .set(&key(), b"not json".to_vec(), Duration::from_secs(60))
            .await?;

        let result = cache
            .read_through(&key(), || async { Ok::<_, StoreError>(1_u32) })
            .await;
        assert!(matches!(result, Err(CacheError::Corrupt { .. })));
        assert_eq!(backend.get(&key()).await?, CacheLookup::Absent);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.corrupt), (0, 1));
        Ok(())
    }

    #[tokio::test]
    async fn test_refresh_repopulates() -> Result<(), CacheError> {
        let (_, cache) = cache();
        cache.put(&key(), &1_u32).await?;

        let refreshed = cache
            .refresh(&key(), || async { Ok::<_, StoreError>(2_u32) })
            .await?;
        assert!(!refreshed.was_cache_hit());

        let read = cache
            .read_through(&key(), || async { Ok::<_, StoreError>(3_u32) })
            .await?;
        assert_eq!(read.into_value(), 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_reads_return_identical_values() -> Result<(), CacheError> {
        let (_, cache) = cache();
        let a = cache.clone();
        let b = cache.clone();
        let k = key();
        let loads = AtomicUsize::new(0);

        let (left, right) = tokio::join!(
            a.read_through(&k, || async {
                loads.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, StoreError>("first load".to_string())
            }),
            b.read_through(&k, || async {
                loads.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, StoreError>("second load".to_string())
            }),
        );
        let (left, right) = (left?, right?);
        assert!(!left.was_cache_hit());
        assert!(right.was_cache_hit());
        assert_eq!(left.into_value(), right.into_value());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(cache.in_flight.is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_waiter_releases_its_slot() -> Result<(), CacheError> {
        let (_, cache) = cache();
        let k = key();

        let loader = cache.clone();
        let loading_key = k.clone();
        let first = tokio::spawn(async move {
            loader
                .read_through(&loading_key, || async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, StoreError>(1_u32)
                })
                .await
        });
        tokio::task::yield_now().await;

        // Queue behind the running load, then give up before it finishes.
        let mut waiter = Box::pin(
            cache.read_through(&k, || async { Ok::<_, StoreError>(2_u32) }),
        );
        let timed_out = tokio::time::timeout(Duration::from_millis(1), waiter.as_mut()).await;
        assert!(timed_out.is_err());

        first.await.expect("load task")?;
        assert!(!cache.in_flight.is_empty());

        drop(waiter);
        assert!(cache.in_flight.is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_reload() -> Result<(), CacheError> {
        let (_, cache) = cache();
        let k = key();

        let first = cache
            .read_through(&k, || async { Ok::<_, StoreError>(1_u32) })
            .await?;
        cache.invalidate(&k).await?;
        let second = cache
            .read_through(&k, || async { Ok::<_, StoreError>(2_u32) })
            .await?;
        assert_eq!((first.into_value(), second.into_value()), (1, 2));
        assert_eq!(cache.stats().misses, 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_waits_for_in_flight_load() -> Result<(), CacheError> {
        let (backend, cache) = cache();
        let reader = cache.clone();
        let k = key();

        // The load reads the old value, then the write commits and
        // invalidates before the load populates.
        let (read, invalidated) = tokio::join!(
            reader.read_through(&k, || async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, StoreError>("before write".to_string())
            }),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                cache.invalidate(&k).await
            },
        );
        assert_eq!(read?.into_value(), "before write");
        invalidated?;
        assert_eq!(backend.get(&k).await.map_err(CacheError::Backend)?, CacheLookup::Absent);
        Ok(())
    }
}
