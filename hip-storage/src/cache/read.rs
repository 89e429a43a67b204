//! Read results and counters for the read-through cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Result of a read-through, carrying where the value came from and how
/// long until the cached copy expires.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    /// Remaining TTL of the cached entry. `None` on a storage read.
    refresh_in: Option<Duration>,
    was_cache_hit: bool,
}

impl<T> CacheRead<T> {
    /// A value served from the cache.
    pub fn from_cache(value: T, refresh_in: Option<Duration>) -> Self {
        Self {
            value,
            refresh_in,
            was_cache_hit: true,
        }
    }

    /// A value loaded from the system of record on a miss.
    pub fn from_storage(value: T) -> Self {
        Self {
            value,
            refresh_in: None,
            was_cache_hit: false,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn refresh_in(&self) -> Option<Duration> {
        self.refresh_in
    }

    /// Remaining TTL rounded down to whole seconds, as reported to clients.
    pub fn refresh_in_secs(&self) -> Option<u64> {
        self.refresh_in.map(|d| d.as_secs())
    }

    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }
}

/// Point-in-time view of cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Populates that failed after a successful load.
    pub populate_failures: u64,
    /// Entries that failed to decode.
    pub corrupt: u64,
}

impl CacheStats {
    /// Hit rate in `0.0..=1.0`.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    populate_failures: AtomicU64,
    corrupt: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn populate_failed(&self) {
        self.populate_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn corrupt(&self) {
        self.corrupt.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            populate_failures: self.populate_failures.load(Ordering::Relaxed),
            corrupt: self.corrupt.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_read_metadata() {
        let hit = CacheRead::from_cache(7, Some(Duration::from_millis(2_900)));
        assert!(hit.was_cache_hit());
        assert_eq!(hit.refresh_in_secs(), Some(2));

        let miss = CacheRead::from_storage("x");
        assert!(!miss.was_cache_hit());
        assert_eq!(miss.refresh_in(), None);
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);
        assert!((CacheStats::default().hit_rate() - 0.0).abs() < 0.001);
    }
}
