//! Read cache implementation for MetaFS
//!
//! Caches whole-file content by normalized path. Entries leave the cache on
//! explicit invalidation, when capacity forces out the oldest insertion, or
//! lazily once they outlive the TTL. The cache is never the source of truth;
//! everything in it can be rebuilt from physical content.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::Serialize;

use crate::config::CacheConfig;

/// A cached file with its insertion time
struct CacheEntry {
    content: Vec<u8>,
    inserted_at: Instant,
}

/// Cache counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that fell through to physical content
    pub misses: u64,
    /// Entries dropped to make room
    pub evictions: u64,
    /// Entries dropped for outliving the TTL
    pub expirations: u64,
}

impl CacheStats {
    /// Share of lookups answered from the cache, 0 before the first lookup
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded, time-expiring content cache.
///
/// Lookups use `peek`, so recency order is insertion order and capacity
/// eviction always removes the oldest insertion.
pub struct ReadCache {
    entries: LruCache<String, CacheEntry>,
    ttl: Duration,
    stats: CacheStats,
}

fn capacity(max_size: usize) -> NonZeroUsize {
    NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN)
}

impl ReadCache {
    /// Create a cache from its configuration
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: LruCache::new(capacity(config.max_size)),
            ttl: config.ttl(),
            stats: CacheStats::default(),
        }
    }

    /// Look up `path`, dropping the entry if it has expired
    pub fn get(&mut self, path: &str) -> Option<Vec<u8>> {
        self.get_at(path, Instant::now())
    }

    pub(crate) fn get_at(&mut self, path: &str, now: Instant) -> Option<Vec<u8>> {
        let expired = match self.entries.peek(path) {
            Some(entry) => now.saturating_duration_since(entry.inserted_at) > self.ttl,
            None => {
                self.stats.misses += 1;
                return None;
            }
        };

        if expired {
            self.entries.pop(path);
            self.stats.expirations += 1;
            self.stats.misses += 1;
            return None;
        }

        self.stats.hits += 1;
        self.entries.peek(path).map(|entry| entry.content.clone())
    }

    /// Insert or replace the content cached for `path`
    pub fn insert(&mut self, path: &str, content: Vec<u8>) {
        self.insert_at(path, content, Instant::now());
    }

    pub(crate) fn insert_at(&mut self, path: &str, content: Vec<u8>, now: Instant) {
        // Re-inserting refreshes the insertion time, so drop the old slot first
        self.entries.pop(path);
        let entry = CacheEntry {
            content,
            inserted_at: now,
        };
        if let Some((evicted, _)) = self.entries.push(path.to_string(), entry) {
            log::debug!("ReadCache: evicted {} to make room", evicted);
            self.stats.evictions += 1;
        }
    }

    /// Drop one path, or everything when `path` is `None`
    pub fn invalidate(&mut self, path: Option<&str>) {
        match path {
            Some(path) => {
                self.entries.pop(path);
            }
            None => self.entries.clear(),
        }
    }

    /// Change capacity and TTL, evicting oldest entries if the cache shrinks
    pub fn configure(&mut self, config: &CacheConfig) {
        let before = self.entries.len();
        self.entries.resize(capacity(config.max_size));
        self.stats.evictions += (before - self.entries.len()) as u64;
        self.ttl = config.ttl();
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(max_size: usize, ttl_ms: u64) -> ReadCache {
        ReadCache::new(&CacheConfig { max_size, ttl_ms })
    }

    #[test]
    fn test_cache_read_write() {
        let mut cache = cache(4, 60_000);
        cache.insert("/a.txt", b"alpha".to_vec());
        cache.insert("/b.txt", b"beta".to_vec());

        assert_eq!(cache.get("/a.txt").as_deref(), Some(&b"alpha"[..]));
        assert_eq!(cache.get("/b.txt").as_deref(), Some(&b"beta"[..]));
        assert_eq!(cache.get("/c.txt"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_cache_eviction() {
        let mut cache = cache(3, 60_000);
        let start = Instant::now();
        for (i, path) in ["/1", "/2", "/3", "/4"].iter().enumerate() {
            cache.insert_at(path, vec![i as u8], start + Duration::from_millis(i as u64));
        }

        // Exactly the oldest insertion goes
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains("/1"));
        assert!(cache.contains("/2"));
        assert!(cache.contains("/3"));
        assert!(cache.contains("/4"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_reads_do_not_change_eviction_order() {
        let mut cache = cache(2, 60_000);
        cache.insert("/old", b"1".to_vec());
        cache.insert("/new", b"2".to_vec());
        assert!(cache.get("/old").is_some());

        cache.insert("/newest", b"3".to_vec());
        assert!(!cache.contains("/old"));
        assert!(cache.contains("/new"));
    }

    #[test]
    fn test_reinsert_refreshes_age() {
        let mut cache = cache(2, 60_000);
        cache.insert("/a", b"1".to_vec());
        cache.insert("/b", b"2".to_vec());
        cache.insert("/a", b"3".to_vec());
        cache.insert("/c", b"4".to_vec());

        assert!(!cache.contains("/b"));
        assert_eq!(cache.get("/a").as_deref(), Some(&b"3"[..]));
    }

    #[test]
    fn test_ttl_expiry() {
        let mut cache = cache(4, 100);
        let start = Instant::now();
        cache.insert_at("/a", b"1".to_vec(), start);

        assert!(cache.get_at("/a", start + Duration::from_millis(50)).is_some());
        assert!(cache.get_at("/a", start + Duration::from_millis(150)).is_none());
        assert!(!cache.contains("/a"));
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_invalidate() {
        let mut cache = cache(4, 60_000);
        cache.insert("/a", b"1".to_vec());
        cache.insert("/b", b"2".to_vec());

        cache.invalidate(Some("/a"));
        assert!(!cache.contains("/a"));
        assert_eq!(cache.len(), 1);

        cache.invalidate(None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_configure_shrinks_oldest_first() {
        let mut cache = cache(4, 60_000);
        for path in ["/1", "/2", "/3", "/4"] {
            cache.insert(path, Vec::new());
        }
        cache.configure(&CacheConfig {
            max_size: 2,
            ttl_ms: 10,
        });

        assert_eq!(cache.capacity(), 2);
        assert!(cache.contains("/3"));
        assert!(cache.contains("/4"));
        assert_eq!(cache.stats().evictions, 2);
    }
}
