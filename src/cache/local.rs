//! In-memory cache backends.
//!
//! Two flavors, selected by the `eviction` option:
//! - [`ShardedLruCache`]: classic LRU behind N mutex-guarded shards with
//!   optional per-entry TTL. Shard count keeps lock contention off the hot
//!   path; the fingerprint's low bits pick the shard.
//! - [`TinyLfuCache`]: W-TinyLFU admission/eviction via `moka`, which keeps
//!   frequently-reused fingerprints resident under scan-heavy workloads.

use crate::cache::{Fingerprint, FingerprintCache};
use crate::config::CacheSettings;
use crate::metrics::{CacheSnapshot, CacheStats};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

const SHARDS: usize = 16;

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

/// Sharded LRU with optional TTL.
pub struct ShardedLruCache<V> {
    shards: Vec<Mutex<LruCache<u128, Entry<V>>>>,
    ttl: Option<Duration>,
    stats: Arc<CacheStats>,
    record_stats: bool,
}

impl<V: Clone + Send + Sync + 'static> ShardedLruCache<V> {
    pub fn new(settings: &CacheSettings) -> Self {
        Self::with_capacity(settings, settings.max_size)
    }

    pub fn with_capacity(settings: &CacheSettings, capacity: usize) -> Self {
        let per_shard = shard_capacity(capacity);
        let shards = (0..SHARDS)
            .map(|_| Mutex::new(LruCache::new(per_shard)))
            .collect();
        ShardedLruCache {
            shards,
            ttl: ttl_from(settings),
            stats: Arc::new(CacheStats::new()),
            record_stats: settings.record_stats,
        }
    }

    /// Change total capacity, applied evenly across shards. Shrinking
    /// evicts LRU entries immediately.
    pub fn resize(&self, capacity: usize) {
        let per_shard = shard_capacity(capacity);
        for shard in &self.shards {
            shard.lock().resize(per_shard);
        }
    }

    pub fn shared_stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn shard_capacity(total: usize) -> NonZeroUsize {
    NonZeroUsize::new((total / SHARDS).max(1)).unwrap()
}

fn ttl_from(settings: &CacheSettings) -> Option<Duration> {
    if settings.ttl_seconds == 0 {
        None
    } else {
        Some(Duration::from_secs(settings.ttl_seconds))
    }
}

impl<V: Clone + Send + Sync + 'static> FingerprintCache<V> for ShardedLruCache<V> {
    fn get(&self, key: &Fingerprint) -> Option<V> {
        let mut shard = self.shards[key.shard(SHARDS)].lock();
        let now = Instant::now();
        let found = shard.get(&key.0).map(|entry| {
            let expired = entry.expires_at.is_some_and(|expires_at| now >= expires_at);
            (expired, entry.value.clone())
        });
        match found {
            Some((false, value)) => {
                if self.record_stats {
                    self.stats.record_hit();
                }
                Some(value)
            }
            Some((true, _)) => {
                shard.pop(&key.0);
                if self.record_stats {
                    self.stats.record_miss();
                    self.stats.record_eviction();
                }
                None
            }
            None => {
                if self.record_stats {
                    self.stats.record_miss();
                }
                None
            }
        }
    }

    fn put(&self, key: Fingerprint, value: V) {
        let entry = Entry {
            value,
            expires_at: self.ttl.map(|ttl| Instant::now() + ttl),
        };
        let mut shard = self.shards[key.shard(SHARDS)].lock();
        if let Some((evicted_key, _)) = shard.push(key.0, entry) {
            if evicted_key != key.0 && self.record_stats {
                self.stats.record_eviction();
            }
        }
    }

    fn stats(&self) -> CacheSnapshot {
        self.stats.snapshot()
    }
}

/// W-TinyLFU backend over `moka`'s synchronous cache.
pub struct TinyLfuCache<V: Clone + Send + Sync + 'static> {
    inner: moka::sync::Cache<u128, V>,
    stats: Arc<CacheStats>,
    record_stats: bool,
}

impl<V: Clone + Send + Sync + 'static> TinyLfuCache<V> {
    pub fn new(settings: &CacheSettings) -> Self {
        let stats = Arc::new(CacheStats::new());
        let eviction_stats = Arc::clone(&stats);
        let record = settings.record_stats;
        let mut builder = moka::sync::Cache::builder()
            .max_capacity(settings.max_size as u64)
            .eviction_listener(move |_key, _value, cause| {
                use moka::notification::RemovalCause;
                if record && matches!(cause, RemovalCause::Size | RemovalCause::Expired) {
                    eviction_stats.record_eviction();
                }
            });
        if settings.ttl_seconds > 0 {
            builder = builder.time_to_live(Duration::from_secs(settings.ttl_seconds));
        }
        TinyLfuCache {
            inner: builder.build(),
            stats,
            record_stats: settings.record_stats,
        }
    }
}

impl<V: Clone + Send + Sync + 'static> FingerprintCache<V> for TinyLfuCache<V> {
    fn get(&self, key: &Fingerprint) -> Option<V> {
        let value = self.inner.get(&key.0);
        if self.record_stats {
            match value {
                Some(_) => self.stats.record_hit(),
                None => self.stats.record_miss(),
            }
        }
        value
    }

    fn put(&self, key: Fingerprint, value: V) {
        self.inner.insert(key.0, value);
    }

    fn stats(&self) -> CacheSnapshot {
        self.stats.snapshot()
    }
}
