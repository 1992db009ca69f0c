//! Hit-rate-band auto-resizing cache.
//!
//! Wraps the sharded LRU backend and retunes its capacity on a fixed
//! interval: a windowed hit rate below `low_hit_rate_threshold` doubles the
//! capacity (up to `max_size`), one above `high_hit_rate_threshold` halves
//! it (down to `min_size`). Tuning happens lazily on the access path, so an
//! idle cache never wakes a timer thread.

use crate::cache::{Fingerprint, FingerprintCache, ShardedLruCache};
use crate::config::{AdaptiveSettings, CacheSettings};
use crate::metrics::CacheSnapshot;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

struct TuneWindow {
    last_tune: Instant,
    hits_at: u64,
    misses_at: u64,
}

/// Auto-resizing LRU (type = "adaptive").
pub struct AdaptiveCache<V: Clone + Send + Sync + 'static> {
    inner: ShardedLruCache<V>,
    bands: AdaptiveSettings,
    tuning_interval: Duration,
    capacity: AtomicUsize,
    window: Mutex<TuneWindow>,
}

impl<V: Clone + Send + Sync + 'static> AdaptiveCache<V> {
    pub fn new(settings: &CacheSettings) -> Self {
        let bands = settings.adaptive.clone();
        let initial = settings.max_size.clamp(bands.min_size, bands.max_size);
        AdaptiveCache {
            inner: ShardedLruCache::with_capacity(settings, initial),
            tuning_interval: Duration::from_secs(bands.tuning_interval_seconds.max(1)),
            bands,
            capacity: AtomicUsize::new(initial),
            window: Mutex::new(TuneWindow {
                last_tune: Instant::now(),
                hits_at: 0,
                misses_at: 0,
            }),
        }
    }

    /// Current capacity bound.
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    fn maybe_tune(&self) {
        let mut window = match self.window.try_lock() {
            Some(window) => window,
            // Another worker is tuning; skip.
            None => return,
        };
        if window.last_tune.elapsed() < self.tuning_interval {
            return;
        }

        let snap = self.inner.stats();
        let hits = snap.hits - window.hits_at;
        let misses = snap.misses - window.misses_at;
        window.last_tune = Instant::now();
        window.hits_at = snap.hits;
        window.misses_at = snap.misses;

        let total = hits + misses;
        if total == 0 {
            return;
        }
        let hit_rate = hits as f64 / total as f64;

        let current = self.capacity.load(Ordering::Relaxed);
        let target = if hit_rate < self.bands.low_hit_rate_threshold {
            (current * 2).min(self.bands.max_size)
        } else if hit_rate > self.bands.high_hit_rate_threshold {
            (current / 2).max(self.bands.min_size)
        } else {
            current
        };

        if target != current {
            debug!(
                hit_rate = hit_rate,
                from = current,
                to = target,
                "adaptive cache retuned"
            );
            self.capacity.store(target, Ordering::Relaxed);
            self.inner.resize(target);
        }
    }
}

impl<V: Clone + Send + Sync + 'static> FingerprintCache<V> for AdaptiveCache<V> {
    fn get(&self, key: &Fingerprint) -> Option<V> {
        let value = self.inner.get(key);
        self.maybe_tune();
        value
    }

    fn put(&self, key: Fingerprint, value: V) {
        self.inner.put(key, value);
    }

    fn stats(&self) -> CacheSnapshot {
        self.inner.stats()
    }
}
