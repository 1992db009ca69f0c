//! Engine and cache counters.
//!
//! All counters are monotonic and updated with relaxed atomic increments;
//! they are observability data, not synchronization points. A
//! [`MetricsSnapshot`] is a point-in-time copy safe to serialize.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared hit/miss/eviction counters for one cache instance.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    errors: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Hit rate over everything recorded so far; 0.0 when idle.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            hits: self.hits(),
            misses: self.misses(),
            evictions: self.evictions(),
            errors: self.errors(),
            hit_rate: self.hit_rate(),
        }
    }
}

/// Point-in-time copy of one cache's counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub errors: u64,
    pub hit_rate: f64,
}

/// Engine-wide counters.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    evaluations: AtomicU64,
    matched_events: AtomicU64,
    matched_rules: AtomicU64,
    predicates_evaluated: AtomicU64,
    model_swaps: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_evaluation(&self, matched_rules: usize, predicates_evaluated: u32) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        self.predicates_evaluated
            .fetch_add(predicates_evaluated as u64, Ordering::Relaxed);
        if matched_rules > 0 {
            self.matched_events.fetch_add(1, Ordering::Relaxed);
            self.matched_rules
                .fetch_add(matched_rules as u64, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_model_swap(&self) {
        self.model_swaps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            evaluations: self.evaluations.load(Ordering::Relaxed),
            matched_events: self.matched_events.load(Ordering::Relaxed),
            matched_rules: self.matched_rules.load(Ordering::Relaxed),
            predicates_evaluated: self.predicates_evaluated.load(Ordering::Relaxed),
            model_swaps: self.model_swaps.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the engine counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineSnapshot {
    pub evaluations: u64,
    pub matched_events: u64,
    pub matched_rules: u64,
    pub predicates_evaluated: u64,
    pub model_swaps: u64,
}

/// Combined engine + cache snapshot returned by `Engine::metrics`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub engine: EngineSnapshot,
    pub base_condition_cache: CacheSnapshot,
    pub predicate_set_cache: CacheSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats::new();
        assert_eq!(stats.hit_rate(), 0.0);
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert!((stats.hit_rate() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_engine_counters() {
        let metrics = EngineMetrics::new();
        metrics.record_evaluation(2, 10);
        metrics.record_evaluation(0, 3);
        let snap = metrics.snapshot();
        assert_eq!(snap.evaluations, 2);
        assert_eq!(snap.matched_events, 1);
        assert_eq!(snap.matched_rules, 2);
        assert_eq!(snap.predicates_evaluated, 13);
    }
}
