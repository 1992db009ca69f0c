//! Multi-Tier Caching Subsystem
//!
//! Two cache tiers accelerate evaluation:
//! - the **base-condition cache** memoizes, per fingerprint of an event's
//!   static attributes, the bitmap of combinations whose static prefix is
//!   satisfied (plus the static predicates proven true);
//! - the **eligible-predicate-set cache** memoizes, per eligibility bitmap,
//!   the union of predicate IDs those combinations reference.
//!
//! ## Backends
//!
//! Backends form a closed, configuration-driven set: in-memory LRU
//! (sharded, TTL-aware), in-memory W-TinyLFU (moka), adaptive (hit-rate-band
//! auto-resizing LRU), distributed (external RESP key-value store), and
//! none. A hit must be correct; a spurious miss is always allowed, which is
//! what lets the distributed backend degrade to a miss on any network
//! failure.
//!
//! ## Swap soundness
//!
//! Caches must never serve results across a model swap. In-memory tiers are
//! owned by the model runtime and die with it; the distributed tier brands
//! every key with the owning model's content seed.

mod adaptive;
mod fingerprint;
mod local;
mod remote;

pub use adaptive::AdaptiveCache;
pub use fingerprint::{fingerprint_with, Fingerprint, FingerprintWriter};
pub use local::{ShardedLruCache, TinyLfuCache};
pub use remote::RemoteCache;

use crate::config::{CacheBackendKind, CacheSettings, EvictionPolicy};
use crate::error::{HeliosError, HeliosResult};
use crate::metrics::CacheSnapshot;
use crate::predicate::PredicateId;
use roaring::RoaringBitmap;
use std::sync::Arc;

/// Common interface of every cache backend.
///
/// Implementations are thread-safe; `get`/`put` take `&self`. Failures are
/// swallowed by the backend (counted and logged), surfacing only as misses,
/// so the evaluator never has an error path here.
pub trait FingerprintCache<V: Clone + Send + Sync + 'static>: Send + Sync {
    fn get(&self, key: &Fingerprint) -> Option<V>;
    fn put(&self, key: Fingerprint, value: V);
    fn stats(&self) -> CacheSnapshot;
}

/// Values storable in the distributed backend.
pub trait CacheValue: Clone + Send + Sync + 'static {
    fn to_bytes(&self) -> Vec<u8>;
    fn from_bytes(bytes: &[u8]) -> HeliosResult<Self>;
}

/// Cached outcome of the base-condition stage: the combinations whose
/// static prefix is satisfied, and the static predicates proven true.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseConditionResult {
    pub eligible: RoaringBitmap,
    pub true_static: Vec<PredicateId>,
}

impl BaseConditionResult {
    pub fn no_match() -> Self {
        BaseConditionResult {
            eligible: RoaringBitmap::new(),
            true_static: Vec::new(),
        }
    }
}

impl CacheValue for Arc<BaseConditionResult> {
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(8 + self.true_static.len() * 4 + self.eligible.serialized_size());
        buf.extend_from_slice(&(self.true_static.len() as u32).to_le_bytes());
        for id in &self.true_static {
            buf.extend_from_slice(&id.to_le_bytes());
        }
        // Bitmap serialization into a Vec cannot fail.
        self.eligible
            .serialize_into(&mut buf)
            .expect("serialize into Vec");
        buf
    }

    fn from_bytes(bytes: &[u8]) -> HeliosResult<Self> {
        let malformed = || HeliosError::CacheBackend("malformed cached value".to_string());
        if bytes.len() < 4 {
            return Err(malformed());
        }
        let count = u32::from_le_bytes(bytes[..4].try_into().unwrap()) as usize;
        let ids_end = 4 + count * 4;
        if bytes.len() < ids_end {
            return Err(malformed());
        }
        let mut true_static = Vec::with_capacity(count);
        for chunk in bytes[4..ids_end].chunks_exact(4) {
            true_static.push(u32::from_le_bytes(chunk.try_into().unwrap()));
        }
        let eligible =
            RoaringBitmap::deserialize_from(&bytes[ids_end..]).map_err(|_| malformed())?;
        Ok(Arc::new(BaseConditionResult {
            eligible,
            true_static,
        }))
    }
}

/// A backend that caches nothing (type = "none").
pub struct NoneCache;

impl<V: Clone + Send + Sync + 'static> FingerprintCache<V> for NoneCache {
    fn get(&self, _key: &Fingerprint) -> Option<V> {
        None
    }

    fn put(&self, _key: Fingerprint, _value: V) {}

    fn stats(&self) -> CacheSnapshot {
        CacheSnapshot::default()
    }
}

/// Boxed base-condition cache.
pub type ConditionCacheHandle = Box<dyn FingerprintCache<Arc<BaseConditionResult>>>;

/// Boxed eligible-predicate-set cache.
pub type PredicateSetCacheHandle = Box<dyn FingerprintCache<Arc<RoaringBitmap>>>;

/// Build the base-condition cache for a model runtime. `model_seed` brands
/// distributed keys so an external store never serves entries across a
/// model swap.
pub fn build_condition_cache(
    settings: &CacheSettings,
    model_seed: u64,
) -> HeliosResult<ConditionCacheHandle> {
    Ok(match settings.kind {
        CacheBackendKind::None => Box::new(NoneCache),
        CacheBackendKind::InMemory => build_in_memory(settings),
        CacheBackendKind::Adaptive => Box::new(AdaptiveCache::new(settings)),
        CacheBackendKind::Distributed => {
            Box::new(RemoteCache::new(&settings.distributed, settings, model_seed)?)
        }
    })
}

/// Build the eligible-predicate-set cache that lives on an engine model.
///
/// This tier holds derived in-process data keyed by bitmap identity, so the
/// distributed backend is not a valid choice for it.
pub fn build_predicate_set_cache(settings: &CacheSettings) -> HeliosResult<PredicateSetCacheHandle> {
    Ok(match settings.kind {
        CacheBackendKind::None => Box::new(NoneCache),
        CacheBackendKind::InMemory => build_in_memory(settings),
        CacheBackendKind::Adaptive => Box::new(AdaptiveCache::new(settings)),
        CacheBackendKind::Distributed => {
            return Err(HeliosError::Config(
                "cache.predicate_sets: distributed backend is not supported for \
                 the predicate-set tier"
                    .to_string(),
            ))
        }
    })
}

fn build_in_memory<V: Clone + Send + Sync + 'static>(
    settings: &CacheSettings,
) -> Box<dyn FingerprintCache<V>> {
    match settings.eviction {
        EvictionPolicy::Lru => Box::new(ShardedLruCache::new(settings)),
        EvictionPolicy::TinyLfu => Box::new(TinyLfuCache::new(settings)),
    }
}
