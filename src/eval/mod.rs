//! Evaluation Engine
//!
//! The online half of the core: encodes incoming events, consults the
//! base-condition cache, dispatches predicate families, drives the
//! counter-based conjunction matcher, and applies the selection strategy.
//!
//! ## Per-event data flow
//!
//! ```text
//! Event
//!   -> encode (flatten + dictionary-encode)
//!   -> base-condition lookup (fingerprint -> eligible bitmap + static prefix)
//!   -> eligible-predicate set (cached on the model)
//!   -> per-field dispatch, cheapest fields first
//!   -> counter updates over invertedIndex[p] ∩ eligible
//!   -> match detection at counter saturation
//!   -> selection strategy
//! MatchResult
//! ```
//!
//! ## Concurrency
//!
//! Worker threads each process one event start to finish; there is no
//! intra-event parallelism. The active model sits behind an `ArcSwap` and
//! is sampled exactly once per evaluation. Each worker keeps a reusable
//! [`EvaluationContext`] in thread-local storage, bound to a model runtime
//! identity; a hot-swap is detected on the next evaluation and the context
//! is rebuilt to the new model's dimensions.

pub mod context;
mod dispatch;
pub mod equality;
pub mod numeric;
pub mod patterns;
pub mod strings;
pub mod trace;

use crate::cache::{build_condition_cache, ConditionCacheHandle, FingerprintCache};
use crate::config::{CacheSettings, Config};
use crate::error::{HeliosError, HeliosResult};
use crate::event::Event;
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::model::EngineModel;
use crate::predicate::PredicateId;
use crate::selection::{sort_matches, MatchResult, MatchedRule, SelectionStrategy};
use arc_swap::ArcSwap;
use context::EvaluationContext;
use rayon::prelude::*;
use roaring::RoaringBitmap;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use trace::{EvalTrace, Explanation, TraceLevel};
use tracing::trace as trace_log;

static NEXT_RUNTIME_IDENTITY: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static WORKER_CONTEXT: RefCell<Option<WorkerContext>> = RefCell::new(None);
}

struct WorkerContext {
    identity: u64,
    ctx: EvaluationContext,
}

/// An installed model plus the caches bound to its lifetime.
pub struct ModelRuntime {
    identity: u64,
    model: Arc<EngineModel>,
    base_cache: ConditionCacheHandle,
}

impl ModelRuntime {
    fn new(model: Arc<EngineModel>, settings: &CacheSettings) -> HeliosResult<Self> {
        let base_cache = build_condition_cache(settings, model.seed())?;
        Ok(ModelRuntime {
            identity: NEXT_RUNTIME_IDENTITY.fetch_add(1, Ordering::Relaxed),
            model,
            base_cache,
        })
    }

    pub fn model(&self) -> &Arc<EngineModel> {
        &self.model
    }
}

/// The evaluation engine: owns the active model reference, the
/// base-condition cache, worker contexts, and engine metrics.
pub struct Engine {
    active: ArcSwap<ModelRuntime>,
    cache_settings: CacheSettings,
    default_strategy: SelectionStrategy,
    metrics: Arc<EngineMetrics>,
    pool: rayon::ThreadPool,
}

impl Engine {
    pub fn new(model: Arc<EngineModel>, config: &Config) -> HeliosResult<Self> {
        let runtime = ModelRuntime::new(model, &config.cache.base_condition)?;
        let threads = if config.engine.num_threads == 0 {
            num_cpus::get()
        } else {
            config.engine.num_threads
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("helios-worker-{}", index))
            .build()
            .map_err(|err| HeliosError::Config(err.to_string()))?;
        Ok(Engine {
            active: ArcSwap::from_pointee(runtime),
            cache_settings: config.cache.base_condition.clone(),
            default_strategy: config.engine.selection_strategy,
            metrics: Arc::new(EngineMetrics::new()),
            pool,
        })
    }

    pub fn with_defaults(model: Arc<EngineModel>) -> HeliosResult<Self> {
        Self::new(model, &Config::default())
    }

    /// Atomically install a new model. In-flight evaluations keep the model
    /// they sampled; the old model and its caches are reclaimed when the
    /// last reference drops.
    pub fn swap_model(&self, model: Arc<EngineModel>) -> HeliosResult<()> {
        let runtime = ModelRuntime::new(model, &self.cache_settings)?;
        self.active.store(Arc::new(runtime));
        self.metrics.record_model_swap();
        Ok(())
    }

    /// The currently active model.
    pub fn model(&self) -> Arc<EngineModel> {
        Arc::clone(&self.active.load().model)
    }

    /// Evaluate one event with the configured selection strategy.
    pub fn evaluate(&self, event: &Event) -> HeliosResult<MatchResult> {
        self.evaluate_with_strategy(event, self.default_strategy)
    }

    pub fn evaluate_with_strategy(
        &self,
        event: &Event,
        strategy: SelectionStrategy,
    ) -> HeliosResult<MatchResult> {
        let runtime = self.active.load_full();
        let result = evaluate_runtime(&runtime, event, strategy, None)?;
        self.metrics
            .record_evaluation(result.matched_count, result.predicates_evaluated);
        Ok(result)
    }

    /// Evaluate with lazy trace capture: the hot path records IDs and
    /// counts; call [`EvalTrace::render`] to materialize strings.
    pub fn evaluate_with_trace(
        &self,
        event: &Event,
        level: TraceLevel,
    ) -> HeliosResult<(MatchResult, EvalTrace)> {
        let runtime = self.active.load_full();
        let mut trace = EvalTrace::new(level);
        let result = evaluate_runtime(&runtime, event, self.default_strategy, Some(&mut trace))?;
        self.metrics
            .record_evaluation(result.matched_count, result.predicates_evaluated);
        Ok((result, trace))
    }

    /// Per-condition pass/fail explanation of one rule against one event.
    pub fn explain_rule(&self, event: &Event, rule_code: &str) -> HeliosResult<Explanation> {
        event.validate()?;
        let runtime = self.active.load_full();
        let model = &runtime.model;
        let metadata = model
            .rule_metadata(rule_code)
            .ok_or_else(|| HeliosError::invalid_rule(rule_code, "unknown ruleCode"))?;

        let encoded = model.encode_event(event);
        let conditions: Vec<_> = metadata
            .conditions
            .iter()
            .map(|condition| trace::explain_condition(model, &encoded, condition))
            .collect();
        Ok(Explanation {
            rule_code: rule_code.to_string(),
            matched: conditions.iter().all(|c| c.passed),
            conditions,
        })
    }

    /// Evaluate a batch across the worker pool, one event per worker.
    /// Output order matches input order.
    pub fn evaluate_batch(&self, events: &[Event]) -> Vec<HeliosResult<MatchResult>> {
        self.pool
            .install(|| events.par_iter().map(|event| self.evaluate(event)).collect())
    }

    /// Engine counters plus the active caches' counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        let active = self.active.load();
        MetricsSnapshot {
            engine: self.metrics.snapshot(),
            base_condition_cache: active.base_cache.stats(),
            predicate_set_cache: active.model.predicate_set_cache_stats(),
        }
    }
}

/// The per-event evaluation algorithm.
fn evaluate_runtime(
    runtime: &ModelRuntime,
    event: &Event,
    strategy: SelectionStrategy,
    mut eval_trace: Option<&mut EvalTrace>,
) -> HeliosResult<MatchResult> {
    event.validate()?;
    let started = Instant::now();
    let model = runtime.model.as_ref();
    let mut evaluated = 0u32;

    // 1. Encode.
    let encoded = model.encode_event(event);

    // 2. Base-condition lookup.
    let fingerprint = model.event_fingerprint(&encoded);
    let (base, cache_hit) = match runtime.base_cache.get(&fingerprint) {
        Some(cached) => (cached, true),
        None => {
            let (computed, static_evaluated) = model.base_conditions(&encoded);
            evaluated += static_evaluated;
            let computed = Arc::new(computed);
            runtime.base_cache.put(fingerprint, Arc::clone(&computed));
            (computed, false)
        }
    };
    if let Some(trace) = eval_trace.as_deref_mut() {
        trace.base_cache_hit = cache_hit;
        trace.eligible_combinations = base.eligible.len();
    }
    if base.eligible.is_empty() {
        trace_log!(event_id = %event.event_id, "no eligible combinations after base stage");
        return Ok(MatchResult::empty(
            event.event_id.clone(),
            started.elapsed().as_nanos() as u64,
            evaluated,
        ));
    }

    // 3. Eligible-predicate set, cached on the model.
    let eligible_predicates = model.eligible_predicates(&base.eligible);
    if let Some(trace) = eval_trace.as_deref_mut() {
        trace.eligible_predicates = eligible_predicates.len();
    }

    let wants_fields = eval_trace.is_some();
    let mut visited_fields: Vec<u32> = Vec::new();

    WORKER_CONTEXT.with(|cell| {
        let mut slot = cell.borrow_mut();
        let worker = match slot.as_mut() {
            Some(worker) if worker.identity == runtime.identity => worker,
            _ => {
                // Model swapped (or first evaluation on this worker):
                // rebuild the context sized to the new model.
                *slot = Some(WorkerContext {
                    identity: runtime.identity,
                    ctx: EvaluationContext::new(
                        model.combination_count(),
                        model.predicate_total(),
                        model.rule_count(),
                    ),
                });
                slot.as_mut().expect("context installed above")
            }
        };
        let ctx = &mut worker.ctx;

        // 4a. Apply the static prefix proven true by the base stage.
        for &predicate in &base.true_static {
            if ctx.note_true_predicate(predicate) {
                apply_true_predicate(model, &base.eligible, ctx, predicate);
            }
        }

        // 4b/5. Dispatch dynamic families; counters update as predicates
        // come true.
        {
            let mut on_true = |predicate: PredicateId| {
                if ctx.note_true_predicate(predicate) {
                    apply_true_predicate(model, &base.eligible, ctx, predicate);
                }
            };
            dispatch::dispatch_event(
                model,
                &encoded,
                &eligible_predicates,
                &mut evaluated,
                &mut on_true,
                if wants_fields {
                    Some(&mut visited_fields)
                } else {
                    None
                },
            );
        }

        // 6. Detect matches: expand saturated combinations to owning rules.
        let mut matches: Vec<MatchedRule> = Vec::with_capacity(ctx.hits_len());
        for hit_index in 0..ctx.hits_len() {
            let combination = ctx.hit_at(hit_index);
            for &rule_id in model.rules_of(combination) {
                if ctx.note_rule(rule_id) {
                    let metadata = model.rule(rule_id);
                    matches.push(MatchedRule {
                        rule_id,
                        rule_code: Arc::clone(&metadata.rule_code),
                        priority: metadata.priority,
                        description: metadata.description.clone(),
                    });
                }
            }
        }

        // 7. Deterministic order, then the selection strategy.
        sort_matches(&mut matches);
        strategy.apply(&mut matches);

        if let Some(trace) = eval_trace.as_deref_mut() {
            trace.predicates_evaluated = evaluated;
            trace.hit_combinations = ctx.hits().to_vec();
            trace.visited_fields = visited_fields;
            if trace.level == TraceLevel::Detailed {
                trace.static_true = base.true_static.clone();
                trace.true_predicates = ctx.true_predicates().to_vec();
            }
        }

        let matched_count = matches.len();
        let result = MatchResult {
            event_id: event.event_id.clone(),
            matched_rules: matches,
            evaluation_time_nanos: started.elapsed().as_nanos() as u64,
            predicates_evaluated: evaluated,
            matched_count,
        };

        // 8. Reset the context for this worker's next event.
        ctx.reset();
        Ok(result)
    })
}

/// Walk `invertedIndex[p] ∩ eligible` without materializing the
/// intersection, incrementing each combination's counter.
#[inline]
fn apply_true_predicate(
    model: &EngineModel,
    eligible: &RoaringBitmap,
    ctx: &mut EvaluationContext,
    predicate: PredicateId,
) {
    for combination in model.inverted(predicate) {
        if eligible.contains(combination) {
            ctx.increment(combination, model.required(combination));
        }
    }
}
