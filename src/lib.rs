//! # Helios Rule-Matching Engine
//!
//! Helios matches a high-throughput stream of events (attribute bags)
//! against a large, mostly-static corpus of conjunctive rules. Rules are
//! compiled offline into a compact, cache-friendly model; the online
//! evaluator returns the set of matching rules per event.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Rule definitions (JSON)
//!     |
//! [Compiler]            -> parse/validate -> dictionary-encode
//!                          -> IS_ANY_OF expansion + dedup
//!                          -> weight profiling -> inverted index
//!                          -> SoA layout -> validation
//!     |
//! EngineModel (immutable, hot-swappable)
//!     |
//! [Engine]              -> encode event -> base-condition cache
//!                          -> eligible predicate set -> family dispatch
//!                          -> counter matching -> selection strategy
//!     |
//! MatchResult
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use helios::{Compiler, Engine, Event, RuleSet};
//!
//! let rules = RuleSet::from_json_str(r#"[
//!     {"ruleCode": "HIGH_VALUE", "priority": 10, "conditions": [
//!         {"field": "status", "operator": "EQUAL_TO", "value": "ACTIVE"},
//!         {"field": "amount", "operator": "GREATER_THAN", "value": 100}
//!     ]}
//! ]"#)?;
//!
//! let model = Compiler::with_defaults().compile(&rules)?;
//! let engine = Engine::with_defaults(model)?;
//!
//! let event = Event::new("e1")
//!     .with_attribute("status", "Active")
//!     .with_attribute("amount", 200);
//! let result = engine.evaluate(&event)?;
//! assert_eq!(result.matched_count, 1);
//! # Ok::<(), helios::HeliosError>(())
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `rules` | Rule definition format and schema validation |
//! | `compiler` | Seven-stage compilation pipeline |
//! | `dictionary` | Field/value interning and normalization |
//! | `model` | Frozen SoA model and metadata queries |
//! | `event` | Event flattening and dictionary encoding |
//! | `eval` | Engine, worker contexts, predicate families |
//! | `cache` | Base-condition and predicate-set cache tiers |
//! | `selection` | Match results and selection strategies |
//! | `config` | Hierarchical figment configuration |
//! | `metrics` | Relaxed-atomic engine and cache counters |

pub mod cache;
pub mod compiler;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod eval;
pub mod event;
pub mod metrics;
pub mod model;
pub mod predicate;
pub mod rules;
pub mod selection;

pub use compiler::{
    CompilationListener, CompilationReport, Compiler, NoopListener, Stage, StageMetrics,
    TracingListener,
};
pub use config::Config;
pub use error::{HeliosError, HeliosResult};
pub use eval::trace::{EvalTrace, Explanation, TraceLevel};
pub use eval::Engine;
pub use event::Event;
pub use metrics::MetricsSnapshot;
pub use model::EngineModel;
pub use predicate::Operator;
pub use rules::{ConditionDefinition, RuleDefinition, RuleSet};
pub use selection::{MatchResult, MatchedRule, SelectionStrategy};
