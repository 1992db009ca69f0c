//! Rule Compiler
//!
//! Transforms a declarative rule set into the frozen runtime model the
//! evaluator reads. The pipeline runs seven observable stages:
//!
//! ```text
//! RuleSet
//!     |
//! [PARSE_VALIDATE]     -> schema checks, duplicate codes, disabled rules
//!     |
//! [DICTIONARY_ENCODE]  -> field/value interning, regex compilation
//!     |
//! [EXPAND_DEDUPLICATE] -> IS_ANY_OF product, canonical conjunctions
//!     |
//! [WEIGHT_PROFILE]     -> predicate cost/selectivity, field min-weights
//!     |
//! [INDEX_BUILD]        -> inverted index, static-field masks
//!     |
//! [LAYOUT_FINALIZE]    -> SoA arrays, field plans, rule metadata
//!     |
//! [VALIDATE]           -> model integrity assertions
//!     |
//! EngineModel (immutable, shared)
//! ```
//!
//! A [`CompilationListener`] observes stage boundaries with durations and
//! numeric metrics; the same numbers are retained on the model as a
//! [`CompilationReport`].

mod expander;
mod index;
mod profiler;

use crate::cache::build_predicate_set_cache;
use crate::config::Config;
use crate::dictionary::{fold_value, normalize_field_name, Dictionary};
use crate::error::{HeliosError, HeliosResult};
use crate::eval::patterns::compile_full_match;
use crate::model::{EngineModel, FieldPlan, ModelParts, RuleMetadata};
use crate::predicate::{Operand, Operator, Predicate};
use crate::rules::{ConditionValue, RuleDefinition, RuleSet, ScalarValue};
use expander::{EncodedCondition, EncodedRule, PredicateProto};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use xxhash_rust::xxh3::xxh3_64;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ParseValidate,
    DictionaryEncode,
    ExpandDeduplicate,
    WeightProfile,
    IndexBuild,
    LayoutFinalize,
    Validate,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::ParseValidate,
        Stage::DictionaryEncode,
        Stage::ExpandDeduplicate,
        Stage::WeightProfile,
        Stage::IndexBuild,
        Stage::LayoutFinalize,
        Stage::Validate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ParseValidate => "PARSE_VALIDATE",
            Stage::DictionaryEncode => "DICTIONARY_ENCODE",
            Stage::ExpandDeduplicate => "EXPAND_DEDUPLICATE",
            Stage::WeightProfile => "WEIGHT_PROFILE",
            Stage::IndexBuild => "INDEX_BUILD",
            Stage::LayoutFinalize => "LAYOUT_FINALIZE",
            Stage::Validate => "VALIDATE",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric metrics reported per stage.
pub type StageMetrics = BTreeMap<&'static str, u64>;

/// Host-supplied observer of the compilation pipeline.
pub trait CompilationListener {
    fn on_stage_start(&mut self, stage: Stage, index: usize, count: usize) {
        let _ = (stage, index, count);
    }

    fn on_stage_complete(&mut self, stage: Stage, duration: Duration, metrics: &StageMetrics) {
        let _ = (stage, duration, metrics);
    }

    fn on_error(&mut self, stage: Stage, error: &HeliosError) {
        let _ = (stage, error);
    }
}

/// Listener that observes nothing.
pub struct NoopListener;

impl CompilationListener for NoopListener {}

/// Listener that logs stage boundaries through `tracing`.
pub struct TracingListener;

impl CompilationListener for TracingListener {
    fn on_stage_start(&mut self, stage: Stage, index: usize, count: usize) {
        debug!(stage = stage.as_str(), index, count, "compile stage start");
    }

    fn on_stage_complete(&mut self, stage: Stage, duration: Duration, metrics: &StageMetrics) {
        info!(
            stage = stage.as_str(),
            duration_ms = duration.as_millis() as u64,
            ?metrics,
            "compile stage complete"
        );
    }

    fn on_error(&mut self, stage: Stage, err: &HeliosError) {
        error!(stage = stage.as_str(), error = %err, "compile stage failed");
    }
}

/// Per-stage record kept on the model.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: Stage,
    pub duration: Duration,
    pub metrics: StageMetrics,
}

/// Durations and corpus statistics for one compilation.
#[derive(Debug, Clone, Default)]
pub struct CompilationReport {
    pub stages: Vec<StageReport>,
    pub total_duration: Duration,
    pub rules_total: u64,
    pub rules_compiled: u64,
    pub predicates: u64,
    pub combinations: u64,
}

impl CompilationReport {
    /// Human-readable stage summary, one line per stage.
    pub fn format_report(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "compiled {} of {} rules into {} combinations over {} predicates in {:?}\n",
            self.rules_compiled,
            self.rules_total,
            self.combinations,
            self.predicates,
            self.total_duration
        ));
        for stage in &self.stages {
            out.push_str(&format!("  {:<20} {:>8.2?}", stage.stage.as_str(), stage.duration));
            for (name, value) in &stage.metrics {
                out.push_str(&format!("  {}={}", name, value));
            }
            out.push('\n');
        }
        out
    }
}

/// The offline rule compiler.
pub struct Compiler {
    config: Config,
}

impl Compiler {
    pub fn new(config: Config) -> Self {
        Compiler { config }
    }

    pub fn with_defaults() -> Self {
        Compiler {
            config: Config::default(),
        }
    }

    /// Compile without observation.
    pub fn compile(&self, rules: &RuleSet) -> HeliosResult<Arc<EngineModel>> {
        self.compile_with_listener(rules, &mut NoopListener)
    }

    /// Compile, reporting stage boundaries to `listener`.
    pub fn compile_with_listener(
        &self,
        rules: &RuleSet,
        listener: &mut dyn CompilationListener,
    ) -> HeliosResult<Arc<EngineModel>> {
        let compile_start = Instant::now();
        let mut stages: Vec<StageReport> = Vec::with_capacity(Stage::ALL.len());

        // -- PARSE_VALIDATE ------------------------------------------------
        let enabled = run_stage(listener, &mut stages, Stage::ParseValidate, 0, || {
            rules.check_unique_codes()?;
            let mut enabled: Vec<&RuleDefinition> = Vec::with_capacity(rules.len());
            let mut disabled = 0u64;
            for rule in rules.iter() {
                rule.validate()?;
                if rule.enabled {
                    enabled.push(rule);
                } else {
                    disabled += 1;
                }
            }
            let metrics = StageMetrics::from([
                ("rules_total", rules.len() as u64),
                ("rules_enabled", enabled.len() as u64),
                ("rules_disabled", disabled),
            ]);
            Ok((enabled, metrics))
        })?;

        // -- DICTIONARY_ENCODE ---------------------------------------------
        let (mut field_dict, mut value_dict) = (Dictionary::new(), Dictionary::new());
        let encoded = run_stage(listener, &mut stages, Stage::DictionaryEncode, 1, || {
            let mut encoded = Vec::with_capacity(enabled.len());
            for rule in &enabled {
                encoded.push(encode_rule(rule, &mut field_dict, &mut value_dict)?);
            }
            let metrics = StageMetrics::from([
                ("fields_interned", field_dict.len() as u64),
                ("values_interned", value_dict.len() as u64),
            ]);
            Ok((encoded, metrics))
        })?;

        // -- EXPAND_DEDUPLICATE --------------------------------------------
        let expansion = run_stage(listener, &mut stages, Stage::ExpandDeduplicate, 2, || {
            let expansion = expander::expand_rules(&encoded);
            let metrics = StageMetrics::from([
                ("conjunctions_expanded", expansion.conjunctions),
                ("combinations", expansion.combinations.len() as u64),
                (
                    "combinations_deduped",
                    expansion.conjunctions - expansion.combinations.len() as u64,
                ),
                ("predicates", expansion.registry.len() as u64),
            ]);
            Ok((expansion, metrics))
        })?;

        // -- WEIGHT_PROFILE ------------------------------------------------
        let (predicates, predicates_by_weight, min_weights) =
            run_stage(listener, &mut stages, Stage::WeightProfile, 3, || {
                let predicates = profiler::profile_predicates(&expansion.registry.protos);
                let by_weight = profiler::sort_by_weight(&predicates);
                let min_weights = profiler::field_min_weights(&predicates, field_dict.len());
                let static_count = predicates.iter().filter(|p| p.is_static()).count() as u64;
                let metrics = StageMetrics::from([
                    ("predicates_profiled", predicates.len() as u64),
                    ("static_predicates", static_count),
                ]);
                Ok(((predicates, by_weight, min_weights), metrics))
            })?;

        // -- INDEX_BUILD ---------------------------------------------------
        let (inverted_index, static_fields) =
            run_stage(listener, &mut stages, Stage::IndexBuild, 4, || {
                let inverted =
                    index::build_inverted_index(&expansion.combinations, predicates.len());
                let static_fields = index::build_static_fields(&predicates, &inverted);
                let entries: u64 = inverted.iter().map(|bitmap| bitmap.len()).sum();
                let metrics = StageMetrics::from([
                    ("index_entries", entries),
                    ("static_fields", static_fields.len() as u64),
                ]);
                Ok(((inverted, static_fields), metrics))
            })?;

        // -- LAYOUT_FINALIZE -----------------------------------------------
        let layout = run_stage(listener, &mut stages, Stage::LayoutFinalize, 5, || {
            let layout = finalize_layout(
                &enabled,
                &expansion.combinations,
                &expansion.combination_rules,
                &expansion.rule_combinations,
                &predicates,
                &min_weights,
                field_dict.len(),
            )?;
            let metrics = StageMetrics::from([
                ("combinations", layout.predicate_count.len() as u64),
                ("rules", layout.rules.len() as u64),
                (
                    "soa_predicate_slots",
                    layout.combo_predicate_ids.len() as u64,
                ),
            ]);
            Ok((layout, metrics))
        })?;

        // -- VALIDATE ------------------------------------------------------
        run_stage(listener, &mut stages, Stage::Validate, 6, || {
            validate_model(&layout, &expansion.combinations, &inverted_index)?;
            let metrics = StageMetrics::from([(
                "combinations_validated",
                expansion.combinations.len() as u64,
            )]);
            Ok(((), metrics))
        })?;

        let seed = corpus_seed(rules)?;
        let predicate_sets = build_predicate_set_cache(&self.config.cache.predicate_sets)?;

        let report = CompilationReport {
            total_duration: compile_start.elapsed(),
            rules_total: rules.len() as u64,
            rules_compiled: layout.rules.len() as u64,
            predicates: predicates.len() as u64,
            combinations: layout.predicate_count.len() as u64,
            stages,
        };
        info!(
            rules = report.rules_compiled,
            combinations = report.combinations,
            predicates = report.predicates,
            duration_ms = report.total_duration.as_millis() as u64,
            "rule corpus compiled"
        );

        Ok(Arc::new(EngineModel::from_parts(ModelParts {
            seed,
            field_dict,
            value_dict,
            predicates,
            predicates_by_weight,
            predicate_count: layout.predicate_count,
            priority: layout.priority,
            rule_code: layout.rule_code,
            combo_offsets: layout.combo_offsets,
            combo_predicate_ids: layout.combo_predicate_ids,
            combination_rules: expansion.combination_rules,
            rules: layout.rules,
            inverted_index,
            static_fields,
            field_plans: layout.field_plans,
            report,
            predicate_sets,
        })))
    }
}

fn run_stage<T>(
    listener: &mut dyn CompilationListener,
    stages: &mut Vec<StageReport>,
    stage: Stage,
    index: usize,
    f: impl FnOnce() -> HeliosResult<(T, StageMetrics)>,
) -> HeliosResult<T> {
    listener.on_stage_start(stage, index, Stage::ALL.len());
    let started = Instant::now();
    match f() {
        Ok((value, metrics)) => {
            let duration = started.elapsed();
            listener.on_stage_complete(stage, duration, &metrics);
            stages.push(StageReport {
                stage,
                duration,
                metrics,
            });
            Ok(value)
        }
        Err(err) => {
            listener.on_error(stage, &err);
            Err(err)
        }
    }
}

/// Content-derived seed branding the model's cache keys: stable across
/// processes for an identical rule corpus.
fn corpus_seed(rules: &RuleSet) -> HeliosResult<u64> {
    let serialized = serde_json::to_vec(rules)?;
    Ok(xxh3_64(&serialized))
}

fn scalar_operand(scalar: &ScalarValue, value_dict: &mut Dictionary) -> Operand {
    match scalar {
        ScalarValue::String(s) => Operand::Value(value_dict.encode(&fold_value(s))),
        ScalarValue::Number(n) => Operand::Number(*n),
        ScalarValue::Bool(b) => Operand::Bool(*b),
    }
}

fn encode_rule(
    rule: &RuleDefinition,
    field_dict: &mut Dictionary,
    value_dict: &mut Dictionary,
) -> HeliosResult<EncodedRule> {
    let mut conditions = Vec::with_capacity(rule.conditions.len());
    for condition in &rule.conditions {
        let field = field_dict.encode(&normalize_field_name(&condition.field));
        let encoded = match (condition.operator, &condition.value) {
            (Operator::EqualTo | Operator::NotEqualTo, ConditionValue::Scalar(scalar)) => {
                EncodedCondition::Single(PredicateProto {
                    field,
                    operator: condition.operator,
                    operand: scalar_operand(scalar, value_dict),
                })
            }
            (
                Operator::GreaterThan | Operator::LessThan,
                ConditionValue::Scalar(ScalarValue::Number(n)),
            ) => EncodedCondition::Single(PredicateProto {
                field,
                operator: condition.operator,
                operand: Operand::Number(*n),
            }),
            (Operator::Between, ConditionValue::List(bounds)) => {
                let operand = match (&bounds[0], &bounds[1]) {
                    (ScalarValue::Number(lo), ScalarValue::Number(hi)) => {
                        Operand::Range(*lo, *hi)
                    }
                    (ScalarValue::String(lo), ScalarValue::String(hi)) => {
                        let lo = fold_value(lo);
                        let hi = fold_value(hi);
                        value_dict.encode(&lo);
                        value_dict.encode(&hi);
                        Operand::StrRange(Arc::from(lo.as_str()), Arc::from(hi.as_str()))
                    }
                    // validate() guarantees matched bound kinds.
                    _ => unreachable!("validated BETWEEN bounds"),
                };
                EncodedCondition::Single(PredicateProto {
                    field,
                    operator: Operator::Between,
                    operand,
                })
            }
            (Operator::IsAnyOf, ConditionValue::List(options)) => EncodedCondition::AnyOf(
                options
                    .iter()
                    .map(|scalar| PredicateProto {
                        field,
                        operator: Operator::EqualTo,
                        operand: scalar_operand(scalar, value_dict),
                    })
                    .collect(),
            ),
            (Operator::Contains, ConditionValue::Scalar(ScalarValue::String(needle))) => {
                let folded = fold_value(needle);
                value_dict.encode(&folded);
                EncodedCondition::Single(PredicateProto {
                    field,
                    operator: Operator::Contains,
                    operand: Operand::Needle(Arc::from(folded.as_str())),
                })
            }
            (Operator::Regex, ConditionValue::Scalar(ScalarValue::String(pattern))) => {
                let regex = compile_full_match(pattern).map_err(|err| {
                    HeliosError::invalid_rule(
                        &rule.rule_code,
                        format!("uncompilable regex '{}': {}", pattern, err),
                    )
                })?;
                EncodedCondition::Single(PredicateProto {
                    field,
                    operator: Operator::Regex,
                    operand: Operand::Pattern {
                        source: Arc::from(pattern.as_str()),
                        regex: Arc::new(regex),
                    },
                })
            }
            // validate() rejects every other operator/value pairing.
            _ => unreachable!("validated condition shape"),
        };
        conditions.push(encoded);
    }
    Ok(EncodedRule { conditions })
}

/// SoA arrays plus rule metadata and field plans.
struct Layout {
    predicate_count: Vec<u16>,
    priority: Vec<i32>,
    rule_code: Vec<Arc<str>>,
    combo_offsets: Vec<u32>,
    combo_predicate_ids: Vec<u32>,
    rules: Vec<RuleMetadata>,
    field_plans: Vec<FieldPlan>,
}

fn finalize_layout(
    enabled: &[&RuleDefinition],
    combinations: &[Vec<u32>],
    combination_rules: &[SmallVec<[u32; 1]>],
    rule_combinations: &[Vec<u32>],
    predicates: &[Predicate],
    min_weights: &[f32],
    field_count: usize,
) -> HeliosResult<Layout> {
    // Rule metadata first; the SoA rule_code column borrows these Arcs.
    let rules: Vec<RuleMetadata> = enabled
        .iter()
        .enumerate()
        .map(|(rule_id, def)| RuleMetadata {
            rule_id: rule_id as u32,
            rule_code: Arc::from(def.rule_code.as_str()),
            priority: def.priority,
            description: def.description.as_deref().map(Arc::from),
            tags: def.tags.clone(),
            conditions: def.conditions.clone(),
            combination_ids: rule_combinations[rule_id].clone(),
        })
        .collect();

    let count = combinations.len();
    let mut predicate_count = Vec::with_capacity(count);
    let mut priority = Vec::with_capacity(count);
    let mut rule_code = Vec::with_capacity(count);
    let mut combo_offsets = Vec::with_capacity(count + 1);
    let mut combo_predicate_ids =
        Vec::with_capacity(combinations.iter().map(|c| c.len()).sum::<usize>());

    combo_offsets.push(0u32);
    for (combination, predicate_ids) in combinations.iter().enumerate() {
        if predicate_ids.len() > u16::MAX as usize {
            return Err(HeliosError::integrity(
                Stage::LayoutFinalize.as_str(),
                format!(
                    "combination {} has {} predicates, exceeding the counter width",
                    combination,
                    predicate_ids.len()
                ),
            ));
        }
        predicate_count.push(predicate_ids.len() as u16);
        combo_predicate_ids.extend_from_slice(predicate_ids);
        combo_offsets.push(combo_predicate_ids.len() as u32);

        let first_rule = combination_rules[combination]
            .first()
            .copied()
            .ok_or_else(|| {
                HeliosError::integrity(
                    Stage::LayoutFinalize.as_str(),
                    format!("combination {} has no owning rule", combination),
                )
            })?;
        priority.push(rules[first_rule as usize].priority);
        rule_code.push(Arc::clone(&rules[first_rule as usize].rule_code));
    }

    // Per-field evaluation plans: every predicate routed to its family.
    let mut field_plans: Vec<FieldPlan> = Vec::with_capacity(field_count);
    field_plans.resize_with(field_count, FieldPlan::default);
    for predicate in predicates {
        let plan = &mut field_plans[predicate.field as usize];
        if predicate.is_static() {
            plan.equality.add(predicate);
            continue;
        }
        match &predicate.operand {
            Operand::Number(_) | Operand::Range(..) => plan.numeric.add(predicate),
            Operand::StrRange(..) => plan.str_ranges.add(predicate),
            Operand::Needle(_) => plan.contains.add(predicate),
            Operand::Pattern { .. } => plan.regexes.add(predicate),
            // Static operands were routed above.
            Operand::Value(_) | Operand::Bool(_) => unreachable!("static predicate routed twice"),
        }
    }
    for (field, plan) in field_plans.iter_mut().enumerate() {
        plan.min_weight = min_weights[field];
    }

    Ok(Layout {
        predicate_count,
        priority,
        rule_code,
        combo_offsets,
        combo_predicate_ids,
        rules,
        field_plans,
    })
}

fn validate_model(
    layout: &Layout,
    combinations: &[Vec<u32>],
    inverted_index: &[roaring::RoaringBitmap],
) -> HeliosResult<()> {
    let stage = Stage::Validate.as_str();
    let count = combinations.len();

    for (combination, predicate_ids) in combinations.iter().enumerate() {
        if predicate_ids.is_empty() {
            return Err(HeliosError::integrity(
                stage,
                format!("combination {} has zero predicates", combination),
            ));
        }
    }

    if layout.predicate_count.len() != count
        || layout.priority.len() != count
        || layout.rule_code.len() != count
        || layout.combo_offsets.len() != count + 1
    {
        return Err(HeliosError::integrity(
            stage,
            "SoA arrays indexed by combinationId disagree in length".to_string(),
        ));
    }

    for (combination, predicate_ids) in combinations.iter().enumerate() {
        let start = layout.combo_offsets[combination] as usize;
        let end = layout.combo_offsets[combination + 1] as usize;
        if end - start != predicate_ids.len()
            || layout.predicate_count[combination] as usize != predicate_ids.len()
        {
            return Err(HeliosError::integrity(
                stage,
                format!("combination {} predicate slice is inconsistent", combination),
            ));
        }
    }

    if count > 0 && inverted_index.iter().all(|bitmap| bitmap.is_empty()) {
        return Err(HeliosError::integrity(
            stage,
            "inverted index is empty for a non-empty model".to_string(),
        ));
    }
    for (predicate, bitmap) in inverted_index.iter().enumerate() {
        if bitmap.is_empty() {
            return Err(HeliosError::integrity(
                stage,
                format!("predicate {} is indexed by no combination", predicate),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ruleset(json: &str) -> RuleSet {
        RuleSet::from_json_str(json).unwrap()
    }

    #[test]
    fn test_compile_minimal_corpus() {
        let rules = ruleset(
            r#"[{"ruleCode": "R1", "priority": 10, "conditions": [
                {"field": "status", "operator": "EQUAL_TO", "value": "ACTIVE"},
                {"field": "amount", "operator": "GREATER_THAN", "value": 100}
            ]}]"#,
        );
        let model = Compiler::with_defaults().compile(&rules).unwrap();
        assert_eq!(model.rule_count(), 1);
        assert_eq!(model.combination_count(), 1);
        assert_eq!(model.predicate_total(), 2);
        assert_eq!(model.required(0), 2);
    }

    #[test]
    fn test_disabled_rules_are_skipped() {
        let rules = ruleset(
            r#"[
                {"ruleCode": "ON", "conditions": [{"field": "a", "operator": "EQUAL_TO", "value": "x"}]},
                {"ruleCode": "OFF", "enabled": false,
                 "conditions": [{"field": "a", "operator": "EQUAL_TO", "value": "y"}]}
            ]"#,
        );
        let model = Compiler::with_defaults().compile(&rules).unwrap();
        assert_eq!(model.rule_count(), 1);
        assert!(model.rule_metadata("OFF").is_none());
    }

    #[test]
    fn test_listener_sees_all_stages_in_order() {
        #[derive(Default)]
        struct Recorder {
            started: Vec<&'static str>,
            completed: Vec<&'static str>,
        }
        impl CompilationListener for Recorder {
            fn on_stage_start(&mut self, stage: Stage, _index: usize, _count: usize) {
                self.started.push(stage.as_str());
            }
            fn on_stage_complete(
                &mut self,
                stage: Stage,
                _duration: Duration,
                _metrics: &StageMetrics,
            ) {
                self.completed.push(stage.as_str());
            }
        }

        let rules = ruleset(
            r#"[{"ruleCode": "R1", "conditions": [
                {"field": "status", "operator": "EQUAL_TO", "value": "ACTIVE"}
            ]}]"#,
        );
        let mut recorder = Recorder::default();
        Compiler::with_defaults()
            .compile_with_listener(&rules, &mut recorder)
            .unwrap();

        let expected = [
            "PARSE_VALIDATE",
            "DICTIONARY_ENCODE",
            "EXPAND_DEDUPLICATE",
            "WEIGHT_PROFILE",
            "INDEX_BUILD",
            "LAYOUT_FINALIZE",
            "VALIDATE",
        ];
        assert_eq!(recorder.started, expected);
        assert_eq!(recorder.completed, expected);
    }

    #[test]
    fn test_listener_observes_failures() {
        struct FailureSpy(Option<&'static str>);
        impl CompilationListener for FailureSpy {
            fn on_error(&mut self, stage: Stage, _error: &HeliosError) {
                self.0 = Some(stage.as_str());
            }
        }

        let rules = ruleset(
            r#"[{"ruleCode": "BAD", "conditions": [
                {"field": "x", "operator": "REGEX", "value": "(unclosed"}
            ]}]"#,
        );
        let mut spy = FailureSpy(None);
        let result = Compiler::with_defaults().compile_with_listener(&rules, &mut spy);
        assert!(result.is_err());
        assert_eq!(spy.0, Some("DICTIONARY_ENCODE"));
    }

    #[test]
    fn test_uncompilable_regex_names_the_rule() {
        let rules = ruleset(
            r#"[{"ruleCode": "BAD_RE", "conditions": [
                {"field": "x", "operator": "REGEX", "value": "["}
            ]}]"#,
        );
        let err = Compiler::with_defaults().compile(&rules).unwrap_err();
        assert!(err.to_string().contains("BAD_RE"));
    }

    #[test]
    fn test_is_any_of_expansion_counts() {
        let rules = ruleset(
            r#"[{"ruleCode": "R1", "conditions": [
                {"field": "country", "operator": "IS_ANY_OF", "value": ["US", "CA", "MX"]},
                {"field": "tier", "operator": "EQUAL_TO", "value": "gold"}
            ]}]"#,
        );
        let model = Compiler::with_defaults().compile(&rules).unwrap();
        assert_eq!(model.combination_count(), 3);
        assert_eq!(model.combination_ids_for_rule("R1").unwrap().len(), 3);
        // 3 country equalities + 1 tier equality, deduplicated.
        assert_eq!(model.predicate_total(), 4);
    }

    #[test]
    fn test_seed_stable_for_identical_corpus() {
        let corpus = r#"[{"ruleCode": "R1", "conditions": [
            {"field": "status", "operator": "EQUAL_TO", "value": "ACTIVE"}
        ]}]"#;
        let a = Compiler::with_defaults().compile(&ruleset(corpus)).unwrap();
        let b = Compiler::with_defaults().compile(&ruleset(corpus)).unwrap();
        assert_eq!(a.seed(), b.seed());
    }

    #[test]
    fn test_report_retained_on_model() {
        let rules = ruleset(
            r#"[{"ruleCode": "R1", "conditions": [
                {"field": "status", "operator": "EQUAL_TO", "value": "ACTIVE"}
            ]}]"#,
        );
        let model = Compiler::with_defaults().compile(&rules).unwrap();
        let report = model.report();
        assert_eq!(report.stages.len(), 7);
        assert_eq!(report.rules_compiled, 1);
        assert!(report.format_report().contains("PARSE_VALIDATE"));
    }
}
