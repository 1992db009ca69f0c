//! The frozen engine model.
//!
//! `EngineModel` is the immutable snapshot the evaluator reads: dictionaries,
//! the deduplicated predicate table, combinations in Structure-of-Arrays
//! layout, the inverted index, the combination-to-rules mapping, and the
//! per-field evaluation plans prepared by the compiler. A model is shared
//! read-only across all evaluator workers; hot-swapping installs a new model
//! atomically and the old one (with its caches) dies with its last
//! reference.
//!
//! ## SoA layout
//!
//! ```text
//! combination c:
//!   predicate_count[c]                      required counter value
//!   priority[c]                             first owning rule's priority
//!   rule_code[c]                            first owning rule's code
//!   combo_predicate_ids[offsets[c]..offsets[c+1]]   sorted predicate IDs
//!   combination_rules[c]                    all owning rule indices
//! ```

use crate::cache::{
    fingerprint_with, BaseConditionResult, Fingerprint, FingerprintCache, PredicateSetCacheHandle,
};
use crate::compiler::CompilationReport;
use crate::dictionary::Dictionary;
use crate::eval::equality::EqualityFamily;
use crate::eval::numeric::NumericFamily;
use crate::eval::patterns::RegexFamily;
use crate::eval::strings::{ContainsFamily, StrRangeFamily};
use crate::event::{EncodedEvent, EncodedValue, Event};
use crate::predicate::{FieldId, Operand, Predicate, PredicateId};
use crate::rules::ConditionDefinition;
use roaring::RoaringBitmap;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

/// Domain separator so predicate-set cache keys never collide with
/// base-condition fingerprints computed from the same model seed.
const PREDICATE_SET_DOMAIN: u64 = 0x9e37_79b9_7f4a_7c15;

// Fingerprint value tags. Each encoded value hashes as tag + payload so
// field/value pairing and value kinds are unambiguous in the key.
const TAG_ABSENT: u8 = 0;
const TAG_VALUE: u8 = 1;
const TAG_UNKNOWN_TEXT: u8 = 2;
const TAG_NUMBER: u8 = 3;
const TAG_BOOL: u8 = 4;

/// Queryable metadata for one logical rule.
#[derive(Debug, Clone)]
pub struct RuleMetadata {
    pub rule_id: u32,
    pub rule_code: Arc<str>,
    pub priority: i32,
    pub description: Option<Arc<str>>,
    pub tags: Vec<String>,
    /// Source conditions as authored (pre-expansion), kept for explanation
    pub conditions: Vec<ConditionDefinition>,
    /// Combinations owned by this rule after IS_ANY_OF expansion
    pub combination_ids: Vec<u32>,
}

/// Prepared evaluator state for one field.
#[derive(Debug, Default)]
pub struct FieldPlan {
    /// The cheapest reason to look at this field; drives dispatch order
    pub min_weight: f32,
    pub equality: EqualityFamily,
    pub numeric: NumericFamily,
    pub str_ranges: StrRangeFamily,
    pub contains: ContainsFamily,
    pub regexes: RegexFamily,
}

impl FieldPlan {
    /// Whether the per-field dispatcher has anything to do here. The
    /// equality family is excluded: it is evaluated in the base-condition
    /// stage.
    pub fn has_dynamic(&self) -> bool {
        !self.numeric.is_empty()
            || !self.str_ranges.is_empty()
            || !self.contains.is_empty()
            || !self.regexes.is_empty()
    }
}

/// Static predicates of one field plus the union of combinations that
/// require any of them (for the absent-field fast path).
#[derive(Debug)]
pub struct StaticFieldPlan {
    pub field: FieldId,
    pub predicates: Vec<PredicateId>,
    pub mask: RoaringBitmap,
}

/// Everything the compiler materializes; assembled by `EngineModel::from_parts`.
pub(crate) struct ModelParts {
    pub seed: u64,
    pub field_dict: Dictionary,
    pub value_dict: Dictionary,
    pub predicates: Vec<Predicate>,
    pub predicates_by_weight: Vec<PredicateId>,
    pub predicate_count: Vec<u16>,
    pub priority: Vec<i32>,
    pub rule_code: Vec<Arc<str>>,
    pub combo_offsets: Vec<u32>,
    pub combo_predicate_ids: Vec<u32>,
    pub combination_rules: Vec<SmallVec<[u32; 1]>>,
    pub rules: Vec<RuleMetadata>,
    pub inverted_index: Vec<RoaringBitmap>,
    pub static_fields: Vec<StaticFieldPlan>,
    pub field_plans: Vec<FieldPlan>,
    pub report: CompilationReport,
    pub predicate_sets: PredicateSetCacheHandle,
}

/// The frozen snapshot the evaluator reads.
pub struct EngineModel {
    seed: u64,
    field_dict: Dictionary,
    value_dict: Dictionary,
    predicates: Vec<Predicate>,
    predicates_by_weight: Vec<PredicateId>,
    predicate_count: Vec<u16>,
    priority: Vec<i32>,
    rule_code: Vec<Arc<str>>,
    combo_offsets: Vec<u32>,
    combo_predicate_ids: Vec<u32>,
    combination_rules: Vec<SmallVec<[u32; 1]>>,
    rules: Vec<RuleMetadata>,
    rules_by_code: HashMap<Arc<str>, u32>,
    inverted_index: Vec<RoaringBitmap>,
    all_combinations: RoaringBitmap,
    static_fields: Vec<StaticFieldPlan>,
    field_plans: Vec<FieldPlan>,
    report: CompilationReport,
    /// Eligible-predicate-set cache; lives on the model so a hot-swap
    /// reclaims it atomically with everything else.
    predicate_sets: PredicateSetCacheHandle,
}

impl std::fmt::Debug for EngineModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineModel")
            .field("seed", &format_args!("{:016x}", self.seed))
            .field("rules", &self.rules.len())
            .field("combinations", &self.combination_count())
            .field("predicates", &self.predicates.len())
            .finish()
    }
}

impl EngineModel {
    pub(crate) fn from_parts(parts: ModelParts) -> Self {
        let rules_by_code = parts
            .rules
            .iter()
            .map(|rule| (Arc::clone(&rule.rule_code), rule.rule_id))
            .collect();
        let all_combinations: RoaringBitmap = (0..parts.predicate_count.len() as u32).collect();
        EngineModel {
            seed: parts.seed,
            field_dict: parts.field_dict,
            value_dict: parts.value_dict,
            predicates: parts.predicates,
            predicates_by_weight: parts.predicates_by_weight,
            predicate_count: parts.predicate_count,
            priority: parts.priority,
            rule_code: parts.rule_code,
            combo_offsets: parts.combo_offsets,
            combo_predicate_ids: parts.combo_predicate_ids,
            combination_rules: parts.combination_rules,
            rules: parts.rules,
            rules_by_code,
            inverted_index: parts.inverted_index,
            all_combinations,
            static_fields: parts.static_fields,
            field_plans: parts.field_plans,
            report: parts.report,
            predicate_sets: parts.predicate_sets,
        }
    }

    // ------------------------------------------------------------------
    // Shape accessors
    // ------------------------------------------------------------------

    pub fn combination_count(&self) -> usize {
        self.predicate_count.len()
    }

    pub fn predicate_total(&self) -> usize {
        self.predicates.len()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Content-derived seed branding this model's cache keys. Stable across
    /// processes for an identical rule corpus.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn report(&self) -> &CompilationReport {
        &self.report
    }

    pub fn predicate(&self, id: PredicateId) -> &Predicate {
        &self.predicates[id as usize]
    }

    /// The flat predicate list sorted by ascending weight.
    pub fn predicates_by_weight(&self) -> &[PredicateId] {
        &self.predicates_by_weight
    }

    /// Required counter value for a combination.
    #[inline]
    pub fn required(&self, combination: u32) -> u16 {
        self.predicate_count[combination as usize]
    }

    /// Sorted predicate IDs of a combination.
    pub fn predicates_of(&self, combination: u32) -> &[PredicateId] {
        let start = self.combo_offsets[combination as usize] as usize;
        let end = self.combo_offsets[combination as usize + 1] as usize;
        &self.combo_predicate_ids[start..end]
    }

    /// Rule indices owning a combination.
    #[inline]
    pub fn rules_of(&self, combination: u32) -> &[u32] {
        &self.combination_rules[combination as usize]
    }

    #[inline]
    pub fn inverted(&self, predicate: PredicateId) -> &RoaringBitmap {
        &self.inverted_index[predicate as usize]
    }

    pub fn all_combinations(&self) -> &RoaringBitmap {
        &self.all_combinations
    }

    pub fn static_fields(&self) -> &[StaticFieldPlan] {
        &self.static_fields
    }

    #[inline]
    pub fn field_plan(&self, field: FieldId) -> Option<&FieldPlan> {
        self.field_plans.get(field as usize)
    }

    pub fn field_dict(&self) -> &Dictionary {
        &self.field_dict
    }

    pub fn value_dict(&self) -> &Dictionary {
        &self.value_dict
    }

    /// First owning rule's code for a combination (kept for compatibility
    /// with single-rule-per-combination consumers).
    pub fn first_rule_code(&self, combination: u32) -> &Arc<str> {
        &self.rule_code[combination as usize]
    }

    /// First owning rule's priority for a combination.
    pub fn first_priority(&self, combination: u32) -> i32 {
        self.priority[combination as usize]
    }

    // ------------------------------------------------------------------
    // Metadata query surface
    // ------------------------------------------------------------------

    pub fn rule(&self, rule_id: u32) -> &RuleMetadata {
        &self.rules[rule_id as usize]
    }

    pub fn rule_metadata(&self, rule_code: &str) -> Option<&RuleMetadata> {
        self.rules_by_code
            .get(rule_code)
            .map(|&id| &self.rules[id as usize])
    }

    pub fn combination_ids_for_rule(&self, rule_code: &str) -> Option<&[u32]> {
        self.rule_metadata(rule_code)
            .map(|rule| rule.combination_ids.as_slice())
    }

    /// Rules whose combinations reference a predicate.
    pub fn rules_using_predicate(&self, predicate: PredicateId) -> Vec<&RuleMetadata> {
        let mut seen = vec![false; self.rules.len()];
        let mut found = Vec::new();
        if let Some(bitmap) = self.inverted_index.get(predicate as usize) {
            for combination in bitmap {
                for &rule_id in self.rules_of(combination) {
                    if !seen[rule_id as usize] {
                        seen[rule_id as usize] = true;
                        found.push(&self.rules[rule_id as usize]);
                    }
                }
            }
        }
        found
    }

    pub fn all_rule_metadata(&self) -> &[RuleMetadata] {
        &self.rules
    }

    // ------------------------------------------------------------------
    // Event encoding and the base-condition stage
    // ------------------------------------------------------------------

    /// Dictionary-encode an event against this model.
    pub fn encode_event(&self, event: &Event) -> EncodedEvent {
        EncodedEvent::encode(event, &self.field_dict, &self.value_dict)
    }

    /// 128-bit fingerprint of the event's static portion: for every static
    /// field in ascending field order, the field ID and each encoded value
    /// (or an absence marker). Seeded by the model's content seed.
    pub fn event_fingerprint(&self, encoded: &EncodedEvent) -> Fingerprint {
        fingerprint_with(self.seed, |w| {
            for static_field in &self.static_fields {
                w.write_u32(static_field.field);
                match encoded.get(static_field.field) {
                    None => w.write_u8(TAG_ABSENT),
                    Some(values) => {
                        for value in values.iter() {
                            match value {
                                EncodedValue::Text {
                                    value_id: Some(id), ..
                                } => {
                                    w.write_u8(TAG_VALUE);
                                    w.write_u32(*id);
                                }
                                // Unknown strings equal no interned operand
                                // and differ from all of them; one tag class
                                // covers every such value.
                                EncodedValue::Text { value_id: None, .. } => {
                                    w.write_u8(TAG_UNKNOWN_TEXT)
                                }
                                EncodedValue::Number(n) => {
                                    w.write_u8(TAG_NUMBER);
                                    w.write_u64(n.to_bits());
                                }
                                EncodedValue::Bool(b) => {
                                    w.write_u8(TAG_BOOL);
                                    w.write_u8(*b as u8);
                                }
                            }
                        }
                    }
                }
            }
        })
    }

    /// Evaluate the static portion: the eligible-combination bitmap and the
    /// static predicates proven true. Returns the result plus the number of
    /// static predicates examined.
    pub fn base_conditions(&self, encoded: &EncodedEvent) -> (BaseConditionResult, u32) {
        let mut eligible = self.all_combinations.clone();
        let mut true_static = Vec::new();
        let mut evaluated = 0u32;

        for static_field in &self.static_fields {
            match encoded.get(static_field.field) {
                None => {
                    // Every static predicate on an absent field is false;
                    // one subtraction covers them all.
                    evaluated += static_field.predicates.len() as u32;
                    eligible -= &static_field.mask;
                }
                Some(values) => {
                    let plan = &self.field_plans[static_field.field as usize];
                    let truths = plan.equality.evaluate(values);
                    evaluated += static_field.predicates.len() as u32;
                    for &predicate in &static_field.predicates {
                        if truths.contains(&predicate) {
                            true_static.push(predicate);
                        } else {
                            eligible -= &self.inverted_index[predicate as usize];
                        }
                    }
                }
            }
            if eligible.is_empty() {
                break;
            }
        }

        (
            BaseConditionResult {
                eligible,
                true_static,
            },
            evaluated,
        )
    }

    /// Union of predicate IDs referenced by the eligible combinations,
    /// cached by bitmap identity on the model.
    pub fn eligible_predicates(&self, eligible: &RoaringBitmap) -> Arc<RoaringBitmap> {
        let key = fingerprint_with(self.seed ^ PREDICATE_SET_DOMAIN, |w| {
            eligible
                .serialize_into(w)
                .expect("fingerprint writer never fails");
        });
        if let Some(set) = self.predicate_sets.get(&key) {
            return set;
        }

        let mut union = RoaringBitmap::new();
        for combination in eligible {
            for &predicate in self.predicates_of(combination) {
                union.insert(predicate);
            }
        }
        let union = Arc::new(union);
        self.predicate_sets.put(key, Arc::clone(&union));
        union
    }

    /// Stats of the model-owned predicate-set cache.
    pub fn predicate_set_cache_stats(&self) -> crate::metrics::CacheSnapshot {
        self.predicate_sets.stats()
    }

    /// Decoded, human-readable form of a predicate, for traces and
    /// explanations. Never called on the hot path.
    pub fn describe_predicate(&self, id: PredicateId) -> String {
        let predicate = &self.predicates[id as usize];
        let field = self
            .field_dict
            .decode(predicate.field)
            .unwrap_or("<unknown field>");
        let operand = match &predicate.operand {
            Operand::Value(v) => self
                .value_dict
                .decode(*v)
                .map(|s| format!("'{}'", s))
                .unwrap_or_else(|| "<unknown value>".to_string()),
            Operand::Bool(b) => b.to_string(),
            Operand::Number(n) => n.to_string(),
            Operand::Range(lo, hi) => format!("[{}, {}]", lo, hi),
            Operand::StrRange(lo, hi) => format!("['{}', '{}']", lo, hi),
            Operand::Needle(n) => format!("'{}'", n),
            Operand::Pattern { source, .. } => format!("/{}/", source),
        };
        format!("{} {} {}", field, predicate.operator.as_str(), operand)
    }
}
