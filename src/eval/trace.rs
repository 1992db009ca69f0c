//! Lazy evaluation traces and rule explanations.
//!
//! Trace capture is split from trace materialization: the hot path records
//! only IDs and primitive counts into an [`EvalTrace`]; decoding field and
//! value names and formatting reasons happen in [`EvalTrace::render`], paid
//! only when someone reads the trace. `explain_rule` re-evaluates one
//! rule's source conditions interpretively; it is a diagnostic surface,
//! not a hot path.

use crate::dictionary::{fold_value, normalize_field_name};
use crate::event::{EncodedEvent, EncodedValue};
use crate::model::EngineModel;
use crate::predicate::{FieldId, Operator, PredicateId};
use crate::rules::{ConditionDefinition, ConditionValue, ScalarValue};
use serde::Serialize;

/// How much the trace captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceLevel {
    /// Counts and cache outcomes only
    Basic,
    /// Plus every true predicate and hit combination
    Detailed,
}

/// Hot-path capture: references and primitive counts only.
#[derive(Debug, Clone)]
pub struct EvalTrace {
    pub level: TraceLevel,
    pub base_cache_hit: bool,
    pub eligible_combinations: u64,
    pub eligible_predicates: u64,
    pub predicates_evaluated: u32,
    /// Static predicates proven true by the base stage (Detailed only)
    pub static_true: Vec<PredicateId>,
    /// All true predicates, discovery order (Detailed only)
    pub true_predicates: Vec<PredicateId>,
    /// Combinations whose counters saturated
    pub hit_combinations: Vec<u32>,
    /// Fields visited by the dispatcher, dispatch order
    pub visited_fields: Vec<FieldId>,
}

impl EvalTrace {
    pub fn new(level: TraceLevel) -> Self {
        EvalTrace {
            level,
            base_cache_hit: false,
            eligible_combinations: 0,
            eligible_predicates: 0,
            predicates_evaluated: 0,
            static_true: Vec::new(),
            true_predicates: Vec::new(),
            hit_combinations: Vec::new(),
            visited_fields: Vec::new(),
        }
    }

    /// Materialize the trace: all dictionary decodes and string formatting
    /// happen here, never during evaluation.
    pub fn render(&self, model: &EngineModel) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "base cache: {}\n",
            if self.base_cache_hit { "hit" } else { "miss" }
        ));
        out.push_str(&format!(
            "eligible combinations: {}\neligible predicates: {}\npredicates evaluated: {}\n",
            self.eligible_combinations, self.eligible_predicates, self.predicates_evaluated
        ));

        if !self.visited_fields.is_empty() {
            let fields: Vec<&str> = self
                .visited_fields
                .iter()
                .map(|&field| model.field_dict().decode(field).unwrap_or("<unknown>"))
                .collect();
            out.push_str(&format!("fields dispatched: {}\n", fields.join(", ")));
        }

        if self.level == TraceLevel::Detailed {
            out.push_str("true predicates:\n");
            for &predicate in &self.true_predicates {
                let origin = if self.static_true.contains(&predicate) {
                    " (static)"
                } else {
                    ""
                };
                out.push_str(&format!(
                    "  [{}] {}{}\n",
                    predicate,
                    model.describe_predicate(predicate),
                    origin
                ));
            }
        }

        out.push_str("hit combinations:\n");
        for &combination in &self.hit_combinations {
            out.push_str(&format!(
                "  [{}] {} predicates, first rule {}\n",
                combination,
                model.required(combination),
                model.first_rule_code(combination)
            ));
        }
        out
    }
}

/// Per-condition outcome in a rule explanation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionExplanation {
    pub field: String,
    pub operator: Operator,
    pub passed: bool,
    pub reason: String,
}

/// Outcome of `explain_rule`: every source condition with pass/fail.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Explanation {
    pub rule_code: String,
    pub matched: bool,
    pub conditions: Vec<ConditionExplanation>,
}

/// Evaluate one source condition against an encoded event, with a decoded
/// reason string.
pub(crate) fn explain_condition(
    model: &EngineModel,
    encoded: &EncodedEvent,
    condition: &ConditionDefinition,
) -> ConditionExplanation {
    let normalized = normalize_field_name(&condition.field);
    let explain = |passed: bool, reason: String| ConditionExplanation {
        field: normalized.clone(),
        operator: condition.operator,
        passed,
        reason,
    };

    let field = match model.field_dict().lookup(&normalized) {
        Some(field) => field,
        None => return explain(false, "field is not referenced by this model".to_string()),
    };
    let values = match encoded.get(field) {
        Some(values) => values,
        None => return explain(false, "field is absent from the event".to_string()),
    };

    let shown: Vec<String> = values.iter().map(describe_value).collect();
    let shown = shown.join(", ");

    let passed = values
        .iter()
        .any(|value| condition_matches(condition, value));
    let reason = if passed {
        format!("value {} satisfies {}", shown, describe_operand(condition))
    } else {
        format!(
            "value {} does not satisfy {}",
            shown,
            describe_operand(condition)
        )
    };
    explain(passed, reason)
}

fn condition_matches(condition: &ConditionDefinition, value: &EncodedValue) -> bool {
    match (condition.operator, &condition.value) {
        (Operator::EqualTo, ConditionValue::Scalar(scalar)) => scalar_equals(scalar, value),
        (Operator::NotEqualTo, ConditionValue::Scalar(scalar)) => {
            scalar_comparable(scalar, value) && !scalar_equals(scalar, value)
        }
        (Operator::GreaterThan, ConditionValue::Scalar(ScalarValue::Number(n))) => {
            matches!(value, EncodedValue::Number(v) if v > n)
        }
        (Operator::LessThan, ConditionValue::Scalar(ScalarValue::Number(n))) => {
            matches!(value, EncodedValue::Number(v) if v < n)
        }
        (Operator::Between, ConditionValue::List(bounds)) => match (&bounds[0], &bounds[1]) {
            (ScalarValue::Number(lo), ScalarValue::Number(hi)) => {
                matches!(value, EncodedValue::Number(v) if lo <= v && v <= hi)
            }
            (ScalarValue::String(lo), ScalarValue::String(hi)) => match value {
                EncodedValue::Text { folded, .. } => {
                    let lo = fold_value(lo);
                    let hi = fold_value(hi);
                    lo.as_str() <= folded.as_ref() && folded.as_ref() <= hi.as_str()
                }
                _ => false,
            },
            _ => false,
        },
        (Operator::IsAnyOf, ConditionValue::List(options)) => {
            options.iter().any(|option| scalar_equals(option, value))
        }
        (Operator::Contains, ConditionValue::Scalar(ScalarValue::String(needle))) => match value {
            EncodedValue::Text { folded, .. } => folded.contains(&fold_value(needle)),
            _ => false,
        },
        (Operator::Regex, ConditionValue::Scalar(ScalarValue::String(pattern))) => match value {
            EncodedValue::Text { original, .. } => {
                crate::eval::patterns::compile_full_match(pattern)
                    .map(|regex| regex.is_match(original))
                    .unwrap_or(false)
            }
            _ => false,
        },
        _ => false,
    }
}

fn scalar_equals(scalar: &ScalarValue, value: &EncodedValue) -> bool {
    match (scalar, value) {
        (ScalarValue::String(s), EncodedValue::Text { folded, .. }) => {
            fold_value(s) == folded.as_ref()
        }
        (ScalarValue::Number(n), EncodedValue::Number(v)) => n == v,
        (ScalarValue::Bool(b), EncodedValue::Bool(v)) => b == v,
        _ => false,
    }
}

/// Whether the operand and event value are of the same kind; NOT_EQUAL_TO
/// is false (not "different") across kinds.
fn scalar_comparable(scalar: &ScalarValue, value: &EncodedValue) -> bool {
    matches!(
        (scalar, value),
        (ScalarValue::String(_), EncodedValue::Text { .. })
            | (ScalarValue::Number(_), EncodedValue::Number(_))
            | (ScalarValue::Bool(_), EncodedValue::Bool(_))
    )
}

fn describe_value(value: &EncodedValue) -> String {
    match value {
        EncodedValue::Text { original, .. } => format!("'{}'", original),
        EncodedValue::Number(n) => n.to_string(),
        EncodedValue::Bool(b) => b.to_string(),
    }
}

fn describe_operand(condition: &ConditionDefinition) -> String {
    let operand = match &condition.value {
        ConditionValue::Scalar(scalar) => scalar.to_string(),
        ConditionValue::List(values) => {
            let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            format!("[{}]", parts.join(", "))
        }
    };
    format!("{} {}", condition.operator.as_str(), operand)
}
