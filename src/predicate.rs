//! Predicate atoms: `(field, operator, operand)` plus profiling data.
//!
//! Operators form a closed set; dispatch is a `match` on the tag, never a
//! virtual call. `IS_ANY_OF` exists only in rule definitions: the compiler
//! expands it into single-value `EQUAL_TO` conjunctions, so it never appears
//! in a compiled predicate.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Dense predicate identifier, assigned during compilation.
pub type PredicateId = u32;

/// Dense field identifier from the field dictionary.
pub type FieldId = u32;

/// Dense value identifier from the value dictionary.
pub type ValueId = u32;

/// The closed operator set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    EqualTo,
    NotEqualTo,
    GreaterThan,
    LessThan,
    Between,
    IsAnyOf,
    Contains,
    Regex,
}

impl Operator {
    /// The wire name used in rule definitions and listener output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::EqualTo => "EQUAL_TO",
            Operator::NotEqualTo => "NOT_EQUAL_TO",
            Operator::GreaterThan => "GREATER_THAN",
            Operator::LessThan => "LESS_THAN",
            Operator::Between => "BETWEEN",
            Operator::IsAnyOf => "IS_ANY_OF",
            Operator::Contains => "CONTAINS",
            Operator::Regex => "REGEX",
        }
    }
}

/// Compiled operand of a predicate.
///
/// String operands of the equality family are dictionary-encoded; numeric
/// operands stay raw. `Contains` needles are stored pre-folded so substring
/// checks are case-insensitive without per-event folding. `Regex` patterns
/// keep both the compiled full-match regex and the source pattern (for
/// dedup identity and explanation output).
#[derive(Debug, Clone)]
pub enum Operand {
    /// Interned string value (equality family)
    Value(ValueId),
    /// Boolean scalar (equality family)
    Bool(bool),
    /// Numeric scalar (equality and comparison families)
    Number(f64),
    /// Inclusive numeric range `[lo, hi]`
    Range(f64, f64),
    /// Inclusive lexicographic range over case-folded strings
    StrRange(Arc<str>, Arc<str>),
    /// Case-folded substring needle
    Needle(Arc<str>),
    /// Compiled full-match pattern plus its source text
    Pattern { source: Arc<str>, regex: Arc<Regex> },
}

/// Deduplication identity of a predicate: `(field, operator, operand)`.
///
/// Weight and selectivity are deliberately excluded: predicates that differ
/// only in profiling data collapse to one ID. Floats participate via their
/// bit patterns so the key is hashable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PredicateKey {
    pub field: FieldId,
    pub operator: Operator,
    pub operand: OperandKey,
}

/// Hashable projection of [`Operand`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperandKey {
    Value(ValueId),
    Bool(bool),
    Number(u64),
    Range(u64, u64),
    StrRange(Arc<str>, Arc<str>),
    Needle(Arc<str>),
    Pattern(Arc<str>),
}

impl Operand {
    pub fn key(&self) -> OperandKey {
        match self {
            Operand::Value(v) => OperandKey::Value(*v),
            Operand::Bool(b) => OperandKey::Bool(*b),
            Operand::Number(n) => OperandKey::Number(n.to_bits()),
            Operand::Range(lo, hi) => OperandKey::Range(lo.to_bits(), hi.to_bits()),
            Operand::StrRange(lo, hi) => OperandKey::StrRange(Arc::clone(lo), Arc::clone(hi)),
            Operand::Needle(n) => OperandKey::Needle(Arc::clone(n)),
            Operand::Pattern { source, .. } => OperandKey::Pattern(Arc::clone(source)),
        }
    }
}

/// A compiled predicate atom.
#[derive(Debug, Clone)]
pub struct Predicate {
    pub id: PredicateId,
    pub field: FieldId,
    pub operator: Operator,
    pub operand: Operand,
    /// Cost estimate used for evaluation ordering (regex > contains >
    /// between > numeric compare > equality)
    pub weight: f32,
    /// Expected fraction of events for which this predicate is true
    pub selectivity: f32,
}

impl Predicate {
    pub fn key(&self) -> PredicateKey {
        PredicateKey {
            field: self.field,
            operator: self.operator,
            operand: self.operand.key(),
        }
    }

    /// Whether this predicate belongs to the static portion memoized by the
    /// base-condition cache: equality-family operators over
    /// dictionary-encodable operands. Their outcome is fully determined by
    /// the encoded value of the field, with no numeric or string scans.
    pub fn is_static(&self) -> bool {
        matches!(self.operator, Operator::EqualTo | Operator::NotEqualTo)
            && matches!(self.operand, Operand::Value(_) | Operand::Bool(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn equality(id: PredicateId, field: FieldId, value: ValueId, weight: f32) -> Predicate {
        Predicate {
            id,
            field,
            operator: Operator::EqualTo,
            operand: Operand::Value(value),
            weight,
            selectivity: 0.05,
        }
    }

    #[test]
    fn test_operator_wire_names() {
        assert_eq!(Operator::EqualTo.as_str(), "EQUAL_TO");
        assert_eq!(Operator::IsAnyOf.as_str(), "IS_ANY_OF");
        let parsed: Operator = serde_json::from_str("\"GREATER_THAN\"").unwrap();
        assert_eq!(parsed, Operator::GreaterThan);
    }

    #[test]
    fn test_dedup_key_ignores_weight() {
        let a = equality(0, 3, 7, 1.0);
        let b = equality(1, 3, 7, 99.0);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_dedup_key_distinguishes_operands() {
        let a = equality(0, 3, 7, 1.0);
        let b = equality(1, 3, 8, 1.0);
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_range_key_uses_bit_patterns() {
        let a = Operand::Range(100.0, 200.0).key();
        let b = Operand::Range(100.0, 200.0).key();
        assert_eq!(a, b);
    }

    #[test]
    fn test_static_classification() {
        let stat = equality(0, 1, 2, 1.0);
        assert!(stat.is_static());

        let numeric = Predicate {
            id: 1,
            field: 1,
            operator: Operator::EqualTo,
            operand: Operand::Number(10.0),
            weight: 1.5,
            selectivity: 0.05,
        };
        assert!(!numeric.is_static());

        let contains = Predicate {
            id: 2,
            field: 1,
            operator: Operator::Contains,
            operand: Operand::Needle(Arc::from("ERR")),
            weight: 8.0,
            selectivity: 0.15,
        };
        assert!(!contains.is_static());
    }
}
