//! Equality family: `EQUAL_TO` / `NOT_EQUAL_TO` over dictionary-encoded
//! operands.
//!
//! Per field, equality predicates sit in a `valueId -> {predicateIds}` map
//! for O(1) lookup; NOT_EQUAL_TO predicates are scanned as a (small) list.
//! These are the static predicates whose results the base-condition cache
//! memoizes, so this family is evaluated during the base stage rather than
//! by the per-field dispatcher.
//!
//! NOT_EQUAL_TO requires the field to be present with a comparable value
//! that differs from the operand; an absent field or a type mismatch is
//! false, never an error.

use crate::event::EncodedValue;
use crate::predicate::{Operand, Operator, Predicate, PredicateId, ValueId};
use smallvec::SmallVec;
use std::collections::HashMap;

/// Operand of one static equality predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqOperand {
    Value(ValueId),
    Bool(bool),
}

/// Prepared equality predicates for one field.
#[derive(Debug, Default)]
pub struct EqualityFamily {
    /// EQUAL_TO over interned strings: valueId -> predicate IDs
    by_value: HashMap<ValueId, SmallVec<[PredicateId; 2]>>,
    /// EQUAL_TO over booleans
    bool_eq: SmallVec<[(bool, PredicateId); 2]>,
    /// NOT_EQUAL_TO, scanned per event
    not_equal: SmallVec<[(EqOperand, PredicateId); 4]>,
}

impl EqualityFamily {
    pub fn add(&mut self, predicate: &Predicate) {
        match (predicate.operator, &predicate.operand) {
            (Operator::EqualTo, Operand::Value(v)) => {
                self.by_value.entry(*v).or_default().push(predicate.id);
            }
            (Operator::EqualTo, Operand::Bool(b)) => {
                self.bool_eq.push((*b, predicate.id));
            }
            (Operator::NotEqualTo, Operand::Value(v)) => {
                self.not_equal.push((EqOperand::Value(*v), predicate.id));
            }
            (Operator::NotEqualTo, Operand::Bool(b)) => {
                self.not_equal.push((EqOperand::Bool(*b), predicate.id));
            }
            _ => debug_assert!(false, "non-static predicate routed to equality family"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_value.is_empty() && self.bool_eq.is_empty() && self.not_equal.is_empty()
    }

    /// Number of predicates this family holds.
    pub fn len(&self) -> usize {
        self.by_value.values().map(|v| v.len()).sum::<usize>()
            + self.bool_eq.len()
            + self.not_equal.len()
    }

    /// Collect the IDs of predicates true for the field's values. A
    /// predicate over a multi-valued field is true if any element
    /// satisfies it.
    pub fn evaluate(&self, values: &[EncodedValue]) -> SmallVec<[PredicateId; 4]> {
        let mut true_ids: SmallVec<[PredicateId; 4]> = SmallVec::new();

        for value in values {
            match value {
                EncodedValue::Text {
                    value_id: Some(id), ..
                } => {
                    if let Some(preds) = self.by_value.get(id) {
                        true_ids.extend_from_slice(preds);
                    }
                }
                EncodedValue::Bool(b) => {
                    for (operand, pred) in &self.bool_eq {
                        if operand == b {
                            true_ids.push(*pred);
                        }
                    }
                }
                // Unknown strings equal no interned operand; numbers are
                // handled by the numeric family.
                _ => {}
            }
        }

        for (operand, pred) in &self.not_equal {
            if self.not_equal_matches(*operand, values) {
                true_ids.push(*pred);
            }
        }

        true_ids.sort_unstable();
        true_ids.dedup();
        true_ids
    }

    fn not_equal_matches(&self, operand: EqOperand, values: &[EncodedValue]) -> bool {
        values.iter().any(|value| match (operand, value) {
            (EqOperand::Value(expected), EncodedValue::Text { value_id, .. }) => {
                *value_id != Some(expected)
            }
            (EqOperand::Bool(expected), EncodedValue::Bool(actual)) => *actual != expected,
            // Type mismatch is false, not "different".
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn family() -> EqualityFamily {
        let mut fam = EqualityFamily::default();
        fam.add(&pred(0, Operator::EqualTo, Operand::Value(10)));
        fam.add(&pred(1, Operator::EqualTo, Operand::Value(11)));
        fam.add(&pred(2, Operator::NotEqualTo, Operand::Value(10)));
        fam.add(&pred(3, Operator::EqualTo, Operand::Bool(true)));
        fam
    }

    fn pred(id: PredicateId, operator: Operator, operand: Operand) -> Predicate {
        Predicate {
            id,
            field: 0,
            operator,
            operand,
            weight: 1.0,
            selectivity: 0.05,
        }
    }

    fn text(value_id: Option<ValueId>) -> EncodedValue {
        EncodedValue::Text {
            value_id,
            folded: Arc::from("X"),
            original: Arc::from("x"),
        }
    }

    #[test]
    fn test_equal_to_hits_by_value_id() {
        let fam = family();
        let truths = fam.evaluate(&[text(Some(10))]);
        assert_eq!(truths.as_slice(), &[0]);
    }

    #[test]
    fn test_not_equal_requires_presence() {
        let fam = family();
        // Absent field: caller never invokes evaluate; but an empty value
        // list behaves the same way.
        assert!(fam.evaluate(&[]).is_empty());
    }

    #[test]
    fn test_not_equal_on_differing_value() {
        let fam = family();
        let truths = fam.evaluate(&[text(Some(11))]);
        // EQUAL_TO(11) and NOT_EQUAL_TO(10) both fire.
        assert_eq!(truths.as_slice(), &[1, 2]);
    }

    #[test]
    fn test_unknown_string_matches_not_equal_only() {
        let fam = family();
        let truths = fam.evaluate(&[text(None)]);
        assert_eq!(truths.as_slice(), &[2]);
    }

    #[test]
    fn test_type_mismatch_is_false() {
        let fam = family();
        // A numeric value cannot equal or not-equal a string operand.
        let truths = fam.evaluate(&[EncodedValue::Number(10.0)]);
        assert!(truths.is_empty());
    }

    #[test]
    fn test_bool_equality() {
        let fam = family();
        let truths = fam.evaluate(&[EncodedValue::Bool(true)]);
        // Bool(true) equals operand; NOT_EQUAL_TO(Value(10)) mismatches on type.
        assert_eq!(truths.as_slice(), &[3]);
    }

    #[test]
    fn test_multi_value_any_semantics() {
        let fam = family();
        let truths = fam.evaluate(&[text(Some(10)), text(Some(11))]);
        assert_eq!(truths.as_slice(), &[0, 1, 2]);
    }
}
