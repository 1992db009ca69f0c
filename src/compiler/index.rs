//! Inverted index construction.
//!
//! For every combination `c` and predicate `p` in `c`, the index records
//! `c` in `inverted[p]`. Roaring bitmaps keep the representation compact
//! for both sparse predicates (a handful of combinations) and dense ones
//! (an IS_ANY_OF-expanded equality shared by thousands), and make the
//! AND-intersections of the evaluation inner loop cheap.

use crate::model::StaticFieldPlan;
use crate::predicate::{Predicate, PredicateId};
use roaring::RoaringBitmap;
use std::collections::BTreeMap;

/// Build `predicateId -> bitmap(combinationId)`.
pub(crate) fn build_inverted_index(
    combinations: &[Vec<PredicateId>],
    predicate_total: usize,
) -> Vec<RoaringBitmap> {
    let mut inverted = vec![RoaringBitmap::new(); predicate_total];
    for (combination, predicates) in combinations.iter().enumerate() {
        for &predicate in predicates {
            inverted[predicate as usize].insert(combination as u32);
        }
    }
    inverted
}

/// Group static predicates by field (ascending field order) and union each
/// group's combination bitmaps, giving the absent-field subtraction mask.
pub(crate) fn build_static_fields(
    predicates: &[Predicate],
    inverted: &[RoaringBitmap],
) -> Vec<StaticFieldPlan> {
    let mut by_field: BTreeMap<u32, Vec<PredicateId>> = BTreeMap::new();
    for predicate in predicates {
        if predicate.is_static() {
            by_field.entry(predicate.field).or_default().push(predicate.id);
        }
    }

    by_field
        .into_iter()
        .map(|(field, predicate_ids)| {
            let mut mask = RoaringBitmap::new();
            for &predicate in &predicate_ids {
                mask |= &inverted[predicate as usize];
            }
            StaticFieldPlan {
                field,
                predicates: predicate_ids,
                mask,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::{Operand, Operator};

    #[test]
    fn test_index_completeness() {
        let combinations = vec![vec![0, 2], vec![1, 2], vec![2]];
        let inverted = build_inverted_index(&combinations, 3);

        // Every predicate of every combination is indexed.
        for (combination, predicates) in combinations.iter().enumerate() {
            for &predicate in predicates {
                assert!(inverted[predicate as usize].contains(combination as u32));
            }
        }
        assert_eq!(inverted[2].len(), 3);
        assert_eq!(inverted[0].len(), 1);
    }

    #[test]
    fn test_static_field_mask_unions_combinations() {
        let predicates = vec![
            Predicate {
                id: 0,
                field: 7,
                operator: Operator::EqualTo,
                operand: Operand::Value(1),
                weight: 1.0,
                selectivity: 0.05,
            },
            Predicate {
                id: 1,
                field: 7,
                operator: Operator::EqualTo,
                operand: Operand::Value(2),
                weight: 1.0,
                selectivity: 0.05,
            },
            Predicate {
                id: 2,
                field: 3,
                operator: Operator::GreaterThan,
                operand: Operand::Number(5.0),
                weight: 2.0,
                selectivity: 0.4,
            },
        ];
        let combinations = vec![vec![0, 2], vec![1, 2]];
        let inverted = build_inverted_index(&combinations, 3);
        let static_fields = build_static_fields(&predicates, &inverted);

        // Only field 7 carries static predicates.
        assert_eq!(static_fields.len(), 1);
        assert_eq!(static_fields[0].field, 7);
        assert_eq!(static_fields[0].predicates, vec![0, 1]);
        assert_eq!(static_fields[0].mask.len(), 2);
    }
}
