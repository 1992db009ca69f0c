//! Predicate weight and selectivity profiling.
//!
//! Weights estimate per-evaluation cost and order field dispatch:
//! regex > contains > between > numeric compare > equality. Selectivity
//! estimates the fraction of events a predicate accepts; lower means more
//! selective. Both are static estimates derived from the operator and
//! operand kind, since the corpus carries no observed frequencies at compile
//! time.

use crate::compiler::expander::PredicateProto;
use crate::predicate::{Operand, Operator, Predicate, PredicateId};

/// Cost/selectivity profile for one predicate proto.
pub(crate) fn profile(proto: &PredicateProto) -> (f32, f32) {
    match (proto.operator, &proto.operand) {
        (Operator::EqualTo, Operand::Value(_) | Operand::Bool(_)) => (1.0, 0.05),
        (Operator::NotEqualTo, Operand::Value(_) | Operand::Bool(_)) => (1.0, 0.9),
        (Operator::EqualTo, Operand::Number(_)) => (1.5, 0.05),
        (Operator::NotEqualTo, Operand::Number(_)) => (1.5, 0.9),
        (Operator::GreaterThan | Operator::LessThan, _) => (2.0, 0.4),
        (Operator::Between, Operand::Range(..)) => (2.5, 0.25),
        (Operator::Between, Operand::StrRange(..)) => (3.0, 0.25),
        (Operator::Contains, _) => (8.0, 0.15),
        (Operator::Regex, _) => (20.0, 0.1),
        // IS_ANY_OF never survives expansion; anything else is a routing bug.
        _ => (1.0, 0.5),
    }
}

/// Materialize profiled predicates from interned protos.
pub(crate) fn profile_predicates(protos: &[PredicateProto]) -> Vec<Predicate> {
    protos
        .iter()
        .enumerate()
        .map(|(id, proto)| {
            let (weight, selectivity) = profile(proto);
            Predicate {
                id: id as PredicateId,
                field: proto.field,
                operator: proto.operator,
                operand: proto.operand.clone(),
                weight,
                selectivity,
            }
        })
        .collect()
}

/// The flat predicate list sorted by ascending weight (ties by ID, so the
/// order is total and deterministic).
pub(crate) fn sort_by_weight(predicates: &[Predicate]) -> Vec<PredicateId> {
    let mut ids: Vec<PredicateId> = (0..predicates.len() as PredicateId).collect();
    ids.sort_unstable_by(|&a, &b| {
        let wa = predicates[a as usize].weight;
        let wb = predicates[b as usize].weight;
        wa.total_cmp(&wb).then_with(|| a.cmp(&b))
    });
    ids
}

/// Per-field minimum weight: the cheapest reason to look at a field.
/// Fields without predicates get `f32::MAX` so they sort last if they ever
/// reach the dispatcher.
pub(crate) fn field_min_weights(predicates: &[Predicate], field_count: usize) -> Vec<f32> {
    let mut min_weights = vec![f32::MAX; field_count];
    for predicate in predicates {
        let slot = &mut min_weights[predicate.field as usize];
        if predicate.weight < *slot {
            *slot = predicate.weight;
        }
    }
    min_weights
}
