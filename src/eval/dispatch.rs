//! Per-field predicate dispatch.
//!
//! Fields present on the encoded event are visited in ascending order of
//! per-field minimum weight, so the cheapest predicate families run first.
//! For each field, every applicable family evaluator receives the
//! eligibility set and emits the IDs of true predicates; candidates outside
//! the eligibility set are skipped without being evaluated.
//!
//! The equality family is absent here: it was already folded into the
//! base-condition stage.

use crate::event::{EncodedEvent, EncodedValue, FieldValues};
use crate::model::{EngineModel, FieldPlan};
use crate::predicate::{FieldId, PredicateId};
use roaring::RoaringBitmap;
use smallvec::SmallVec;

/// Dispatch all dynamic families for one event.
pub(crate) fn dispatch_event(
    model: &EngineModel,
    encoded: &EncodedEvent,
    eligible: &RoaringBitmap,
    evaluated: &mut u32,
    on_true: &mut impl FnMut(PredicateId),
    mut visited_fields: Option<&mut Vec<FieldId>>,
) {
    // Order present fields by the cheapest predicate that touches them.
    let mut order: SmallVec<[(f32, FieldId, &FieldPlan, &FieldValues); 16]> = SmallVec::new();
    for (field, values) in encoded.iter() {
        if let Some(plan) = model.field_plan(field) {
            if plan.has_dynamic() {
                order.push((plan.min_weight, field, plan, values));
            }
        }
    }
    order.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    for (_, field, plan, values) in order {
        if let Some(fields) = visited_fields.as_mut() {
            fields.push(field);
        }
        evaluate_field(plan, values, eligible, evaluated, on_true);
    }
}

/// Run the dynamic families for one field, cheapest first.
fn evaluate_field(
    plan: &FieldPlan,
    values: &FieldValues,
    eligible: &RoaringBitmap,
    evaluated: &mut u32,
    on_true: &mut impl FnMut(PredicateId),
) {
    for value in values.iter() {
        match value {
            EncodedValue::Number(n) => {
                plan.numeric.evaluate(*n, eligible, evaluated, on_true);
            }
            EncodedValue::Text {
                folded, original, ..
            } => {
                plan.str_ranges.evaluate(folded, eligible, evaluated, on_true);
                plan.contains.evaluate(folded, eligible, evaluated, on_true);
                plan.regexes.evaluate(original, eligible, evaluated, on_true);
            }
            // Boolean equality is static; nothing dynamic applies.
            EncodedValue::Bool(_) => {}
        }
    }
}
