//! Vectorized numeric family: `GREATER_THAN`, `LESS_THAN`, `BETWEEN`, and
//! numeric `EQUAL_TO` / `NOT_EQUAL_TO`.
//!
//! Predicates are grouped per field and per operator into parallel f64
//! arrays. Evaluation broadcasts the event value into a SIMD register and
//! compares four lanes at a time; the comparison mask is intersected
//! lane-wise with an eligibility mask before any predicate ID is emitted.
//! Array tails shorter than a SIMD register fall back to scalar compares.

use crate::predicate::{Operand, Operator, Predicate, PredicateId};
use roaring::RoaringBitmap;
use wide::{f64x4, CmpEq, CmpGe, CmpGt, CmpLe, CmpLt, CmpNe};

const LANES: usize = 4;

/// One threshold comparison bank: parallel `(threshold, predicate)` arrays.
#[derive(Debug, Default)]
struct CompareBank {
    thresholds: Vec<f64>,
    ids: Vec<PredicateId>,
}

impl CompareBank {
    fn push(&mut self, threshold: f64, id: PredicateId) {
        self.thresholds.push(threshold);
        self.ids.push(id);
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

/// One range bank: parallel `(lo, hi, predicate)` arrays for BETWEEN.
#[derive(Debug, Default)]
struct RangeBank {
    lo: Vec<f64>,
    hi: Vec<f64>,
    ids: Vec<PredicateId>,
}

/// Prepared numeric predicates for one field.
#[derive(Debug, Default)]
pub struct NumericFamily {
    gt: CompareBank,
    lt: CompareBank,
    eq: CompareBank,
    ne: CompareBank,
    between: RangeBank,
}

impl NumericFamily {
    pub fn add(&mut self, predicate: &Predicate) {
        match (predicate.operator, &predicate.operand) {
            (Operator::GreaterThan, Operand::Number(n)) => self.gt.push(*n, predicate.id),
            (Operator::LessThan, Operand::Number(n)) => self.lt.push(*n, predicate.id),
            (Operator::EqualTo, Operand::Number(n)) => self.eq.push(*n, predicate.id),
            (Operator::NotEqualTo, Operand::Number(n)) => self.ne.push(*n, predicate.id),
            (Operator::Between, Operand::Range(lo, hi)) => {
                self.between.lo.push(*lo);
                self.between.hi.push(*hi);
                self.between.ids.push(predicate.id);
            }
            _ => debug_assert!(false, "non-numeric predicate routed to numeric family"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.gt.len() + self.lt.len() + self.eq.len() + self.ne.len() + self.between.ids.len()
    }

    /// Evaluate every bank against one event value, emitting the IDs of
    /// true, eligible predicates. `evaluated` counts eligible predicates
    /// actually compared.
    pub fn evaluate(
        &self,
        value: f64,
        eligible: &RoaringBitmap,
        evaluated: &mut u32,
        out: &mut impl FnMut(PredicateId),
    ) {
        eval_compare(&self.gt, value, CompareOp::Gt, eligible, evaluated, out);
        eval_compare(&self.lt, value, CompareOp::Lt, eligible, evaluated, out);
        eval_compare(&self.eq, value, CompareOp::Eq, eligible, evaluated, out);
        eval_compare(&self.ne, value, CompareOp::Ne, eligible, evaluated, out);
        eval_between(&self.between, value, eligible, evaluated, out);
    }
}

#[derive(Clone, Copy)]
enum CompareOp {
    Gt,
    Lt,
    Eq,
    Ne,
}

impl CompareOp {
    #[inline]
    fn simd(self, v: f64x4, t: f64x4) -> f64x4 {
        match self {
            CompareOp::Gt => v.cmp_gt(t),
            CompareOp::Lt => v.cmp_lt(t),
            CompareOp::Eq => v.cmp_eq(t),
            CompareOp::Ne => v.cmp_ne(t),
        }
    }

    #[inline]
    fn scalar(self, v: f64, t: f64) -> bool {
        match self {
            CompareOp::Gt => v > t,
            CompareOp::Lt => v < t,
            CompareOp::Eq => v == t,
            CompareOp::Ne => v != t,
        }
    }
}

/// Build the 4-bit eligibility mask for one SIMD chunk.
#[inline]
fn eligibility_mask(ids: &[PredicateId], eligible: &RoaringBitmap) -> i32 {
    let mut mask = 0;
    for (lane, &id) in ids.iter().enumerate() {
        if eligible.contains(id) {
            mask |= 1 << lane;
        }
    }
    mask
}

/// Collapse a SIMD comparison result (all-ones or all-zeros lanes) into a
/// 4-bit mask.
#[inline]
fn lane_mask(mask: f64x4) -> i32 {
    let lanes = mask.to_array();
    let mut bits = 0;
    for (lane, value) in lanes.iter().enumerate() {
        if value.to_bits() != 0 {
            bits |= 1 << lane;
        }
    }
    bits
}

fn eval_compare(
    bank: &CompareBank,
    value: f64,
    op: CompareOp,
    eligible: &RoaringBitmap,
    evaluated: &mut u32,
    out: &mut impl FnMut(PredicateId),
) {
    if bank.ids.is_empty() {
        return;
    }
    let v = f64x4::splat(value);
    let mut chunks = bank.thresholds.chunks_exact(LANES);
    let mut id_chunks = bank.ids.chunks_exact(LANES);

    for (thresholds, ids) in (&mut chunks).zip(&mut id_chunks) {
        let elig = eligibility_mask(ids, eligible);
        if elig == 0 {
            continue;
        }
        *evaluated += elig.count_ones();
        let t = f64x4::from([thresholds[0], thresholds[1], thresholds[2], thresholds[3]]);
        let hit = lane_mask(op.simd(v, t)) & elig;
        emit_lanes(hit, ids, out);
    }

    for (threshold, &id) in chunks.remainder().iter().zip(id_chunks.remainder()) {
        if !eligible.contains(id) {
            continue;
        }
        *evaluated += 1;
        if op.scalar(value, *threshold) {
            out(id);
        }
    }
}

fn eval_between(
    bank: &RangeBank,
    value: f64,
    eligible: &RoaringBitmap,
    evaluated: &mut u32,
    out: &mut impl FnMut(PredicateId),
) {
    if bank.ids.is_empty() {
        return;
    }
    let v = f64x4::splat(value);
    let mut lo_chunks = bank.lo.chunks_exact(LANES);
    let mut hi_chunks = bank.hi.chunks_exact(LANES);
    let mut id_chunks = bank.ids.chunks_exact(LANES);

    for ((lo, hi), ids) in (&mut lo_chunks).zip(&mut hi_chunks).zip(&mut id_chunks) {
        let elig = eligibility_mask(ids, eligible);
        if elig == 0 {
            continue;
        }
        *evaluated += elig.count_ones();
        let lo_v = f64x4::from([lo[0], lo[1], lo[2], lo[3]]);
        let hi_v = f64x4::from([hi[0], hi[1], hi[2], hi[3]]);
        // Inclusive on both bounds.
        let hit = lane_mask(v.cmp_ge(lo_v) & v.cmp_le(hi_v)) & elig;
        emit_lanes(hit, ids, out);
    }

    let tail = lo_chunks
        .remainder()
        .iter()
        .zip(hi_chunks.remainder())
        .zip(id_chunks.remainder());
    for ((lo, hi), &id) in tail {
        if !eligible.contains(id) {
            continue;
        }
        *evaluated += 1;
        if *lo <= value && value <= *hi {
            out(id);
        }
    }
}

#[inline]
fn emit_lanes(mut mask: i32, ids: &[PredicateId], out: &mut impl FnMut(PredicateId)) {
    while mask != 0 {
        let lane = mask.trailing_zeros() as usize;
        out(ids[lane]);
        mask &= mask - 1;
    }
}
