//! String families: `CONTAINS` with bigram candidate filtering, and
//! lexicographic `BETWEEN` over string bounds.
//!
//! A bigram inverted index over the (case-folded) needle patterns narrows
//! the predicates worth verifying: for each byte bigram of the event value,
//! the union of predicates whose needle contains that bigram forms the
//! candidate set, and each candidate is then confirmed with a real substring
//! check. Needles shorter than one bigram live in a "short patterns" bucket
//! that is always verified. Folding happened at compile/encode time, so the
//! substring check itself is a plain byte search.

use crate::predicate::{Operand, Operator, Predicate, PredicateId};
use roaring::RoaringBitmap;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

/// Prepared CONTAINS predicates for one field.
#[derive(Debug, Default)]
pub struct ContainsFamily {
    /// `(predicate, folded needle)`, indexed by the bigram postings
    needles: Vec<(PredicateId, Arc<str>)>,
    /// bigram -> indices into `needles`
    bigrams: HashMap<[u8; 2], SmallVec<[u32; 4]>>,
    /// Indices of needles with fewer than two bytes, always verified
    short: SmallVec<[u32; 2]>,
}

impl ContainsFamily {
    pub fn add(&mut self, predicate: &Predicate) {
        let needle = match (&predicate.operator, &predicate.operand) {
            (Operator::Contains, Operand::Needle(n)) => Arc::clone(n),
            _ => {
                debug_assert!(false, "non-CONTAINS predicate routed to contains family");
                return;
            }
        };
        let index = self.needles.len() as u32;
        let bytes = needle.as_bytes();
        if bytes.len() < 2 {
            self.short.push(index);
        } else {
            let mut seen: SmallVec<[[u8; 2]; 8]> = SmallVec::new();
            for window in bytes.windows(2) {
                let bigram = [window[0], window[1]];
                if !seen.contains(&bigram) {
                    seen.push(bigram);
                    self.bigrams.entry(bigram).or_default().push(index);
                }
            }
        }
        self.needles.push((predicate.id, needle));
    }

    pub fn is_empty(&self) -> bool {
        self.needles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.needles.len()
    }

    /// Evaluate against a folded event string, emitting true, eligible
    /// predicate IDs. `evaluated` counts candidates actually verified.
    pub fn evaluate(
        &self,
        folded: &str,
        eligible: &RoaringBitmap,
        evaluated: &mut u32,
        out: &mut impl FnMut(PredicateId),
    ) {
        if self.needles.is_empty() {
            return;
        }

        let mut candidates: SmallVec<[u32; 16]> = SmallVec::new();
        for window in folded.as_bytes().windows(2) {
            if let Some(postings) = self.bigrams.get(&[window[0], window[1]]) {
                candidates.extend_from_slice(postings);
            }
        }
        candidates.extend_from_slice(&self.short);
        candidates.sort_unstable();
        candidates.dedup();

        for index in candidates {
            let (id, needle) = &self.needles[index as usize];
            if !eligible.contains(*id) {
                continue;
            }
            *evaluated += 1;
            if folded.contains(needle.as_ref()) {
                out(*id);
            }
        }
    }
}

/// Lexicographic BETWEEN over folded string bounds, inclusive on both ends.
#[derive(Debug, Default)]
pub struct StrRangeFamily {
    ranges: Vec<(PredicateId, Arc<str>, Arc<str>)>,
}

impl StrRangeFamily {
    pub fn add(&mut self, predicate: &Predicate) {
        match (&predicate.operator, &predicate.operand) {
            (Operator::Between, Operand::StrRange(lo, hi)) => {
                self.ranges
                    .push((predicate.id, Arc::clone(lo), Arc::clone(hi)));
            }
            _ => debug_assert!(false, "non-string-range predicate routed to range family"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn evaluate(
        &self,
        folded: &str,
        eligible: &RoaringBitmap,
        evaluated: &mut u32,
        out: &mut impl FnMut(PredicateId),
    ) {
        for (id, lo, hi) in &self.ranges {
            if !eligible.contains(*id) {
                continue;
            }
            *evaluated += 1;
            if lo.as_ref() <= folded && folded <= hi.as_ref() {
                out(*id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contains(id: PredicateId, needle: &str) -> Predicate {
        Predicate {
            id,
            field: 0,
            operator: Operator::Contains,
            operand: Operand::Needle(Arc::from(needle)),
            weight: 8.0,
            selectivity: 0.15,
        }
    }

    fn all_eligible(count: u32) -> RoaringBitmap {
        (0..count).collect()
    }

    fn truths(family: &ContainsFamily, folded: &str, eligible: &RoaringBitmap) -> Vec<PredicateId> {
        let mut out = Vec::new();
        let mut evaluated = 0;
        family.evaluate(folded, eligible, &mut evaluated, &mut |id| out.push(id));
        out.sort_unstable();
        out
    }

    #[test]
    fn test_substring_match() {
        let mut fam = ContainsFamily::default();
        fam.add(&contains(0, "TIMEOUT"));
        fam.add(&contains(1, "REFUSED"));
        let eligible = all_eligible(2);
        assert_eq!(truths(&fam, "CONNECTION TIMEOUT AFTER 30S", &eligible), vec![0]);
        assert_eq!(truths(&fam, "NO ERRORS", &eligible), Vec::<u32>::new());
    }

    #[test]
    fn test_bigram_filter_still_verifies() {
        // "ABBA" shares bigrams with "ABBB" but is not a substring of it.
        let mut fam = ContainsFamily::default();
        fam.add(&contains(0, "ABBA"));
        let eligible = all_eligible(1);
        assert_eq!(truths(&fam, "ABBB", &eligible), Vec::<u32>::new());
        assert_eq!(truths(&fam, "XABBAX", &eligible), vec![0]);
    }

    #[test]
    fn test_single_char_needle_in_short_bucket() {
        let mut fam = ContainsFamily::default();
        fam.add(&contains(0, "#"));
        let eligible = all_eligible(1);
        assert_eq!(truths(&fam, "ORDER #42", &eligible), vec![0]);
        assert_eq!(truths(&fam, "ORDER 42", &eligible), Vec::<u32>::new());
    }

    #[test]
    fn test_ineligible_candidates_skipped() {
        let mut fam = ContainsFamily::default();
        fam.add(&contains(0, "GOLD"));
        let eligible = RoaringBitmap::new();
        let mut evaluated = 0;
        fam.evaluate("GOLD TIER", &eligible, &mut evaluated, &mut |_| {
            panic!("nothing eligible")
        });
        assert_eq!(evaluated, 0);
    }

    #[test]
    fn test_duplicate_candidates_verified_once() {
        // Needle with repeating bigrams must not inflate the evaluated count.
        let mut fam = ContainsFamily::default();
        fam.add(&contains(0, "AAAA"));
        let eligible = all_eligible(1);
        let mut evaluated = 0;
        let mut hits = Vec::new();
        fam.evaluate("AAAAAA", &eligible, &mut evaluated, &mut |id| hits.push(id));
        assert_eq!(evaluated, 1);
        assert_eq!(hits, vec![0]);
    }

    #[test]
    fn test_str_range_inclusive() {
        let mut fam = StrRangeFamily::default();
        fam.add(&Predicate {
            id: 0,
            field: 0,
            operator: Operator::Between,
            operand: Operand::StrRange(Arc::from("ALPHA"), Arc::from("DELTA")),
            weight: 2.5,
            selectivity: 0.25,
        });
        let eligible = all_eligible(1);
        let check = |s: &str| {
            let mut out = Vec::new();
            let mut n = 0;
            fam.evaluate(s, &eligible, &mut n, &mut |id| out.push(id));
            !out.is_empty()
        };
        assert!(check("ALPHA"));
        assert!(check("BRAVO"));
        assert!(check("DELTA"));
        assert!(!check("ECHO"));
    }
}
