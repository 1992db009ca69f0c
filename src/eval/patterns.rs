//! Regex family.
//!
//! Patterns are compiled once, at rule-compile time, with full-match
//! anchoring (`^(?:pattern)$`). Evaluation is a direct match test against
//! the ORIGINAL, unfolded attribute string: regex predicates are the one
//! family that must see the event's exact casing.

use crate::predicate::{Operand, Operator, Predicate, PredicateId};
use regex::Regex;
use roaring::RoaringBitmap;
use std::sync::Arc;

/// Prepared REGEX predicates for one field.
#[derive(Debug, Default)]
pub struct RegexFamily {
    patterns: Vec<(PredicateId, Arc<Regex>)>,
}

impl RegexFamily {
    pub fn add(&mut self, predicate: &Predicate) {
        match (&predicate.operator, &predicate.operand) {
            (Operator::Regex, Operand::Pattern { regex, .. }) => {
                self.patterns.push((predicate.id, Arc::clone(regex)));
            }
            _ => debug_assert!(false, "non-REGEX predicate routed to regex family"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Evaluate against the original (unfolded) event string.
    pub fn evaluate(
        &self,
        original: &str,
        eligible: &RoaringBitmap,
        evaluated: &mut u32,
        out: &mut impl FnMut(PredicateId),
    ) {
        for (id, regex) in &self.patterns {
            if !eligible.contains(*id) {
                continue;
            }
            *evaluated += 1;
            if regex.is_match(original) {
                out(*id);
            }
        }
    }
}

/// Compile a rule-definition pattern with full-match semantics. The
/// non-capturing group keeps alternations anchored at both ends.
pub fn compile_full_match(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{})$", pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(patterns: &[&str]) -> RegexFamily {
        let mut fam = RegexFamily::default();
        for (i, pattern) in patterns.iter().enumerate() {
            fam.add(&Predicate {
                id: i as PredicateId,
                field: 0,
                operator: Operator::Regex,
                operand: Operand::Pattern {
                    source: Arc::from(*pattern),
                    regex: Arc::new(compile_full_match(pattern).unwrap()),
                },
                weight: 20.0,
                selectivity: 0.1,
            });
        }
        fam
    }

    fn truths(fam: &RegexFamily, original: &str) -> Vec<PredicateId> {
        let eligible: RoaringBitmap = (0..fam.len() as u32).collect();
        let mut out = Vec::new();
        let mut evaluated = 0;
        fam.evaluate(original, &eligible, &mut evaluated, &mut |id| out.push(id));
        out
    }

    #[test]
    fn test_full_match_semantics() {
        let fam = family(&[r"\+1-\d{3}"]);
        assert_eq!(truths(&fam, "+1-555"), vec![0]);
        // Substring matches are not full matches.
        assert!(truths(&fam, "call +1-555 now").is_empty());
    }

    #[test]
    fn test_alternation_stays_anchored() {
        let fam = family(&["cat|dog"]);
        assert_eq!(truths(&fam, "dog"), vec![0]);
        assert!(truths(&fam, "dogma").is_empty());
    }

    #[test]
    fn test_original_case_preserved() {
        let fam = family(&["[a-z]+"]);
        assert_eq!(truths(&fam, "lowercase"), vec![0]);
        // The folded form would be upper-case; regex must see the original.
        assert!(truths(&fam, "UPPER").is_empty());
    }

    #[test]
    fn test_invalid_pattern_rejected_at_compile() {
        assert!(compile_full_match("(unclosed").is_err());
    }
}
