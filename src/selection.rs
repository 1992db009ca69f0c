//! Match results and selection strategies.
//!
//! After counter-based detection produces the raw set of matched rules, a
//! selection strategy filters the final list. Matched rules are always
//! ordered by descending priority, ties broken by ascending `ruleCode`, so
//! output is deterministic for a fixed model and event regardless of
//! evaluation order.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How the final match list is filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectionStrategy {
    /// Return every matched rule.
    AllMatches,
    /// Keep only entries whose priority equals the maximum observed.
    MaxPriorityPerFamily,
    /// Return the single highest-priority entry; ties broken by
    /// lexicographically smallest `ruleCode`.
    FirstMatch,
}

impl Default for SelectionStrategy {
    fn default() -> Self {
        SelectionStrategy::AllMatches
    }
}

/// One matched rule in a result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedRule {
    pub rule_id: u32,
    pub rule_code: Arc<str>,
    pub priority: i32,
    pub description: Option<Arc<str>>,
}

/// Per-event evaluation output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub event_id: String,
    pub matched_rules: Vec<MatchedRule>,
    pub evaluation_time_nanos: u64,
    pub predicates_evaluated: u32,
    pub matched_count: usize,
}

impl MatchResult {
    pub fn empty(event_id: String, evaluation_time_nanos: u64, predicates_evaluated: u32) -> Self {
        MatchResult {
            event_id,
            matched_rules: Vec::new(),
            evaluation_time_nanos,
            predicates_evaluated,
            matched_count: 0,
        }
    }

    pub fn is_match(&self) -> bool {
        !self.matched_rules.is_empty()
    }
}

/// Canonical ordering: priority descending, then `ruleCode` ascending.
pub fn sort_matches(matches: &mut [MatchedRule]) {
    matches.sort_unstable_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.rule_code.cmp(&b.rule_code))
    });
}

impl SelectionStrategy {
    /// Filter an already-sorted match list in place.
    pub fn apply(&self, matches: &mut Vec<MatchedRule>) {
        match self {
            SelectionStrategy::AllMatches => {}
            SelectionStrategy::MaxPriorityPerFamily => {
                if let Some(max) = matches.first().map(|m| m.priority) {
                    matches.retain(|m| m.priority == max);
                }
            }
            SelectionStrategy::FirstMatch => {
                matches.truncate(1);
            }
        }
    }
}
