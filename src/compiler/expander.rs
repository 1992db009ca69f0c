//! IS_ANY_OF expansion, canonicalization, and cross-rule deduplication.
//!
//! A rule with conditions `[C1, C2 IS_ANY_OF {v1,v2,v3}, C3]` expands into
//! the Cartesian product of its IS_ANY_OF options: three conjunctions
//! `{C1, C2=v1, C3}`, `{C1, C2=v2, C3}`, `{C1, C2=v3, C3}`. Every
//! conjunction is canonicalized into an ascending-sorted, duplicate-free
//! predicate-ID list; identical lists collapse to one combination ID, and
//! all source rules mapping to it are retained.

use crate::predicate::{FieldId, Operand, Operator, PredicateId, PredicateKey};
use smallvec::SmallVec;
use std::collections::HashMap;

/// A predicate before profiling: dedup identity plus operand.
#[derive(Debug, Clone)]
pub(crate) struct PredicateProto {
    pub field: FieldId,
    pub operator: Operator,
    pub operand: Operand,
}

impl PredicateProto {
    fn key(&self) -> PredicateKey {
        PredicateKey {
            field: self.field,
            operator: self.operator,
            operand: self.operand.key(),
        }
    }
}

/// One encoded condition: a single predicate or an expandable option set.
#[derive(Debug)]
pub(crate) enum EncodedCondition {
    Single(PredicateProto),
    AnyOf(Vec<PredicateProto>),
}

/// One enabled rule after dictionary encoding.
#[derive(Debug)]
pub(crate) struct EncodedRule {
    pub conditions: Vec<EncodedCondition>,
}

/// Interns predicate protos by `(field, operator, operand)`; weight and
/// selectivity differences never produce new IDs.
#[derive(Debug, Default)]
pub(crate) struct PredicateRegistry {
    by_key: HashMap<PredicateKey, PredicateId>,
    pub protos: Vec<PredicateProto>,
}

impl PredicateRegistry {
    pub fn intern(&mut self, proto: PredicateProto) -> PredicateId {
        let key = proto.key();
        if let Some(&id) = self.by_key.get(&key) {
            return id;
        }
        let id = self.protos.len() as PredicateId;
        self.by_key.insert(key, id);
        self.protos.push(proto);
        id
    }

    pub fn len(&self) -> usize {
        self.protos.len()
    }
}

/// Output of the expansion stage.
#[derive(Debug)]
pub(crate) struct Expansion {
    pub registry: PredicateRegistry,
    /// Canonical sorted predicate-ID list per combination
    pub combinations: Vec<Vec<PredicateId>>,
    /// Rule indices per combination, in attribution order, deduplicated
    pub combination_rules: Vec<SmallVec<[u32; 1]>>,
    /// Combination IDs per rule
    pub rule_combinations: Vec<Vec<u32>>,
    /// Conjunctions produced before deduplication
    pub conjunctions: u64,
}

/// Expand every rule and deduplicate predicates and combinations.
pub(crate) fn expand_rules(rules: &[EncodedRule]) -> Expansion {
    let mut registry = PredicateRegistry::default();
    let mut combinations: Vec<Vec<PredicateId>> = Vec::new();
    let mut combination_index: HashMap<Vec<PredicateId>, u32> = HashMap::new();
    let mut combination_rules: Vec<SmallVec<[u32; 1]>> = Vec::new();
    let mut rule_combinations: Vec<Vec<u32>> = Vec::with_capacity(rules.len());
    let mut conjunctions = 0u64;

    for (rule_index, rule) in rules.iter().enumerate() {
        let rule_index = rule_index as u32;

        // Intern the fixed part once; collect option lists for the product.
        let mut base: Vec<PredicateId> = Vec::new();
        let mut option_lists: Vec<Vec<PredicateId>> = Vec::new();
        for condition in &rule.conditions {
            match condition {
                EncodedCondition::Single(proto) => base.push(registry.intern(proto.clone())),
                EncodedCondition::AnyOf(options) => {
                    let ids = options
                        .iter()
                        .map(|proto| registry.intern(proto.clone()))
                        .collect();
                    option_lists.push(ids);
                }
            }
        }

        let mut owned = Vec::new();
        let mut odometer = vec![0usize; option_lists.len()];
        loop {
            conjunctions += 1;

            let mut conjunction = base.clone();
            for (list, &position) in option_lists.iter().zip(&odometer) {
                conjunction.push(list[position]);
            }
            conjunction.sort_unstable();
            conjunction.dedup();

            let combination = match combination_index.get(&conjunction) {
                Some(&existing) => existing,
                None => {
                    let id = combinations.len() as u32;
                    combination_index.insert(conjunction.clone(), id);
                    combinations.push(conjunction);
                    combination_rules.push(SmallVec::new());
                    id
                }
            };
            let owners = &mut combination_rules[combination as usize];
            if !owners.contains(&rule_index) {
                owners.push(rule_index);
            }
            if !owned.contains(&combination) {
                owned.push(combination);
            }

            // Advance the odometer; done when it wraps.
            let mut digit = 0;
            loop {
                if digit == odometer.len() {
                    break;
                }
                odometer[digit] += 1;
                if odometer[digit] < option_lists[digit].len() {
                    break;
                }
                odometer[digit] = 0;
                digit += 1;
            }
            if digit == odometer.len() {
                break;
            }
        }

        rule_combinations.push(owned);
    }

    Expansion {
        registry,
        combinations,
        combination_rules,
        rule_combinations,
        conjunctions,
    }
}
