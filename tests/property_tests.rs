//! Property-Based Tests
//!
//! Tests for:
//! - Field-name normalization as a fixed point
//! - Encoding idempotence under re-flattening
//! - Evaluation determinism over randomized events
//! - Cache soundness: cached and uncached engines always agree

use helios::config::CacheBackendKind;
use helios::dictionary::normalize_field_name;
use helios::{Compiler, Config, Engine, Event, RuleSet};
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn corpus_engine(config: Config) -> Engine {
    let rules = RuleSet::from_json_str(
        r#"[
            {"ruleCode": "STATUS", "priority": 1, "conditions": [
                {"field": "status", "operator": "EQUAL_TO", "value": "active"}
            ]},
            {"ruleCode": "BAND", "priority": 2, "conditions": [
                {"field": "amount", "operator": "BETWEEN", "value": [25, 75]}
            ]},
            {"ruleCode": "COMBO", "priority": 3, "conditions": [
                {"field": "status", "operator": "IS_ANY_OF", "value": ["active", "trial"]},
                {"field": "amount", "operator": "GREATER_THAN", "value": 50}
            ]},
            {"ruleCode": "TEXT", "priority": 4, "conditions": [
                {"field": "note", "operator": "CONTAINS", "value": "urgent"}
            ]}
        ]"#,
    )
    .unwrap();
    let model = Compiler::new(config.clone()).compile(&rules).unwrap();
    Engine::new(model, &config).unwrap()
}

fn arbitrary_status() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("active".to_string()),
        Just("ACTIVE".to_string()),
        Just("trial".to_string()),
        Just("closed".to_string()),
        "[a-z]{1,8}",
    ]
}

fn arbitrary_note() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("all quiet".to_string()),
        Just("URGENT: check this".to_string()),
        "[a-zA-Z ]{0,20}",
    ]
}

fn matched_codes(engine: &Engine, event: &Event) -> Vec<String> {
    engine
        .evaluate(event)
        .expect("evaluate")
        .matched_rules
        .iter()
        .map(|m| m.rule_code.to_string())
        .collect()
}

// ============================================================================
// Normalization & Encoding
// ============================================================================

proptest! {
    #[test]
    fn prop_normalization_is_a_fixed_point(name in "[a-zA-Z0-9._-]{0,32}") {
        let once = normalize_field_name(&name);
        let twice = normalize_field_name(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_normalized_names_never_contain_hyphens(name in "\\PC{0,24}") {
        let normalized = normalize_field_name(&name);
        prop_assert!(!normalized.contains('-'));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_encoding_fixed_point_under_reflattening(
        status in arbitrary_status(),
        amount in 0i64..120,
    ) {
        let engine = corpus_engine(Config::default());
        let model = engine.model();

        // Original event with un-normalized spellings.
        let event = Event::new("e")
            .with_attribute("Status", status.clone())
            .with_attribute("amount", amount);
        let encoded = model.encode_event(&event);

        // Re-build the event from its flattened, normalized form; encoding
        // again must land on the same field/value IDs.
        let mut reflattened = Event::new("e");
        reflattened = reflattened.with_attribute("STATUS", status);
        reflattened = reflattened.with_attribute("AMOUNT", amount);
        let re_encoded = model.encode_event(&reflattened);

        prop_assert_eq!(encoded.len(), re_encoded.len());
        for ((field_a, _), (field_b, _)) in encoded.iter().zip(re_encoded.iter()) {
            prop_assert_eq!(field_a, field_b);
        }
    }
}

// ============================================================================
// Determinism & Cache Soundness
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_evaluation_is_deterministic(
        status in arbitrary_status(),
        amount in 0i64..120,
        note in arbitrary_note(),
    ) {
        let engine = corpus_engine(Config::default());
        let event = Event::new("e")
            .with_attribute("status", status)
            .with_attribute("amount", amount)
            .with_attribute("note", note);

        let first = matched_codes(&engine, &event);
        for _ in 0..3 {
            prop_assert_eq!(matched_codes(&engine, &event), first.clone());
        }
    }

    #[test]
    fn prop_caches_never_change_semantics(
        statuses in proptest::collection::vec(arbitrary_status(), 1..12),
        amounts in proptest::collection::vec(0i64..120, 1..12),
    ) {
        let cached = corpus_engine(Config::default());
        let mut uncached_config = Config::default();
        uncached_config.cache.base_condition.kind = CacheBackendKind::None;
        uncached_config.cache.predicate_sets.kind = CacheBackendKind::None;
        let uncached = corpus_engine(uncached_config);

        for (i, (status, amount)) in statuses.iter().zip(&amounts).enumerate() {
            let event = Event::new(format!("e{}", i))
                .with_attribute("status", status.clone())
                .with_attribute("amount", *amount);
            // Evaluate twice on the caching engine so the second pass runs
            // against warm caches.
            let cold = matched_codes(&uncached, &event);
            prop_assert_eq!(matched_codes(&cached, &event), cold.clone());
            prop_assert_eq!(matched_codes(&cached, &event), cold);
        }
    }
}
