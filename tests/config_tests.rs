//! Configuration Tests
//!
//! Tests for:
//! - TOML file loading and section defaults
//! - Cache option recognition (type, sizes, TTL, adaptive, distributed)
//! - Engine construction from configuration
//! - Rejection of inconsistent configurations

use helios::config::{CacheBackendKind, EvictionPolicy};
use helios::{Compiler, Config, Engine, Event, RuleSet, SelectionStrategy};
use std::io::Write;
use tempfile::NamedTempFile;

// ============================================================================
// Test Helpers
// ============================================================================

fn config_from(toml: &str) -> Config {
    let mut file = NamedTempFile::new().expect("tempfile");
    file.write_all(toml.as_bytes()).expect("write");
    Config::from_file(file.path().to_str().unwrap()).expect("config parse")
}

// ============================================================================
// File Loading
// ============================================================================

#[test]
fn test_empty_file_yields_defaults() {
    let config = config_from("");
    assert_eq!(config.engine.selection_strategy, SelectionStrategy::AllMatches);
    assert_eq!(config.cache.base_condition.kind, CacheBackendKind::InMemory);
    assert_eq!(config.cache.base_condition.max_size, 100_000);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_cache_options_recognized() {
    let config = config_from(
        r#"
        [cache.base_condition]
        type = "adaptive"
        max_size = 5000
        ttl_seconds = 60
        record_stats = false
        eviction = "lru"

        [cache.base_condition.adaptive]
        min_size = 100
        max_size = 9000
        low_hit_rate_threshold = 0.4
        high_hit_rate_threshold = 0.9
        tuning_interval_seconds = 5
        "#,
    );
    let settings = &config.cache.base_condition;
    assert_eq!(settings.kind, CacheBackendKind::Adaptive);
    assert_eq!(settings.max_size, 5000);
    assert_eq!(settings.ttl_seconds, 60);
    assert!(!settings.record_stats);
    assert_eq!(settings.eviction, EvictionPolicy::Lru);
    assert_eq!(settings.adaptive.min_size, 100);
    assert_eq!(settings.adaptive.max_size, 9000);
    assert_eq!(settings.adaptive.tuning_interval_seconds, 5);
}

#[test]
fn test_distributed_options_recognized() {
    let config = config_from(
        r#"
        [cache.base_condition]
        type = "distributed"

        [cache.base_condition.distributed]
        address = "10.0.0.5:6379,10.0.0.6:6379"
        pool_size = 8
        timeout_ms = 15
        compression_threshold = 2048
        cluster = true
        "#,
    );
    let distributed = &config.cache.base_condition.distributed;
    assert_eq!(distributed.address, "10.0.0.5:6379,10.0.0.6:6379");
    assert_eq!(distributed.pool_size, 8);
    assert_eq!(distributed.timeout_ms, 15);
    assert_eq!(distributed.compression_threshold, 2048);
    assert!(distributed.cluster);
}

#[test]
fn test_engine_section() {
    let config = config_from(
        r#"
        [engine]
        selection_strategy = "FIRST_MATCH"
        num_threads = 2
        "#,
    );
    assert_eq!(config.engine.selection_strategy, SelectionStrategy::FirstMatch);
    assert_eq!(config.engine.num_threads, 2);
}

// ============================================================================
// Construction From Configuration
// ============================================================================

#[test]
fn test_engine_honors_configured_strategy() {
    let config = config_from(
        r#"
        [engine]
        selection_strategy = "MAX_PRIORITY_PER_FAMILY"
        "#,
    );
    let rules = RuleSet::from_json_str(
        r#"[
            {"ruleCode": "LOW", "priority": 1, "conditions": [
                {"field": "k", "operator": "EQUAL_TO", "value": "v"}
            ]},
            {"ruleCode": "HIGH", "priority": 9, "conditions": [
                {"field": "k", "operator": "EQUAL_TO", "value": "v"}
            ]}
        ]"#,
    )
    .unwrap();
    let model = Compiler::new(config.clone()).compile(&rules).unwrap();
    let engine = Engine::new(model, &config).unwrap();

    let result = engine
        .evaluate(&Event::new("e").with_attribute("k", "v"))
        .unwrap();
    assert_eq!(result.matched_count, 1);
    assert_eq!(&*result.matched_rules[0].rule_code, "HIGH");
}

#[test]
fn test_distributed_predicate_set_tier_rejected() {
    let config = config_from(
        r#"
        [cache.predicate_sets]
        type = "distributed"
        "#,
    );
    let rules = RuleSet::from_json_str(
        r#"[{"ruleCode": "R", "conditions": [
            {"field": "k", "operator": "EQUAL_TO", "value": "v"}
        ]}]"#,
    )
    .unwrap();
    // The predicate-set tier holds in-process data; a distributed backend
    // is a configuration error surfaced at compile time.
    assert!(Compiler::new(config).compile(&rules).is_err());
}

#[test]
fn test_unknown_strategy_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"[engine]\nselection_strategy = \"BEST_EFFORT\"\n")
        .unwrap();
    assert!(Config::from_file(file.path().to_str().unwrap()).is_err());
}
