//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - helios.toml (default configuration)
//! - helios.local.toml (git-ignored local overrides)
//! - Environment variables (HELIOS_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # helios.toml
//! [engine]
//! selection_strategy = "ALL_MATCHES"
//!
//! [cache.base_condition]
//! type = "in-memory"
//! max_size = 100000
//! ttl_seconds = 300
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! HELIOS_CACHE__BASE_CONDITION__MAX_SIZE=500000
//! HELIOS_LOGGING__LEVEL=debug
//! ```

use crate::selection::SelectionStrategy;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Evaluator tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Default selection strategy applied by `evaluate`
    #[serde(default)]
    pub selection_strategy: SelectionStrategy,

    /// Worker threads for batch evaluation (0 = all available CPU cores)
    #[serde(default)]
    pub num_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            selection_strategy: SelectionStrategy::AllMatches,
            num_threads: 0,
        }
    }
}

/// Cache subsystem configuration, one settings block per tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Base-condition result cache (keyed by attribute fingerprint)
    #[serde(default)]
    pub base_condition: CacheSettings,

    /// Eligible-predicate-set cache (keyed by candidate-rule bitmap)
    #[serde(default = "CacheSettings::predicate_set_default")]
    pub predicate_sets: CacheSettings,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            base_condition: CacheSettings::default(),
            predicate_sets: CacheSettings::predicate_set_default(),
        }
    }
}

/// Backend family for a cache tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheBackendKind {
    InMemory,
    Adaptive,
    Distributed,
    None,
}

/// Eviction policy for in-memory backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionPolicy {
    Lru,
    TinyLfu,
}

/// Settings for one cache tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Backend family
    #[serde(rename = "type", default = "default_backend_kind")]
    pub kind: CacheBackendKind,

    /// Upper bound on entries
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Entry lifetime in seconds (0 = no TTL)
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Emit hit/miss metrics
    #[serde(default = "default_true")]
    pub record_stats: bool,

    /// Eviction policy for in-memory backends
    #[serde(default = "default_eviction")]
    pub eviction: EvictionPolicy,

    /// Adaptive band controls (used when type = "adaptive")
    #[serde(default)]
    pub adaptive: AdaptiveSettings,

    /// Distributed-backend connectivity (used when type = "distributed")
    #[serde(default)]
    pub distributed: DistributedSettings,
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            kind: default_backend_kind(),
            max_size: default_max_size(),
            ttl_seconds: default_ttl_seconds(),
            record_stats: true,
            eviction: default_eviction(),
            adaptive: AdaptiveSettings::default(),
            distributed: DistributedSettings::default(),
        }
    }
}

impl CacheSettings {
    /// The predicate-set cache is small: keys are whole eligibility bitmaps
    /// and values are shared across every evaluator using the model.
    pub fn predicate_set_default() -> Self {
        CacheSettings {
            max_size: 4096,
            ttl_seconds: 0,
            ..CacheSettings::default()
        }
    }
}

/// Auto-resize band controls for the adaptive backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveSettings {
    #[serde(default = "default_adaptive_min")]
    pub min_size: usize,
    #[serde(default = "default_adaptive_max")]
    pub max_size: usize,
    /// Below this hit rate the cache grows
    #[serde(default = "default_low_threshold")]
    pub low_hit_rate_threshold: f64,
    /// Above this hit rate the cache shrinks
    #[serde(default = "default_high_threshold")]
    pub high_hit_rate_threshold: f64,
    #[serde(default = "default_tuning_interval")]
    pub tuning_interval_seconds: u64,
}

impl Default for AdaptiveSettings {
    fn default() -> Self {
        AdaptiveSettings {
            min_size: default_adaptive_min(),
            max_size: default_adaptive_max(),
            low_hit_rate_threshold: default_low_threshold(),
            high_hit_rate_threshold: default_high_threshold(),
            tuning_interval_seconds: default_tuning_interval(),
        }
    }
}

/// External key-value store connectivity for the distributed backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributedSettings {
    /// `host:port`, comma-separated when `cluster` is set
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Payloads at or above this size (bytes) are lz4-compressed
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: usize,
    #[serde(default)]
    pub cluster: bool,
}

impl Default for DistributedSettings {
    fn default() -> Self {
        DistributedSettings {
            address: default_address(),
            pool_size: default_pool_size(),
            timeout_ms: default_timeout_ms(),
            compression_threshold: default_compression_threshold(),
            cluster: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_backend_kind() -> CacheBackendKind {
    CacheBackendKind::InMemory
}
fn default_max_size() -> usize {
    100_000
}
fn default_ttl_seconds() -> u64 {
    300
}
fn default_eviction() -> EvictionPolicy {
    EvictionPolicy::TinyLfu
}
fn default_adaptive_min() -> usize {
    10_000
}
fn default_adaptive_max() -> usize {
    1_000_000
}
fn default_low_threshold() -> f64 {
    0.5
}
fn default_high_threshold() -> f64 {
    0.95
}
fn default_tuning_interval() -> u64 {
    30
}
fn default_address() -> String {
    "127.0.0.1:6379".to_string()
}
fn default_pool_size() -> usize {
    4
}
fn default_timeout_ms() -> u64 {
    20
}
fn default_compression_threshold() -> usize {
    1024
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. helios.toml (base configuration)
    /// 2. helios.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (HELIOS_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("helios.toml"))
            .merge(Toml::file("helios.local.toml"))
            .merge(Env::prefixed("HELIOS_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("HELIOS_").split("__"))
            .extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(
            config.engine.selection_strategy,
            SelectionStrategy::AllMatches
        );
        assert_eq!(config.cache.base_condition.kind, CacheBackendKind::InMemory);
        assert_eq!(config.cache.base_condition.max_size, 100_000);
        assert_eq!(config.cache.base_condition.ttl_seconds, 300);
        assert!(config.cache.base_condition.record_stats);
    }

    #[test]
    fn test_backend_kind_wire_names() {
        let kind: CacheBackendKind = serde_json::from_str("\"in-memory\"").unwrap();
        assert_eq!(kind, CacheBackendKind::InMemory);
        let kind: CacheBackendKind = serde_json::from_str("\"distributed\"").unwrap();
        assert_eq!(kind, CacheBackendKind::Distributed);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[engine]"));
        assert!(toml_str.contains("[cache.base_condition]"));
        assert!(toml_str.contains("[cache.predicate_sets]"));
        assert!(toml_str.contains("[logging]"));
    }

    #[test]
    fn test_adaptive_defaults() {
        let settings = AdaptiveSettings::default();
        assert!(settings.min_size < settings.max_size);
        assert!(settings.low_hit_rate_threshold < settings.high_hit_rate_threshold);
    }
}
