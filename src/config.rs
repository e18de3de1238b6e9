//!
//! Handles application configuration: fusion tuning, embedding backend
//! selection, watcher behavior, and index layout.
//! Configuration is typically loaded from a `config.toml` file.

use crate::constants::*;
use crate::error::{Error, Result};
use crate::query::QueryIntent;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

const APP_NAME: &str = "codequery";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Fusion strategy selector.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FusionStrategy {
    Rrf,
    WeightedLinear,
    Learned,
}

impl FusionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FusionStrategy::Rrf => "rrf",
            FusionStrategy::WeightedLinear => "weighted_linear",
            FusionStrategy::Learned => "learned",
        }
    }
}

/// Score normalization applied independently to each side before merging.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    None,
    MinMax,
    ZScore,
    RankBased,
}

/// Fusion ranker configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FusionConfig {
    #[serde(default = "default_strategy")]
    pub strategy: FusionStrategy,
    /// λ: share of the final score attributed to the lexical side.
    #[serde(default = "default_bm25_weight")]
    pub bm25_weight: f32,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,
    #[serde(default = "default_normalization")]
    pub normalization: Normalization,
    #[serde(default = "default_true")]
    pub adaptive_weighting: bool,
    /// The historical weight bumps (both-sides λ<0.5 → 0.6, JSON field
    /// query → 0.85). Off means neither guard ever fires.
    #[serde(default = "default_true")]
    pub legacy_weight_guards: bool,
    #[serde(default = "default_query_type_weights")]
    pub query_type_weights: HashMap<QueryIntent, f32>,
    #[serde(default = "default_exact_match_boost")]
    pub exact_match_boost: f32,
    #[serde(default = "default_symbol_match_boost")]
    pub symbol_match_boost: f32,
    #[serde(default = "default_file_type_boost")]
    pub file_type_boost: f32,
    #[serde(default = "default_recency_boost")]
    pub recency_boost: f32,
    #[serde(default = "default_recency_window_days")]
    pub recency_window_days: i64,
    #[serde(default = "default_min_lexical_score")]
    pub min_lexical_score: f32,
    #[serde(default = "default_min_semantic_score")]
    pub min_semantic_score: f32,
    /// When one search side fails, serve the other side's hits plus a
    /// warning instead of failing the request.
    #[serde(default = "default_true")]
    pub best_effort_sides: bool,
    #[serde(default = "default_true")]
    pub enable_analytics: bool,
    #[serde(default)]
    pub debug_scoring: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            bm25_weight: default_bm25_weight(),
            rrf_k: default_rrf_k(),
            normalization: default_normalization(),
            adaptive_weighting: true,
            legacy_weight_guards: true,
            query_type_weights: default_query_type_weights(),
            exact_match_boost: default_exact_match_boost(),
            symbol_match_boost: default_symbol_match_boost(),
            file_type_boost: default_file_type_boost(),
            recency_boost: default_recency_boost(),
            recency_window_days: default_recency_window_days(),
            min_lexical_score: default_min_lexical_score(),
            min_semantic_score: default_min_semantic_score(),
            best_effort_sides: true,
            enable_analytics: true,
            debug_scoring: false,
        }
    }
}

fn default_strategy() -> FusionStrategy {
    FusionStrategy::Rrf
}
fn default_bm25_weight() -> f32 {
    DEFAULT_BM25_WEIGHT
}
fn default_rrf_k() -> f32 {
    DEFAULT_RRF_K
}
fn default_normalization() -> Normalization {
    Normalization::None
}
fn default_true() -> bool {
    true
}
fn default_exact_match_boost() -> f32 {
    DEFAULT_EXACT_MATCH_BOOST
}
fn default_symbol_match_boost() -> f32 {
    DEFAULT_SYMBOL_MATCH_BOOST
}
fn default_file_type_boost() -> f32 {
    DEFAULT_FILE_TYPE_BOOST
}
fn default_recency_boost() -> f32 {
    DEFAULT_RECENCY_BOOST
}
fn default_recency_window_days() -> i64 {
    DEFAULT_RECENCY_WINDOW_DAYS
}
fn default_min_lexical_score() -> f32 {
    DEFAULT_MIN_LEXICAL_SCORE
}
fn default_min_semantic_score() -> f32 {
    DEFAULT_MIN_SEMANTIC_SCORE
}

fn default_query_type_weights() -> HashMap<QueryIntent, f32> {
    let mut weights = HashMap::new();
    weights.insert(QueryIntent::Natural, 0.35);
    weights.insert(QueryIntent::Code, 0.65);
    weights.insert(QueryIntent::Symbol, 0.75);
    weights.insert(QueryIntent::File, 0.55);
    weights.insert(QueryIntent::Import, 0.70);
    weights.insert(QueryIntent::Config, 0.80);
    weights
}

/// Which embedder implementation to run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderKind {
    /// Deterministic lexical-statistics encoder (feature hashing).
    Hashed,
    /// External ONNX model (requires the `onnx` build feature).
    Onnx,
    /// Fixed pseudo-embeddings for tests and wiring checks.
    Stub,
}

/// Embedding backend configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_model")]
    pub model: EmbedderKind,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    /// Per-call timeout in seconds; 0 disables the deadline.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub onnx_model_path: Option<PathBuf>,
    #[serde(default)]
    pub onnx_tokenizer_path: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            device: default_device(),
            dimension: default_dimension(),
            batch_size: default_batch_size(),
            cache_size: default_cache_size(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            onnx_model_path: None,
            onnx_tokenizer_path: None,
        }
    }
}

fn default_model() -> EmbedderKind {
    EmbedderKind::Hashed
}
fn default_device() -> String {
    "cpu".to_string()
}
fn default_dimension() -> usize {
    DEFAULT_DIMENSION
}
fn default_batch_size() -> usize {
    DEFAULT_EMBED_BATCH_SIZE
}
fn default_cache_size() -> usize {
    DEFAULT_EMBED_CACHE_SIZE
}
fn default_timeout_secs() -> u64 {
    DEFAULT_EMBED_TIMEOUT_SECS
}
fn default_max_retries() -> u32 {
    DEFAULT_EMBED_MAX_RETRIES
}

/// File watcher configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WatcherConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}
fn default_queue_capacity() -> usize {
    DEFAULT_EVENT_QUEUE_CAPACITY
}

/// Index-at-rest security settings.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SecurityConfig {
    #[serde(default)]
    pub encrypt_index: bool,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
}

/// Represents the application configuration, loaded from `config.toml`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct AppConfig {
    /// Directory holding the lexical shard and vector files. Defaults to
    /// the XDG data dir (`~/.local/share/codequery/index`).
    #[serde(default)]
    pub index_root: Option<PathBuf>,
    #[serde(default)]
    pub repo_globs: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

impl AppConfig {
    /// Resolves the index directory, creating nothing.
    pub fn index_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.index_root {
            return Ok(root.clone());
        }
        dirs::data_dir()
            .map(|d| d.join(APP_NAME).join("index"))
            .ok_or_else(|| Error::Config("could not determine data directory".to_string()))
    }

    /// Embedder kind after applying the `EMBEDDER_USE_*` env overrides.
    ///
    /// `EMBEDDER_USE_STUB`, `EMBEDDER_USE_TFIDF` and `EMBEDDER_USE_ONNX`
    /// (alias `EMBEDDER_USE_REAL`) each force an implementation when set
    /// to a non-empty, non-"0" value. First match wins.
    pub fn embedder_kind(&self) -> EmbedderKind {
        fn env_on(name: &str) -> bool {
            std::env::var(name)
                .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
                .unwrap_or(false)
        }
        if env_on("EMBEDDER_USE_STUB") {
            return EmbedderKind::Stub;
        }
        if env_on("EMBEDDER_USE_TFIDF") {
            return EmbedderKind::Hashed;
        }
        if env_on("EMBEDDER_USE_ONNX") || env_on("EMBEDDER_USE_REAL") {
            return EmbedderKind::Onnx;
        }
        self.embedding.model
    }

    /// Rejects configurations this build cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 {
            return Err(Error::Config("embedding.dimension must be positive".into()));
        }
        if self.fusion.bm25_weight < 0.0 || self.fusion.bm25_weight > 1.0 {
            return Err(Error::Config("fusion.bm25_weight must be in [0, 1]".into()));
        }
        if self.security.encrypt_index {
            return Err(Error::Config(
                "security.encrypt_index is not supported by this build".into(),
            ));
        }
        Ok(())
    }
}

/// Returns the expected path to the application's configuration file.
///
/// Based on the XDG base directory specification
/// (e.g. `~/.config/codequery/config.toml`).
fn get_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .ok_or_else(|| Error::Config("could not find config directory".to_string()))
        .map(|config_dir| config_dir.join(APP_NAME).join(CONFIG_FILE_NAME))
}

/// Gets the configuration path by checking ENV, override, or default XDG.
pub fn get_config_path_or_default(override_path: Option<&PathBuf>) -> Result<PathBuf> {
    // Test environment variable takes precedence
    if let Ok(test_path_str) = std::env::var("CODEQUERY_TEST_CONFIG_PATH") {
        debug!("Using test config path from ENV: {}", test_path_str);
        return Ok(PathBuf::from(test_path_str));
    }
    if let Some(path) = override_path {
        debug!("Using override config path: {}", path.display());
        return Ok(path.clone());
    }
    get_config_path()
}

/// Loads the configuration, returning defaults when no file exists.
pub fn load_config(override_path: Option<&PathBuf>) -> Result<AppConfig> {
    let path = get_config_path_or_default(override_path)?;
    if !path.exists() {
        debug!("No config file at {}, using defaults", path.display());
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(&path)?;
    let config: AppConfig =
        toml::from_str(&contents).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    config.validate()?;
    Ok(config)
}

/// Persists the configuration to the resolved config path.
pub fn save_config(config: &AppConfig, override_path: Option<&PathBuf>) -> Result<PathBuf> {
    let path = get_config_path_or_default(override_path)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let contents =
        toml::to_string_pretty(config).map_err(|e| Error::Config(e.to_string()))?;
    fs::write(&path, contents)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.fusion.strategy, FusionStrategy::Rrf);
        assert!((config.fusion.bm25_weight - 0.45).abs() < 1e-6);
        assert_eq!(config.fusion.rrf_k, 60.0);
        assert_eq!(config.embedding.dimension, 768);
        assert_eq!(config.embedding.cache_size, 10_000);
        assert_eq!(config.watcher.debounce_ms, 250);
        assert!(config.fusion.best_effort_sides);
    }

    #[test]
    fn test_query_type_weight_table() {
        let weights = default_query_type_weights();
        assert_eq!(weights[&QueryIntent::Config], 0.80);
        assert_eq!(weights[&QueryIntent::Natural], 0.35);
        assert_eq!(weights.len(), 6);
    }

    #[test]
    fn test_partial_toml_round_trip() {
        let toml_str = r#"
            [fusion]
            strategy = "weighted_linear"
            bm25_weight = 0.6

            [embedding]
            dimension = 384
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.fusion.strategy, FusionStrategy::WeightedLinear);
        assert!((config.fusion.bm25_weight - 0.6).abs() < 1e-6);
        assert_eq!(config.embedding.dimension, 384);
        // Unspecified sections keep their defaults
        assert_eq!(config.watcher.debounce_ms, 250);
    }

    #[test]
    fn test_validate_rejects_encryption() {
        let mut config = AppConfig::default();
        config.security.encrypt_index = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_weight() {
        let mut config = AppConfig::default();
        config.fusion.bm25_weight = 1.5;
        assert!(config.validate().is_err());
    }
}
