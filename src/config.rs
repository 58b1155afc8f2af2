use std::path::{Path, PathBuf};

use homedir::my_home;
use serde::{Deserialize, Serialize};

use crate::ann::graph::{DEFAULT_EF_CONSTRUCTION, DEFAULT_EF_SEARCH, DEFAULT_M, DEFAULT_SEED};
use crate::ann::HnswConfig;
use crate::fusion::{FusionStrategy, DEFAULT_ALPHA, DEFAULT_CATALOG_ALPHA};
use crate::pipeline::{
    StageBudgets, TimeoutPolicy, DEFAULT_BUDGET_MS, DEFAULT_CANDIDATE_MULTIPLIER,
};
use crate::rerank::{
    DiversityMode, DEFAULT_ATTENTION_SCALE, DEFAULT_ATTENTION_TOKENS, DEFAULT_DIVERSITY_LAMBDA,
    DEFAULT_DIVERSITY_WEIGHT, DEFAULT_OCCASION_WEIGHT, DEFAULT_SENTIMENT_WEIGHT,
};
use crate::scoring::ContextWeights;
use crate::storage::{CatalogDir, CONFIG_FILE_NAME};

/// Embedding size of the default CLIP ViT-B/32 models
const DEFAULT_DIMENSIONS: usize = 512;
const DEFAULT_ENCODER_MODEL: &str = "clip-vit-b-32";
/// Encoder call timeout in seconds
const DEFAULT_ENCODER_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is malformed: {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("config file is not valid utf8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("{0}")]
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_m")]
    pub m: usize,
    #[serde(default = "default_ef_construction")]
    pub ef_construction: usize,
    #[serde(default = "default_ef_search")]
    pub ef_search: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
            m: DEFAULT_M,
            ef_construction: DEFAULT_EF_CONSTRUCTION,
            ef_search: DEFAULT_EF_SEARCH,
            seed: DEFAULT_SEED,
        }
    }
}

impl IndexConfig {
    pub fn hnsw(&self) -> HnswConfig {
        HnswConfig {
            dimensions: self.dimensions,
            m: self.m,
            ef_construction: self.ef_construction,
            ef_search: self.ef_search,
            seed: self.seed,
        }
    }
}

fn default_dimensions() -> usize {
    DEFAULT_DIMENSIONS
}

fn default_m() -> usize {
    DEFAULT_M
}

fn default_ef_construction() -> usize {
    DEFAULT_EF_CONSTRUCTION
}

fn default_ef_search() -> usize {
    DEFAULT_EF_SEARCH
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    #[serde(default)]
    pub strategy: FusionStrategy,

    /// Image weight for queries that do not set one
    #[serde(default = "default_alpha")]
    pub default_alpha: f32,

    /// Image weight when fusing a product's own text and image at ingest
    #[serde(default = "default_catalog_alpha")]
    pub catalog_alpha: f32,

    /// D×2D matrix file for the concatenation strategy, relative to the base path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection_path: Option<String>,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            strategy: FusionStrategy::default(),
            default_alpha: DEFAULT_ALPHA,
            catalog_alpha: DEFAULT_CATALOG_ALPHA,
            projection_path: None,
        }
    }
}

fn default_alpha() -> f32 {
    DEFAULT_ALPHA
}

fn default_catalog_alpha() -> f32 {
    DEFAULT_CATALOG_ALPHA
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub weights: ContextWeights,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AttentionProjectionPaths {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RerankConfig {
    /// λ1
    #[serde(default = "default_sentiment_weight")]
    pub sentiment_weight: f32,
    /// λ2
    #[serde(default = "default_occasion_weight")]
    pub occasion_weight: f32,
    /// λ3, used only in additive diversity mode
    #[serde(default = "default_diversity_weight")]
    pub diversity_weight: f32,
    /// MMR λ when the request does not set one
    #[serde(default = "default_diversity")]
    pub default_diversity: f32,
    #[serde(default)]
    pub diversity_mode: DiversityMode,
    #[serde(default = "default_attention_tokens")]
    pub attention_tokens: usize,
    /// 0 disables attention refinement
    #[serde(default = "default_attention_scale")]
    pub attention_scale: f32,
    #[serde(default)]
    pub attention_projection_paths: AttentionProjectionPaths,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            sentiment_weight: DEFAULT_SENTIMENT_WEIGHT,
            occasion_weight: DEFAULT_OCCASION_WEIGHT,
            diversity_weight: DEFAULT_DIVERSITY_WEIGHT,
            default_diversity: DEFAULT_DIVERSITY_LAMBDA,
            diversity_mode: DiversityMode::default(),
            attention_tokens: DEFAULT_ATTENTION_TOKENS,
            attention_scale: DEFAULT_ATTENTION_SCALE,
            attention_projection_paths: AttentionProjectionPaths::default(),
        }
    }
}

fn default_sentiment_weight() -> f32 {
    DEFAULT_SENTIMENT_WEIGHT
}

fn default_occasion_weight() -> f32 {
    DEFAULT_OCCASION_WEIGHT
}

fn default_diversity_weight() -> f32 {
    DEFAULT_DIVERSITY_WEIGHT
}

fn default_diversity() -> f32 {
    DEFAULT_DIVERSITY_LAMBDA
}

fn default_attention_tokens() -> usize {
    DEFAULT_ATTENTION_TOKENS
}

fn default_attention_scale() -> f32 {
    DEFAULT_ATTENTION_SCALE
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Total latency budget per request
    #[serde(default = "default_budget_ms")]
    pub budget_ms: u64,
    #[serde(default)]
    pub stage_budgets: StageBudgets,
    #[serde(default)]
    pub timeout_policy: TimeoutPolicy,
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            budget_ms: DEFAULT_BUDGET_MS,
            stage_budgets: StageBudgets::default(),
            timeout_policy: TimeoutPolicy::default(),
            candidate_multiplier: DEFAULT_CANDIDATE_MULTIPLIER,
        }
    }
}

fn default_budget_ms() -> u64 {
    DEFAULT_BUDGET_MS
}

fn default_candidate_multiplier() -> usize {
    DEFAULT_CANDIDATE_MULTIPLIER
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Model name (e.g., "clip-vit-b-32")
    #[serde(default = "default_encoder_model")]
    pub model: String,

    #[serde(default = "default_encoder_timeout_secs")]
    pub timeout_secs: u64,

    /// Model cache, relative to the base path unless absolute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,

    #[serde(default)]
    pub show_download_progress: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: DEFAULT_ENCODER_MODEL.to_string(),
            timeout_secs: DEFAULT_ENCODER_TIMEOUT_SECS,
            cache_dir: None,
            show_download_progress: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_encoder_model() -> String {
    DEFAULT_ENCODER_MODEL.to_string()
}

fn default_encoder_timeout_secs() -> u64 {
    DEFAULT_ENCODER_TIMEOUT_SECS
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.index
            .hnsw()
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("index: {e}")))?;

        let fusion = &self.fusion;
        for (name, alpha) in [
            ("default_alpha", fusion.default_alpha),
            ("catalog_alpha", fusion.catalog_alpha),
        ] {
            if !(0.0..=1.0).contains(&alpha) {
                return Err(ConfigError::Invalid(format!(
                    "fusion.{name} must be between 0.0 and 1.0, got {alpha}"
                )));
            }
        }
        if fusion.strategy == FusionStrategy::Concatenation && fusion.projection_path.is_none() {
            return Err(ConfigError::Invalid(
                "fusion.projection_path is required for the concatenation strategy".to_string(),
            ));
        }

        self.scoring
            .weights
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("scoring.weights: {e}")))?;

        let rerank = &self.rerank;
        for (name, weight) in [
            ("sentiment_weight", rerank.sentiment_weight),
            ("occasion_weight", rerank.occasion_weight),
            ("diversity_weight", rerank.diversity_weight),
            ("attention_scale", rerank.attention_scale),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "rerank.{name} must be a non-negative number, got {weight}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&rerank.default_diversity) {
            return Err(ConfigError::Invalid(format!(
                "rerank.default_diversity must be between 0.0 and 1.0, got {}",
                rerank.default_diversity
            )));
        }
        if rerank.attention_scale > 0.0
            && (rerank.attention_tokens == 0 || self.index.dimensions % rerank.attention_tokens != 0)
        {
            return Err(ConfigError::Invalid(format!(
                "rerank.attention_tokens ({}) must divide index.dimensions ({})",
                rerank.attention_tokens, self.index.dimensions
            )));
        }

        if self.pipeline.budget_ms == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.budget_ms must be greater than 0".to_string(),
            ));
        }
        if self.pipeline.candidate_multiplier == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.candidate_multiplier must be greater than 0".to_string(),
            ));
        }

        if self.encoder.enabled && self.encoder.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "encoder.timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(&get_base_path()?)
    }

    pub fn load_with(base_path: &Path) -> Result<Self, ConfigError> {
        let store = CatalogDir::new(base_path)?;

        // create new if does not exist
        if !store.exists(CONFIG_FILE_NAME) {
            store.write(CONFIG_FILE_NAME, serde_yml::to_string(&Self::default())?.as_bytes())?;
        }

        let config_str = String::from_utf8(store.read(CONFIG_FILE_NAME)?)?;
        let mut config: Self = serde_yml::from_str(&config_str)?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let store = CatalogDir::new(&self.base_path)?;

        let config_str = serde_yml::to_string(&self)?;
        store.write(CONFIG_FILE_NAME, config_str.as_bytes())?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn with_base_path(mut self, base_path: impl Into<PathBuf>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Encoder model cache directory.
    pub fn encoder_cache_dir(&self) -> PathBuf {
        match &self.encoder.cache_dir {
            Some(dir) => self.base_path.join(dir),
            None => self.base_path.join("models"),
        }
    }
}

/// `$SHOPSENSE_BASE_PATH`, else `~/.local/share/shopsense`.
pub fn get_base_path() -> Result<PathBuf, ConfigError> {
    if let Ok(path) = std::env::var("SHOPSENSE_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }
    let home = my_home()
        .map_err(|e| ConfigError::Invalid(format!("Could not determine home directory: {e}")))?
        .ok_or_else(|| ConfigError::Invalid("Home directory path is empty".to_string()))?;
    Ok(home.join(".local/share/shopsense"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_creates_default_config() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_with(tmp.path()).unwrap();

        assert!(tmp.path().join(CONFIG_FILE_NAME).exists());
        assert_eq!(config.index, IndexConfig::default());
        assert_eq!(config.rerank.diversity_mode, DiversityMode::Mmr);
        assert_eq!(config.pipeline.timeout_policy, TimeoutPolicy::Degrade);
        assert_eq!(config.base_path(), tmp.path());
    }

    #[test]
    fn test_partial_config_is_upgraded() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "pipeline:\n  budget_ms: 100\n  timeout_policy: fail\n").unwrap();

        let config = Config::load_with(tmp.path()).unwrap();
        assert_eq!(config.pipeline.budget_ms, 100);
        assert_eq!(config.pipeline.timeout_policy, TimeoutPolicy::Fail);
        assert_eq!(config.fusion.catalog_alpha, DEFAULT_CATALOG_ALPHA);

        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.contains("catalog_alpha"));
        assert!(saved.contains("ef_construction"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);

        std::fs::write(&path, "scoring:\n  weights:\n    occasion: 0.9\n").unwrap();
        let err = Config::load_with(tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("scoring.weights")));

        std::fs::write(&path, "fusion:\n  default_alpha: 1.5\n").unwrap();
        assert!(matches!(Config::load_with(tmp.path()), Err(ConfigError::Invalid(_))));

        std::fs::write(&path, "rerank:\n  attention_tokens: 7\n").unwrap();
        assert!(matches!(Config::load_with(tmp.path()), Err(ConfigError::Invalid(_))));

        std::fs::write(&path, "index: [not, a, map]\n").unwrap();
        assert!(matches!(Config::load_with(tmp.path()), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_index_config_maps_to_hnsw() {
        let index = IndexConfig {
            dimensions: 64,
            m: 8,
            ..Default::default()
        };
        let hnsw = index.hnsw();
        assert_eq!(hnsw.dimensions, 64);
        assert_eq!(hnsw.m, 8);
        assert_eq!(hnsw.ef_search, DEFAULT_EF_SEARCH);
    }
}
