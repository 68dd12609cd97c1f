//! Configuration loading for the recommendation engine.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at `<config dir>/video-recs/config.toml`.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::RecsError;

/// Name of the collection holding video vectors.
pub const DEFAULT_COLLECTION_NAME: &str = "videos";

const APP_NAME: &str = "video-recs";

/// Which embedding backend the CLI wires into the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderProvider {
    /// all-MiniLM-L6-v2 via Candle (downloads model files on first use)
    #[default]
    Candle,
    /// Deterministic feature hashing, no model files
    Hashing,
}

/// Embedding model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderSettings {
    #[serde(default)]
    pub provider: EmbedderProvider,

    /// HuggingFace repository of the Candle model
    #[serde(default = "default_model_repo")]
    pub model_repo: String,

    /// Model file cache directory (None = platform cache dir)
    #[serde(default)]
    pub cache_dir: Option<String>,

    /// Output dimension of the hashing embedder
    #[serde(default = "default_hashing_dimension")]
    pub dimension: usize,

    /// Documents embedded and stored together during batch indexing
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_model_repo() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

fn default_hashing_dimension() -> usize {
    384
}

fn default_batch_size() -> usize {
    32
}

impl Default for EmbedderSettings {
    fn default() -> Self {
        Self {
            provider: EmbedderProvider::default(),
            model_repo: default_model_repo(),
            cache_dir: None,
            dimension: default_hashing_dimension(),
            batch_size: default_batch_size(),
        }
    }
}

/// Recommendation query limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySettings {
    /// Limit used when the caller does not pass one
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Requests above this are clamped
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

fn default_limit() -> usize {
    10
}

fn default_max_limit() -> usize {
    100
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

/// HNSW index parameters for the persistent store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswSettings {
    /// Connections per layer (M)
    #[serde(default = "default_connectivity")]
    pub connectivity: usize,

    /// Build-time search depth (ef_construction)
    #[serde(default = "default_expansion_add")]
    pub expansion_add: usize,

    /// Query-time search depth (ef_search)
    #[serde(default = "default_expansion_search")]
    pub expansion_search: usize,

    /// Initial capacity reserved per collection
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_connectivity() -> usize {
    16
}

fn default_expansion_add() -> usize {
    200
}

fn default_expansion_search() -> usize {
    100
}

fn default_capacity() -> usize {
    10_000
}

impl Default for HnswSettings {
    fn default() -> Self {
        Self {
            connectivity: default_connectivity(),
            expansion_add: default_expansion_add(),
            expansion_search: default_expansion_search(),
            capacity: default_capacity(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory of the persistent vector store
    #[serde(default = "default_store_path")]
    pub store_path: String,

    /// Collection holding video vectors
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub embedder: EmbedderSettings,

    #[serde(default)]
    pub query: QuerySettings,

    #[serde(default)]
    pub hnsw: HnswSettings,
}

fn default_store_path() -> String {
    ProjectDirs::from("", "", APP_NAME)
        .map(|p| p.data_local_dir().join("vector-store"))
        .unwrap_or_else(|| PathBuf::from("./vector-store"))
        .to_string_lossy()
        .to_string()
}

fn default_collection_name() -> String {
    DEFAULT_COLLECTION_NAME.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            collection_name: default_collection_name(),
            log_level: default_log_level(),
            embedder: EmbedderSettings::default(),
            query: QuerySettings::default(),
            hnsw: HnswSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (`<config dir>/video-recs/config.toml`)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (`RECS_*`, nested keys with `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, RecsError> {
        let config_dir = ProjectDirs::from("", "", APP_NAME)
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("store_path", default_store_path())
            .map_err(|e| RecsError::Config(e.to_string()))?
            .set_default("collection_name", default_collection_name())
            .map_err(|e| RecsError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| RecsError::Config(e.to_string()))?
            .set_default("query.default_limit", default_limit() as i64)
            .map_err(|e| RecsError::Config(e.to_string()))?
            .set_default("query.max_limit", default_max_limit() as i64)
            .map_err(|e| RecsError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // RECS_STORE_PATH, RECS_EMBEDDER__PROVIDER, RECS_QUERY__MAX_LIMIT, ...
        builder = builder.add_source(
            Environment::with_prefix("RECS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| RecsError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| RecsError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), RecsError> {
        if self.collection_name.trim().is_empty() {
            return Err(RecsError::Config("collection_name must not be empty".into()));
        }
        if self.query.max_limit == 0 {
            return Err(RecsError::Config("query.max_limit must be > 0".into()));
        }
        if self.query.default_limit == 0 || self.query.default_limit > self.query.max_limit {
            return Err(RecsError::Config(format!(
                "query.default_limit must be 1..={}, got {}",
                self.query.max_limit, self.query.default_limit
            )));
        }
        if self.embedder.dimension == 0 {
            return Err(RecsError::Config("embedder.dimension must be > 0".into()));
        }
        if self.embedder.batch_size == 0 {
            return Err(RecsError::Config("embedder.batch_size must be > 0".into()));
        }
        Ok(())
    }

    /// Expand `~/` in store_path to the home directory
    pub fn expanded_store_path(&self) -> PathBuf {
        expand_home(&self.store_path)
    }

    /// Model cache directory, if one was configured
    pub fn expanded_cache_dir(&self) -> Option<PathBuf> {
        self.embedder.cache_dir.as_deref().map(expand_home)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(base) = directories::BaseDirs::new() {
            return base.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}
