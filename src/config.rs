use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MnemosConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub faces: FaceConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Holds `memory.db` and both index file pairs.
    pub data_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Candidates recalled from the text index before reranking.
    pub top_k: usize,
    /// Minimum rerank cosine score for a concrete answer.
    pub confidence_threshold: f32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FaceConfig {
    /// A new face inherits a label when its nearest neighbor scores strictly above this.
    pub match_threshold: f32,
    /// Neighborhood radius (cosine distance) for identity clustering.
    pub cluster_eps: f32,
    /// Minimum faces, including the core face itself, to form an identity.
    pub cluster_min_size: usize,
    pub search_top_k: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.mnemos".into(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir: "~/.mnemos/models".into(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            confidence_threshold: 0.3,
        }
    }
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.75,
            cluster_eps: 0.35,
            cluster_min_size: 3,
            search_top_k: 10,
        }
    }
}

/// Returns `~/.mnemos/`, or `./.mnemos` when no home directory is known.
pub fn default_mnemos_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mnemos")
}

/// Returns the default config file path: `~/.mnemos/config.toml`
pub fn default_config_path() -> PathBuf {
    default_mnemos_dir().join("config.toml")
}

impl MnemosConfig {
    /// Load config from the default TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MnemosConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// MNEMOS_DATA_DIR, MNEMOS_LOG_LEVEL, MNEMOS_CONFIDENCE_THRESHOLD.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MNEMOS_DATA_DIR") {
            self.storage.data_dir = val;
        }
        if let Ok(val) = std::env::var("MNEMOS_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("MNEMOS_CONFIDENCE_THRESHOLD") {
            match val.parse::<f32>() {
                Ok(threshold) => self.retrieval.confidence_threshold = threshold,
                Err(_) => warn!(value = %val, "ignoring unparsable MNEMOS_CONFIDENCE_THRESHOLD"),
            }
        }
    }

    pub fn resolved_data_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.data_dir)
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        self.resolved_data_dir().join("memory.db")
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
