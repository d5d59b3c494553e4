//! Pipeline configuration with TOML loading and env overrides.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use quarry_store::{ConsistencyLevel, Ranker};
use serde::Deserialize;

use crate::error::{IndexError, Result};

/// Which fusion strategy hybrid search uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankerType {
    #[default]
    Rrf,
    Weight,
}

/// Ranker selection plus its parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RankerConfig {
    #[serde(default)]
    pub ranker_type: RankerType,
    #[serde(default = "default_k_rrf")]
    pub k_rrf: f32,
    #[serde(default = "default_dense_weight")]
    pub dense_weight: f32,
    #[serde(default = "default_sparse_weight")]
    pub sparse_weight: f32,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            ranker_type: RankerType::Rrf,
            k_rrf: default_k_rrf(),
            dense_weight: default_dense_weight(),
            sparse_weight: default_sparse_weight(),
        }
    }
}

impl RankerConfig {
    #[must_use]
    pub fn to_ranker(&self) -> Ranker {
        match self.ranker_type {
            RankerType::Rrf => Ranker::Rrf { k: self.k_rrf },
            RankerType::Weight => Ranker::Weighted {
                dense: self.dense_weight,
                sparse: self.sparse_weight,
            },
        }
    }
}

/// Configuration for the indexing pipeline and query planner.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    /// Chunks buffered before an embed+insert flush. Minimum 1.
    #[serde(default = "default_embed_batch")]
    pub embed_batch: usize,
    /// Create collections with a sparse field and encode documents for
    /// hybrid search.
    #[serde(default)]
    pub enable_sparse: bool,
    /// Lowercase dotted extensions eligible for indexing.
    #[serde(default = "default_supported_extensions")]
    pub supported_extensions: BTreeSet<String>,
    /// User ignore patterns, merged with the default denylist.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    /// Window-splitter chunk size in characters; also the upper bound
    /// above which an AST node is subdivided.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Window-splitter overlap in characters.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default)]
    pub ranker: RankerConfig,
    /// Forwarded to backends that distinguish read consistency.
    #[serde(default)]
    pub consistency_level: ConsistencyLevel,
    /// Directory holding per-codebase snapshots.
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,
    /// Concurrent outbound calls for the enrichment transform. 1 keeps
    /// the pipeline strictly serial.
    #[serde(default = "default_max_parallel_batches")]
    pub max_parallel_batches: usize,
    /// Deadline in seconds for each outbound embedding or store call.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_embed_batch() -> usize {
    100
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_k_rrf() -> f32 {
    100.0
}

fn default_dense_weight() -> f32 {
    0.7
}

fn default_sparse_weight() -> f32 {
    0.3
}

fn default_max_parallel_batches() -> usize {
    1
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_snapshot_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".codeindexer")
        .join("merkle")
}

fn default_supported_extensions() -> BTreeSet<String> {
    [
        ".rs", ".py", ".js", ".jsx", ".mjs", ".cjs", ".ts", ".tsx", ".go", ".java", ".md", ".txt",
    ]
    .iter()
    .map(|e| (*e).to_string())
    .collect()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            embed_batch: default_embed_batch(),
            enable_sparse: false,
            supported_extensions: default_supported_extensions(),
            ignore_patterns: Vec::new(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            ranker: RankerConfig::default(),
            consistency_level: ConsistencyLevel::default(),
            snapshot_dir: default_snapshot_dir(),
            max_parallel_batches: default_max_parallel_batches(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl IndexConfig {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns a config error if the file exists but cannot be read or
    /// parsed, or if the resulting configuration is invalid.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| IndexError::Config(format!("failed to read config file: {e}")))?;
            toml::from_str::<Self>(&content)
                .map_err(|e| IndexError::Config(format!("failed to parse config file: {e}")))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("QUARRY_EMBED_BATCH")
            && let Ok(batch) = v.parse::<usize>()
        {
            self.embed_batch = batch;
        }
        if let Ok(v) = std::env::var("QUARRY_ENABLE_SPARSE")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.enable_sparse = enabled;
        }
        if let Ok(v) = std::env::var("QUARRY_CHUNK_SIZE")
            && let Ok(size) = v.parse::<usize>()
        {
            self.chunk_size = size;
        }
        if let Ok(v) = std::env::var("QUARRY_CHUNK_OVERLAP")
            && let Ok(overlap) = v.parse::<usize>()
        {
            self.chunk_overlap = overlap;
        }
        if let Ok(v) = std::env::var("QUARRY_SNAPSHOT_DIR") {
            self.snapshot_dir = PathBuf::from(v);
        }
    }

    /// Check invariants the pipeline relies on.
    ///
    /// # Errors
    ///
    /// Returns a config error naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.embed_batch < 1 {
            return Err(IndexError::Config("embed_batch must be at least 1".into()));
        }
        if self.chunk_size == 0 {
            return Err(IndexError::Config("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IndexError::Config(
                "chunk_overlap must be smaller than chunk_size".into(),
            ));
        }
        if self.max_parallel_batches < 1 {
            return Err(IndexError::Config(
                "max_parallel_batches must be at least 1".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(IndexError::Config(
                "request_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = IndexConfig::default();
        config.validate().unwrap();
        assert_eq!(config.embed_batch, 100);
        assert!(!config.enable_sparse);
        assert!(config.supported_extensions.contains(".rs"));
        assert!(config.snapshot_dir.ends_with(".codeindexer/merkle"));
    }

    #[test]
    fn default_ranker_is_rrf_100() {
        let ranker = RankerConfig::default().to_ranker();
        assert_eq!(ranker, Ranker::Rrf { k: 100.0 });
    }

    #[test]
    fn parse_toml_overrides() {
        let toml_src = r#"
embed_batch = 16
enable_sparse = true
chunk_size = 800
chunk_overlap = 100

[ranker]
ranker_type = "weight"
dense_weight = 0.6
sparse_weight = 0.4
"#;
        let config: IndexConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.embed_batch, 16);
        assert!(config.enable_sparse);
        assert_eq!(
            config.ranker.to_ranker(),
            Ranker::Weighted {
                dense: 0.6,
                sparse: 0.4
            }
        );
        // Unset fields keep their defaults.
        assert_eq!(config.max_parallel_batches, 1);
    }

    #[test]
    fn zero_embed_batch_is_rejected() {
        let config = IndexConfig {
            embed_batch: 0,
            ..IndexConfig::default()
        };
        assert!(matches!(config.validate(), Err(IndexError::Config(_))));
    }

    #[test]
    fn overlap_must_stay_below_chunk_size() {
        let config = IndexConfig {
            chunk_size: 100,
            chunk_overlap: 100,
            ..IndexConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let config = IndexConfig::load(Path::new("/nonexistent/quarry.toml")).unwrap();
        assert_eq!(config.embed_batch, 100);
    }

    #[test]
    fn consistency_level_parses() {
        let config: IndexConfig = toml::from_str("consistency_level = \"strong\"").unwrap();
        assert_eq!(config.consistency_level, ConsistencyLevel::Strong);
    }
}
