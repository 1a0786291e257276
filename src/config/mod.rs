//! Configuration management for vidsim
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Hard upper bound on search result counts
pub const MAX_TOP_K: usize = 100;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Qdrant connection URL
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Environment variable name for Qdrant API key
    #[serde(default = "default_qdrant_api_key_env")]
    pub qdrant_api_key_env: String,

    /// Qdrant collection name
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Feature vector dimension (must equal the histogram bin product)
    #[serde(default = "default_vector_dim")]
    pub vector_dim: usize,

    /// Colour histogram configuration
    #[serde(default)]
    pub features: FeatureConfig,

    /// Frame sampling configuration
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Upload validation configuration
    #[serde(default)]
    pub ingest: IngestConfig,

    /// External media tools
    #[serde(default)]
    pub media: MediaConfig,

    /// Blob storage directories
    #[serde(default)]
    pub storage: StorageConfig,

    /// Query configuration
    #[serde(default)]
    pub query: QueryConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Colour histogram configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(default = "default_hue_bins")]
    pub hue_bins: usize,

    #[serde(default = "default_saturation_bins")]
    pub saturation_bins: usize,

    #[serde(default = "default_value_bins")]
    pub value_bins: usize,
}

impl FeatureConfig {
    /// Length of the flattened histogram
    pub fn dimension(&self) -> usize {
        self.hue_bins * self.saturation_bins * self.value_bins
    }
}

/// Frame sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Seconds between sampled frames when none is given
    #[serde(default = "default_interval_secs")]
    pub default_interval_secs: f64,

    /// Image extension used when writing sampled frames
    #[serde(default = "default_frame_format")]
    pub frame_format: String,
}

/// Upload validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum accepted video size in MB
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,

    /// Allowed container extensions (lowercase, without dot)
    #[serde(default = "default_supported_formats")]
    pub supported_formats: Vec<String>,

    /// Abort an ingestion after this many seconds (0 = wait forever)
    #[serde(default = "default_ingest_timeout_secs")]
    pub timeout_secs: u64,
}

impl IngestConfig {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }

    /// Check a filename's extension against the allow-list
    pub fn is_supported_format(&self, filename: &str) -> bool {
        let Some(ext) = Path::new(filename).extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let ext = ext.to_lowercase();
        self.supported_formats
            .iter()
            .any(|f| f.trim_start_matches('.').eq_ignore_ascii_case(&ext))
    }
}

/// External media tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,
}

/// Blob storage directories (default to `<base_dir>/storage/...`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_dir: Option<PathBuf>,
}

/// Query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Default number of results
    #[serde(default = "default_query_k")]
    pub default_k: usize,

    /// Maximum results allowed
    #[serde(default = "default_query_max_k")]
    pub max_k: usize,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for vidsim data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            qdrant_api_key_env: default_qdrant_api_key_env(),
            collection_name: default_collection_name(),
            vector_dim: default_vector_dim(),
            features: FeatureConfig::default(),
            sampling: SamplingConfig::default(),
            ingest: IngestConfig::default(),
            media: MediaConfig::default(),
            storage: StorageConfig::default(),
            query: QueryConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            hue_bins: default_hue_bins(),
            saturation_bins: default_saturation_bins(),
            value_bins: default_value_bins(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: default_interval_secs(),
            frame_format: default_frame_format(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: default_max_file_size_mb(),
            supported_formats: default_supported_formats(),
            timeout_secs: default_ingest_timeout_secs(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_k: default_query_k(),
            max_k: default_query_max_k(),
        }
    }
}

impl Config {
    /// Get the default base directory for vidsim (~/.vidsim)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".vidsim")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("metadata.db"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("metadata.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Get the Qdrant API key from environment
    pub fn qdrant_api_key(&self) -> Option<String> {
        if self.qdrant_api_key_env.is_empty() {
            return None;
        }
        std::env::var(&self.qdrant_api_key_env).ok()
    }

    /// Directory holding stored video uploads
    pub fn video_dir(&self) -> PathBuf {
        self.storage
            .video_dir
            .clone()
            .unwrap_or_else(|| self.paths.base_dir.join("storage").join("videos"))
    }

    /// Directory holding sampled frames, one subdirectory per video
    pub fn frame_dir(&self) -> PathBuf {
        self.storage
            .frame_dir
            .clone()
            .unwrap_or_else(|| self.paths.base_dir.join("storage").join("frames"))
    }

    /// Check if vidsim is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let f = &self.features;
        if f.hue_bins == 0 || f.saturation_bins == 0 || f.value_bins == 0 {
            return Err(Error::Config(
                "features.*_bins must all be greater than 0".to_string(),
            ));
        }

        if f.hue_bins > 180 || f.saturation_bins > 256 || f.value_bins > 256 {
            return Err(Error::Config(
                "features.hue_bins must be <= 180, saturation/value bins <= 256".to_string(),
            ));
        }

        if self.vector_dim != f.dimension() {
            return Err(Error::Config(format!(
                "vector_dim ({}) must equal hue_bins * saturation_bins * value_bins ({})",
                self.vector_dim,
                f.dimension()
            )));
        }

        let interval = self.sampling.default_interval_secs;
        if !interval.is_finite() || interval <= 0.0 {
            return Err(Error::Config(
                "sampling.default_interval_secs must be positive".to_string(),
            ));
        }

        let frame_format = self.sampling.frame_format.trim().trim_start_matches('.');
        let encodable = matches!(
            image::ImageFormat::from_extension(frame_format),
            Some(
                image::ImageFormat::Png
                    | image::ImageFormat::Jpeg
                    | image::ImageFormat::Gif
                    | image::ImageFormat::WebP
                    | image::ImageFormat::Bmp
            )
        );
        if !encodable {
            return Err(Error::Config(format!(
                "sampling.frame_format '{}' is not one of jpg, png, gif, webp, bmp",
                self.sampling.frame_format
            )));
        }

        if self.ingest.max_file_size_mb == 0 {
            return Err(Error::Config(
                "ingest.max_file_size_mb must be positive".to_string(),
            ));
        }

        if self.ingest.supported_formats.is_empty() {
            return Err(Error::Config(
                "ingest.supported_formats must list at least one extension".to_string(),
            ));
        }

        if self.query.max_k == 0 || self.query.max_k > MAX_TOP_K {
            return Err(Error::Config(format!(
                "query.max_k must be between 1 and {}",
                MAX_TOP_K
            )));
        }

        if self.query.default_k == 0 || self.query.default_k > self.query.max_k {
            return Err(Error::Config(
                "query.default_k must be between 1 and query.max_k".to_string(),
            ));
        }

        Ok(())
    }
}
