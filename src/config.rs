//! Configuration structures for the classification service.
//!
//! Values come from `Default`, then an optional TOML file, then command line
//! flags and environment variables applied by the server binary.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::inference::model::{ModelSource, DEFAULT_MODEL_NAME};
use crate::inference::preprocess::NormalizationPreset;
use crate::utils::error::{ClassifyError, Result};
use crate::utils::logging::LogConfig;

/// Main configuration for the service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP listener settings
    pub server: ServerConfig,
    /// Pretrained model settings
    pub model: ModelConfig,
    /// Session persistence settings
    pub storage: StorageConfig,
    /// Which std constants preprocessing normalizes with
    pub normalization: NormalizationPreset,
    /// Logging settings
    pub logging: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            model: ModelConfig::default(),
            storage: StorageConfig::default(),
            normalization: NormalizationPreset::default(),
            logging: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from a TOML file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let config: Self = load_toml_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would otherwise fail at runtime
    pub fn validate(&self) -> Result<()> {
        if self.model.name.trim().is_empty() {
            return Err(ClassifyError::Config("model.name must not be empty".to_string()));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(ClassifyError::Config(
                "server.max_upload_bytes must be greater than zero".to_string(),
            ));
        }
        if self.storage.persist && self.storage.output_dir.as_os_str().is_empty() {
            return Err(ClassifyError::Config(
                "storage.output_dir is required when persistence is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Maximum request body size for uploads
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            max_upload_bytes: 64 * 1024 * 1024,
        }
    }
}

/// When the pretrained model is loaded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStrategy {
    /// Load at startup; failure stops the process
    Eager,
    /// Load on first request; failure fails that request and is retried later
    #[default]
    Lazy,
}

/// Pretrained model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Name reported by the health endpoint
    pub name: String,
    /// Where the ONNX artifact comes from
    #[serde(flatten)]
    pub source: ModelSource,
    /// Load at startup or on first use
    pub load: LoadStrategy,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_MODEL_NAME.to_string(),
            source: ModelSource::default(),
            load: LoadStrategy::default(),
        }
    }
}

/// Session persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Save classified images into per-session class folders
    pub persist: bool,
    /// Root directory for sessions and their archives
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            persist: true,
            output_dir: PathBuf::from("classified_images"),
        }
    }
}

/// Read and parse a TOML file into any deserializable config type
pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path)
        .map_err(|e| ClassifyError::Config(format!("Failed to read config {}: {e}", path.display())))?;

    toml::from_str(&content)
        .map_err(|e| ClassifyError::Config(format!("Failed to parse config {}: {e}", path.display())))
}
