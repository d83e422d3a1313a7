//! Application state for the classification server
//!
//! Holds the configuration, the lazily loaded model and the session store.

use std::sync::Arc;
use std::time::Instant;

use cifar_classify::inference::{ModelHandle, ModelLoader, OnnxModelLoader, Preprocessor};
use cifar_classify::{AppConfig, SessionStore};

/// Shared application state
pub struct AppState {
    /// Service configuration
    pub config: AppConfig,
    /// Pretrained classifier, loaded at most once
    pub model: ModelHandle,
    /// Where classified images and archives are written
    pub store: SessionStore,
    /// Preprocessing with the configured normalization preset
    pub preprocessor: Preprocessor,
    /// Server start time
    pub started_at: Instant,
}

impl AppState {
    /// State backed by the ONNX model described in the configuration
    pub fn new(config: AppConfig) -> Self {
        let loader = Arc::new(OnnxModelLoader::new(config.model.source.clone()));
        Self::with_loader(config, loader)
    }

    /// State with a custom model loader
    pub fn with_loader(config: AppConfig, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            model: ModelHandle::new(config.model.name.clone(), loader),
            store: SessionStore::new(config.storage.output_dir.clone()),
            preprocessor: Preprocessor::new(config.normalization),
            started_at: Instant::now(),
            config,
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;
