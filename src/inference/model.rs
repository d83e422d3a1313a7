//! Pretrained model loading
//!
//! The model artifact lives outside the process: either a local ONNX file or
//! a URL that is downloaded into that file the first time it is needed.
//! [`ModelHandle`] owns the loaded classifier and guarantees the load runs at
//! most once, no matter how many requests race for it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::inference::classifier::{Classifier, OnnxClassifier};
use crate::utils::error::{ClassifyError, Result, ResultExt};

/// Name reported by the health endpoint
pub const DEFAULT_MODEL_NAME: &str = "cifar10_resnet20";

/// Where the model artifact comes from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSource {
    /// Local ONNX file; also the download cache when `url` is set
    pub path: PathBuf,

    /// Optional URL the model is fetched from if `path` does not exist
    pub url: Option<String>,

    /// Download timeout in seconds
    pub download_timeout_secs: u64,
}

impl Default for ModelSource {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models").join(format!("{}.onnx", DEFAULT_MODEL_NAME)),
            url: None,
            download_timeout_secs: 120,
        }
    }
}

/// Model bytes together with where they came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchedModel {
    /// Read from `ModelSource::path`
    Local(Vec<u8>),
    /// Downloaded from `ModelSource::url`, not yet cached
    Downloaded(Vec<u8>),
}

impl FetchedModel {
    pub fn bytes(&self) -> &[u8] {
        match self {
            FetchedModel::Local(bytes) | FetchedModel::Downloaded(bytes) => bytes,
        }
    }
}

impl ModelSource {
    /// Read the artifact, downloading it when only a URL is available.
    ///
    /// Downloads are not written to `path` here; see [`ModelSource::cache`].
    pub async fn fetch(&self) -> Result<FetchedModel> {
        let cached = tokio::fs::try_exists(&self.path)
            .await
            .model_context(&format!("Failed to check {}", self.path.display()))?;

        if cached {
            info!("Reading model from {:?}", self.path);
            let bytes = tokio::fs::read(&self.path)
                .await
                .model_context(&format!("Failed to read {}", self.path.display()))?;
            return Ok(FetchedModel::Local(bytes));
        }

        let url = self.url.as_deref().ok_or_else(|| {
            ClassifyError::ModelUnavailable(format!(
                "model file {} not found and no download URL configured",
                self.path.display()
            ))
        })?;

        info!("Downloading model from {}", url);
        Ok(FetchedModel::Downloaded(self.download(url).await?))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.download_timeout_secs))
            .build()
            .model_context("Failed to build HTTP client")?;

        let response = client
            .get(url)
            .send()
            .await
            .model_context("Model download failed")?;

        if !response.status().is_success() {
            return Err(ClassifyError::ModelUnavailable(format!(
                "model download returned HTTP {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .model_context("Failed to read model body")?;
        info!("Downloaded {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }

    /// Store a verified artifact at `path`.
    ///
    /// Written to a sibling temp file first, so `path` is either absent or
    /// complete.
    pub async fn cache(&self, bytes: &[u8]) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&parent).await?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string());
        let tmp_path = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

        let written = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp_path, &self.path).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        info!("Cached model at {:?}", self.path);
        Ok(())
    }
}

/// Produces a ready-to-use classifier
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn Classifier>>;
}

/// Loads an ONNX classifier from a [`ModelSource`]
#[derive(Debug, Clone)]
pub struct OnnxModelLoader {
    pub source: ModelSource,
}

impl OnnxModelLoader {
    pub fn new(source: ModelSource) -> Self {
        Self { source }
    }
}

#[async_trait]
impl ModelLoader for OnnxModelLoader {
    async fn load(&self) -> Result<Arc<dyn Classifier>> {
        let fetched = self.source.fetch().await?;

        // Graph optimization is CPU heavy.
        let (classifier, fetched) = tokio::task::spawn_blocking(move || {
            OnnxClassifier::from_bytes(fetched.bytes()).map(|c| (c, fetched))
        })
        .await
        .model_context("Model loading task failed")??;

        // Only a download that parsed is worth keeping.
        if let FetchedModel::Downloaded(bytes) = &fetched {
            if let Err(e) = self.source.cache(bytes).await {
                warn!("Failed to cache model at {:?}: {}", self.source.path, e);
            }
        }

        Ok(Arc::new(classifier))
    }
}

/// Application-scoped, lazily initialised classifier
pub struct ModelHandle {
    name: String,
    loader: Arc<dyn ModelLoader>,
    classifier: OnceCell<Arc<dyn Classifier>>,
}

impl ModelHandle {
    pub fn new(name: impl Into<String>, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            name: name.into(),
            loader,
            classifier: OnceCell::new(),
        }
    }

    /// Model name, as reported to clients
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a load has completed successfully
    pub fn is_loaded(&self) -> bool {
        self.classifier.initialized()
    }

    /// Return the classifier, loading it on first use.
    ///
    /// Concurrent callers wait on the same load. A failed load leaves the
    /// handle empty, so the next call tries again.
    pub async fn get(&self) -> Result<Arc<dyn Classifier>> {
        let classifier = self
            .classifier
            .get_or_try_init(|| async {
                info!("Loading pretrained model {}...", self.name);
                let start = Instant::now();
                match self.loader.load().await {
                    Ok(classifier) => {
                        info!(
                            "Model {} loaded in {:.2}s",
                            self.name,
                            start.elapsed().as_secs_f64()
                        );
                        Ok(classifier)
                    }
                    Err(e) => {
                        error!("Failed to load model {}: {}", self.name, e);
                        Err(e)
                    }
                }
            })
            .await?;

        Ok(Arc::clone(classifier))
    }
}
