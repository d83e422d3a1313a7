//! Batch classification
//!
//! Runs every uploaded image through preprocessing and the classifier,
//! isolates per-image failures, optionally persists successes into a session
//! and aggregates per-class counts.

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::{debug, info, warn};

use crate::inference::classifier::Classifier;
use crate::inference::preprocess::{decode_rgb, Preprocessor};
use crate::session::{SessionId, SessionStore};
use crate::utils::error::Result;
use crate::utils::round2;

/// Class value reported for images that could not be classified
pub const ERROR_CLASS: &str = "error";

/// One uploaded image
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl ImageInput {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// What happened to a single image
#[derive(Debug, Clone, PartialEq)]
pub enum ImageOutcome {
    Classified {
        class_name: String,
        /// Percentage in [0, 100], rounded to two decimals
        confidence: f64,
        saved_path: Option<String>,
    },
    Failed {
        error: String,
    },
}

/// Per-image entry of a batch response.
///
/// Serializes to `{filename, class, confidence, saved_path?}` on success and
/// `{filename, class: "error", error}` on failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub filename: String,
    pub outcome: ImageOutcome,
}

impl ClassificationResult {
    pub fn class_name(&self) -> &str {
        match &self.outcome {
            ImageOutcome::Classified { class_name, .. } => class_name,
            ImageOutcome::Failed { .. } => ERROR_CLASS,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ImageOutcome::Failed { .. })
    }
}

impl Serialize for ClassificationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match &self.outcome {
            ImageOutcome::Classified {
                class_name,
                confidence,
                saved_path,
            } => {
                let len = if saved_path.is_some() { 4 } else { 3 };
                let mut map = serializer.serialize_map(Some(len))?;
                map.serialize_entry("filename", &self.filename)?;
                map.serialize_entry("class", class_name)?;
                map.serialize_entry("confidence", confidence)?;
                if let Some(path) = saved_path {
                    map.serialize_entry("saved_path", path)?;
                }
                map.end()
            }
            ImageOutcome::Failed { error } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("filename", &self.filename)?;
                map.serialize_entry("class", ERROR_CLASS)?;
                map.serialize_entry("error", error)?;
                map.end()
            }
        }
    }
}

/// Aggregated outcome of one batch
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct BatchResult {
    pub results: Vec<ClassificationResult>,
    pub class_counts: BTreeMap<String, usize>,
    pub total_images: usize,
}

impl BatchResult {
    /// Number of images that were classified successfully
    pub fn success_count(&self) -> usize {
        self.class_counts.values().sum()
    }

    /// Number of images that failed
    pub fn error_count(&self) -> usize {
        self.total_images - self.success_count()
    }
}

/// Where successfully classified images are persisted
#[derive(Debug, Clone, Copy)]
pub struct Persistence<'a> {
    pub store: &'a SessionStore,
    pub session: &'a SessionId,
}

/// Classifies batches of images with a fixed classifier and preprocessing
pub struct BatchClassifier<'a> {
    classifier: &'a dyn Classifier,
    preprocessor: Preprocessor,
    persistence: Option<Persistence<'a>>,
}

impl<'a> BatchClassifier<'a> {
    pub fn new(classifier: &'a dyn Classifier, preprocessor: Preprocessor) -> Self {
        Self {
            classifier,
            preprocessor,
            persistence: None,
        }
    }

    /// Save every classified image under `session/class/filename`
    pub fn with_persistence(mut self, persistence: Persistence<'a>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Classify all inputs in order.
    ///
    /// Inputs with an empty filename are skipped and not counted. A failure
    /// in any stage only affects its own image.
    pub fn classify_batch(&self, inputs: &[ImageInput]) -> BatchResult {
        let mut batch = BatchResult::default();

        for input in inputs {
            if input.filename.is_empty() {
                debug!("Skipping upload part without filename");
                continue;
            }

            let outcome = match self.classify_one(input) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Failed to classify {}: {}", input.filename, e);
                    ImageOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };

            if let ImageOutcome::Classified { class_name, .. } = &outcome {
                *batch.class_counts.entry(class_name.clone()).or_insert(0) += 1;
            }

            batch.results.push(ClassificationResult {
                filename: input.filename.clone(),
                outcome,
            });
        }

        batch.total_images = batch.results.len();
        info!(
            "Classified {} images ({} errors)",
            batch.total_images,
            batch.error_count()
        );
        batch
    }

    fn classify_one(&self, input: &ImageInput) -> Result<ImageOutcome> {
        let rgb = decode_rgb(&input.bytes)?;
        let tensor = self.preprocessor.tensor_from_rgb(&rgb);
        let prediction = self.classifier.predict(&tensor)?;
        let class_name = prediction.class_name()?;

        let saved_path = match &self.persistence {
            Some(p) => {
                let path = p.store.save(p.session, class_name, &input.filename, &rgb)?;
                Some(path.display().to_string())
            }
            None => None,
        };

        debug!(
            "{} -> {} ({:.2}%)",
            input.filename,
            class_name,
            prediction.confidence * 100.0
        );

        Ok(ImageOutcome::Classified {
            class_name: class_name.to_string(),
            confidence: round2(prediction.confidence as f64 * 100.0),
            saved_path,
        })
    }
}

/// Convenience wrapper around [`BatchClassifier`]
pub fn classify_batch(
    inputs: &[ImageInput],
    classifier: &dyn Classifier,
    preprocessor: Preprocessor,
    persistence: Option<Persistence<'_>>,
) -> BatchResult {
    let mut batch = BatchClassifier::new(classifier, preprocessor);
    if let Some(p) = persistence {
        batch = batch.with_persistence(p);
    }
    batch.classify_batch(inputs)
}
