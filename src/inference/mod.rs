//! Inference module: preprocessing, the classifier adapter and batch orchestration
//!
//! Data flows one way through this module:
//!
//! ```text
//! bytes -> preprocess::Preprocessor -> NormalizedTensor
//!       -> classifier::Classifier::predict -> Prediction
//!       -> batch::BatchClassifier (aggregation, optional persistence)
//! ```
//!
//! The network itself is loaded through [`model::ModelHandle`], which owns
//! the classifier for the lifetime of the application. [`single`] runs the
//! same path for one local file, outside any batch.

pub mod batch;
pub mod classifier;
pub mod model;
pub mod preprocess;
pub mod single;

// Re-export main types for convenience
pub use batch::{
    classify_batch, BatchClassifier, BatchResult, ClassificationResult, ImageInput, ImageOutcome,
    Persistence, ERROR_CLASS,
};
pub use classifier::{softmax, Classifier, OnnxClassifier, Prediction};
pub use model::{
    FetchedModel, ModelHandle, ModelLoader, ModelSource, OnnxModelLoader, DEFAULT_MODEL_NAME,
};
pub use preprocess::{NormalizationPreset, NormalizedTensor, Preprocessor};
pub use single::{classify_file, describe_prediction};

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    use super::classifier::{Classifier, Prediction};
    use super::model::ModelLoader;
    use super::preprocess::NormalizedTensor;
    use crate::labels::NUM_CLASSES;
    use crate::utils::error::{ClassifyError, Result};

    /// Always predicts the same class, or always fails
    pub struct FixedClassifier {
        outcome: std::result::Result<(usize, f32), String>,
    }

    impl FixedClassifier {
        pub fn new(class_index: usize, confidence: f32) -> Self {
            Self {
                outcome: Ok((class_index, confidence)),
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                outcome: Err(message.to_string()),
            }
        }
    }

    impl Classifier for FixedClassifier {
        fn predict(&self, _tensor: &NormalizedTensor) -> Result<Prediction> {
            match &self.outcome {
                Ok((class_index, confidence)) => Ok(Prediction {
                    class_index: *class_index,
                    confidence: *confidence,
                    probabilities: vec![0.0; NUM_CLASSES],
                }),
                Err(message) => Err(ClassifyError::Inference(message.clone())),
            }
        }
    }

    /// Hands out a [`FixedClassifier`] and counts how often it was asked to
    pub struct FixedLoader {
        class_index: usize,
        confidence: f32,
        loads: Arc<AtomicUsize>,
    }

    impl FixedLoader {
        pub fn new(class_index: usize, confidence: f32) -> Self {
            Self {
                class_index,
                confidence,
                loads: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn loads(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.loads)
        }
    }

    #[async_trait]
    impl ModelLoader for FixedLoader {
        async fn load(&self) -> Result<Arc<dyn Classifier>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FixedClassifier::new(self.class_index, self.confidence)))
        }
    }

    /// Dark images are airplanes, bright images are trucks
    pub struct MeanBrightnessClassifier;

    impl Classifier for MeanBrightnessClassifier {
        fn predict(&self, tensor: &NormalizedTensor) -> Result<Prediction> {
            let values = tensor.as_slice();
            let mean = values.iter().sum::<f32>() / values.len() as f32;
            let class_index = if mean > 0.0 { 9 } else { 0 };
            Ok(Prediction {
                class_index,
                confidence: 1.0,
                probabilities: vec![0.0; NUM_CLASSES],
            })
        }
    }

    /// Encode a solid-color PNG
    pub fn png_bytes(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb(rgb));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }
}
