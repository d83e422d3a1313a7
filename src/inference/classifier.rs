//! Classifier adapter
//!
//! The pretrained network is an opaque dependency: everything downstream only
//! sees the [`Classifier`] trait, so tests substitute a stub and the service
//! wires in [`OnnxClassifier`].

use std::io::Cursor;

use serde::{Deserialize, Serialize};
use tract_onnx::prelude::*;
use tracing::debug;

use crate::inference::preprocess::{NormalizedTensor, INPUT_CHANNELS, INPUT_SIZE};
use crate::labels::{label_of, NUM_CLASSES};
use crate::utils::error::{ClassifyError, Result, ResultExt};

/// Output of a single forward pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted class index (argmax)
    pub class_index: usize,

    /// Softmax probability of the predicted class, in [0, 1]
    pub confidence: f32,

    /// Full probability distribution over all classes
    pub probabilities: Vec<f32>,
}

impl Prediction {
    /// Build a prediction from raw logits
    pub fn from_logits(logits: &[f32]) -> Result<Self> {
        if logits.is_empty() {
            return Err(ClassifyError::Inference("model returned no logits".to_string()));
        }

        let probabilities = softmax(logits);
        let (class_index, &confidence) = probabilities
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .ok_or_else(|| ClassifyError::Inference("empty probability vector".to_string()))?;

        Ok(Self {
            class_index,
            confidence,
            probabilities,
        })
    }

    /// Human readable class name of the prediction
    pub fn class_name(&self) -> Result<&'static str> {
        label_of(self.class_index)
    }
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Anything that can map a normalized tensor to a class prediction
pub trait Classifier: Send + Sync {
    fn predict(&self, tensor: &NormalizedTensor) -> Result<Prediction>;
}

type Plan = TypedRunnableModel<TypedModel>;

/// CIFAR-10 classifier backed by an ONNX graph executed with tract
pub struct OnnxClassifier {
    plan: Plan,
}

impl std::fmt::Debug for OnnxClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxClassifier").finish_non_exhaustive()
    }
}

impl OnnxClassifier {
    /// Parse and optimize an ONNX model with a fixed `[1, 3, 32, 32]` input
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let plan = tract_onnx::onnx()
            .model_for_read(&mut Cursor::new(bytes))
            .model_context("Failed to parse ONNX model")?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, INPUT_CHANNELS, INPUT_SIZE as usize, INPUT_SIZE as usize),
                ),
            )
            .model_context("Failed to set model input shape")?
            .into_optimized()
            .model_context("Failed to optimize model")?
            .into_runnable()
            .model_context("Failed to build model plan")?;

        debug!("ONNX classifier ready ({} bytes)", bytes.len());
        Ok(Self { plan })
    }
}

impl Classifier for OnnxClassifier {
    fn predict(&self, tensor: &NormalizedTensor) -> Result<Prediction> {
        let (c, h, w) = tensor.shape();
        let input: Tensor =
            tract_ndarray::Array4::from_shape_vec((1, c, h, w), tensor.as_slice().to_vec())
                .inference_context("Failed to shape input tensor")?
                .into();

        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .inference_context("Forward pass failed")?;

        let output = outputs
            .first()
            .ok_or_else(|| ClassifyError::Inference("model produced no outputs".to_string()))?;
        let view = output
            .to_array_view::<f32>()
            .inference_context("Unexpected output type")?;
        let logits: Vec<f32> = view.iter().copied().collect();

        if logits.len() != NUM_CLASSES {
            return Err(ClassifyError::Inference(format!(
                "expected {} logits, got {}",
                NUM_CLASSES,
                logits.len()
            )));
        }

        Prediction::from_logits(&logits)
    }
}
