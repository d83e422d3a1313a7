//! One-off classification of a local image file

use std::path::Path;

use tracing::debug;

use crate::inference::classifier::Prediction;
use crate::inference::model::ModelHandle;
use crate::inference::preprocess::Preprocessor;
use crate::utils::error::Result;

/// Classify the image at `path`.
///
/// The file is decoded before the model is requested, so a bad input never
/// triggers a model download.
pub async fn classify_file(
    path: &Path,
    model: &ModelHandle,
    preprocessor: Preprocessor,
) -> Result<Prediction> {
    let bytes = tokio::fs::read(path).await?;
    let tensor = preprocessor.normalize(&bytes)?;

    let classifier = model.get().await?;
    let prediction = classifier.predict(&tensor)?;
    debug!(
        "{:?} -> class {} ({:.4})",
        path, prediction.class_index, prediction.confidence
    );
    Ok(prediction)
}

/// `Predicted: <label>`, optionally followed by the confidence percentage
pub fn describe_prediction(prediction: &Prediction, with_confidence: bool) -> Result<String> {
    let label = prediction.class_name()?;
    if with_confidence {
        Ok(format!(
            "Predicted: {} ({:.2}%)",
            label,
            prediction.confidence * 100.0
        ))
    } else {
        Ok(format!("Predicted: {}", label))
    }
}
