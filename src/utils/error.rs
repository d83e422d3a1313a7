//! Error Handling Module
//!
//! Defines the error type shared by the classification pipeline and the
//! session store. Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for classification operations
#[derive(Error, Debug)]
pub enum ClassifyError {
    /// The request carried no image parts at all
    #[error("No images provided")]
    InputMissing,

    /// Bytes could not be decoded as an image
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Class index outside the label table
    #[error("Class index {0} is out of range (expected 0..{1})")]
    OutOfRange(usize, usize),

    /// The pretrained model could not be fetched or loaded
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// The loaded model failed while running
    #[error("Inference error: {0}")]
    Inference(String),

    /// No session directory exists for this id
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Uploaded filename cannot be used on disk
    #[error("Invalid filename: '{0}'")]
    InvalidFilename(String),

    /// Failed to write an image into a session folder
    #[error("Failed to save image to '{0}': {1}")]
    Save(PathBuf, String),

    /// Zip archive creation failed
    #[error("Archive error: {0}")]
    Archive(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for ClassifyError {
    fn from(err: image::ImageError) -> Self {
        ClassifyError::Decode(err.to_string())
    }
}

impl From<zip::result::ZipError> for ClassifyError {
    fn from(err: zip::result::ZipError) -> Self {
        ClassifyError::Archive(err.to_string())
    }
}

impl From<walkdir::Error> for ClassifyError {
    fn from(err: walkdir::Error) -> Self {
        ClassifyError::Archive(err.to_string())
    }
}

/// Convenience Result type for classification operations
pub type Result<T> = std::result::Result<T, ClassifyError>;

/// Extension trait for turning foreign errors into model failures with context
pub trait ResultExt<T> {
    /// Map the error into `ModelUnavailable` with a message prefix
    fn model_context(self, msg: &str) -> Result<T>;

    /// Map the error into `Inference` with a message prefix
    fn inference_context(self, msg: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn model_context(self, msg: &str) -> Result<T> {
        self.map_err(|e| ClassifyError::ModelUnavailable(format!("{}: {}", msg, e)))
    }

    fn inference_context(self, msg: &str) -> Result<T> {
        self.map_err(|e| ClassifyError::Inference(format!("{}: {}", msg, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClassifyError::SessionNotFound("20240101_120000".to_string());
        assert_eq!(format!("{}", err), "Session not found: 20240101_120000");
    }

    #[test]
    fn test_out_of_range_display() {
        let err = ClassifyError::OutOfRange(12, 10);
        assert!(err.to_string().contains("12"));
        assert!(err.to_string().contains("0..10"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ClassifyError = io_err.into();
        assert!(matches!(err, ClassifyError::Io(_)));
    }

    #[test]
    fn test_model_context() {
        let result: std::result::Result<(), String> = Err("connection refused".to_string());
        let err = result.model_context("Failed to fetch model").unwrap_err();
        assert!(matches!(err, ClassifyError::ModelUnavailable(_)));
        assert!(err.to_string().contains("connection refused"));
    }
}
