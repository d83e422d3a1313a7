//! # CIFAR-10 Batch Classification
//!
//! A Rust library that wraps a pretrained CIFAR-10 ResNet20 (exported to ONNX)
//! behind a batch classification pipeline.
//!
//! ## Modules
//!
//! - `labels`: the fixed table of 10 CIFAR-10 class names
//! - `inference`: preprocessing, the classifier adapter, model loading and batch orchestration
//! - `session`: per-batch folders of classified images and their zip archives
//! - `config`: service configuration loaded from TOML
//! - `utils`: logging and error types
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cifar_classify::inference::{classify_batch, ImageInput, OnnxClassifier, Preprocessor};
//!
//! let classifier = OnnxClassifier::from_bytes(&std::fs::read("cifar10_resnet20.onnx")?)?;
//! let inputs = vec![ImageInput::new("cat.jpg", std::fs::read("cat.jpg")?)];
//! let batch = classify_batch(&inputs, &classifier, Preprocessor::default(), None);
//! println!("{}", serde_json::to_string_pretty(&batch)?);
//! ```

pub mod config;
pub mod inference;
pub mod labels;
pub mod session;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::{AppConfig, LoadStrategy};
pub use inference::{
    classify_batch, BatchResult, ClassificationResult, Classifier, ImageInput, ModelHandle,
    NormalizationPreset, Preprocessor,
};
pub use labels::{label_of, CLASS_NAMES, NUM_CLASSES};
pub use session::{SessionId, SessionStore};
pub use utils::error::{ClassifyError, Result};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
