//! Classify a single local image and print the predicted CIFAR-10 label.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use cifar_classify::inference::{
    classify_file, describe_prediction, ModelSource, OnnxModelLoader, DEFAULT_MODEL_NAME,
};
use cifar_classify::utils::{init_logging, LogConfig, LogLevel};
use cifar_classify::{ModelHandle, NormalizationPreset, Preprocessor};

/// Classify one image with the pretrained CIFAR-10 ResNet20
#[derive(Parser, Debug)]
#[command(name = "cifar-classify")]
#[command(version)]
#[command(about = "Classify a single image into one of the CIFAR-10 classes", long_about = None)]
struct Cli {
    /// Image file to classify
    image: PathBuf,

    /// Local ONNX model file
    #[arg(long, env = "CIFAR_MODEL_PATH")]
    model_path: Option<PathBuf>,

    /// URL to download the model from when the local file is missing
    #[arg(long, env = "CIFAR_MODEL_URL")]
    model_url: Option<String>,

    /// Normalization preset: reference or population
    #[arg(long, default_value = "population")]
    normalization: NormalizationPreset,

    /// Also print the confidence of the prediction
    #[arg(long)]
    confidence: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn model_source(&self) -> ModelSource {
        let mut source = ModelSource::default();
        if let Some(path) = &self.model_path {
            source.path = path.clone();
        }
        if let Some(url) = &self.model_url {
            source.url = Some(url.clone());
        }
        source
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&LogConfig {
        level: if cli.verbose { LogLevel::Debug } else { LogLevel::Warn },
        ..LogConfig::default()
    })?;

    let loader = OnnxModelLoader::new(cli.model_source());
    let model = ModelHandle::new(DEFAULT_MODEL_NAME, Arc::new(loader));
    let preprocessor = Preprocessor::new(cli.normalization);

    info!("Classifying {:?} with {:?} normalization", cli.image, cli.normalization);
    let prediction = classify_file(&cli.image, &model, preprocessor).await?;
    println!("{}", describe_prediction(&prediction, cli.confidence)?);

    Ok(())
}
