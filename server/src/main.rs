//! CIFAR-10 Classification Server
//!
//! HTTP API that classifies uploaded images into the ten CIFAR-10 classes,
//! optionally stores them per predicted class and serves session archives.

mod error;
mod routes;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use cifar_classify::utils::{init_logging, LogLevel};
use cifar_classify::{AppConfig, LoadStrategy, NormalizationPreset};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::state::AppState;

/// CIFAR-10 Classification Server
#[derive(Parser, Debug)]
#[command(name = "cifar-classify-server")]
#[command(version)]
#[command(about = "HTTP API server for CIFAR-10 image classification")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "CIFAR_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, env = "CIFAR_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "CIFAR_PORT")]
    port: Option<u16>,

    /// Directory for classified images and session archives
    #[arg(long, env = "CIFAR_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Classify without saving images or creating sessions
    #[arg(long, env = "CIFAR_NO_PERSIST")]
    no_persist: bool,

    /// Local ONNX model file
    #[arg(long, env = "CIFAR_MODEL_PATH")]
    model_path: Option<PathBuf>,

    /// URL to download the model from when the local file is missing
    #[arg(long, env = "CIFAR_MODEL_URL")]
    model_url: Option<String>,

    /// Model name reported by /health
    #[arg(long, env = "CIFAR_MODEL_NAME")]
    model_name: Option<String>,

    /// Load the model at startup instead of on the first request
    #[arg(long, env = "CIFAR_EAGER")]
    eager: bool,

    /// Normalization preset: reference or population
    #[arg(long, env = "CIFAR_NORMALIZATION")]
    normalization: Option<NormalizationPreset>,

    /// Maximum request body size in bytes
    #[arg(long, env = "CIFAR_MAX_UPLOAD_BYTES")]
    max_upload_bytes: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CIFAR_LOG_LEVEL")]
    log_level: Option<LogLevel>,

    /// Per-target log directives, e.g. `cifar_classify=debug,tower_http=info`
    #[arg(long, env = "CIFAR_LOG_FILTER")]
    log_filter: Option<String>,
}

impl Cli {
    /// Layer command line and environment overrides over the file config
    fn into_config(self) -> anyhow::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_file(path)?,
            None => AppConfig::default(),
        };

        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(limit) = self.max_upload_bytes {
            config.server.max_upload_bytes = limit;
        }
        if let Some(output_dir) = self.output_dir {
            config.storage.output_dir = output_dir;
        }
        if self.no_persist {
            config.storage.persist = false;
        }
        if let Some(path) = self.model_path {
            config.model.source.path = path;
        }
        if let Some(url) = self.model_url {
            config.model.source.url = Some(url);
        }
        if let Some(name) = self.model_name {
            config.model.name = name;
        }
        if self.eager {
            config.model.load = LoadStrategy::Eager;
        }
        if let Some(preset) = self.normalization {
            config.normalization = preset;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(filter) = self.log_filter {
            config.logging.filter = Some(filter);
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_config()?;

    init_logging(&config.logging)?;

    info!("CIFAR-10 Classification Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Model:         {}", config.model.name);
    info!("  Model path:    {:?}", config.model.source.path);
    info!("  Load strategy: {:?}", config.model.load);
    info!("  Normalization: {:?}", config.normalization);
    info!("  Persist:       {}", config.storage.persist);
    info!("  Output dir:    {:?}", config.storage.output_dir);

    if !config.model.source.path.exists() && config.model.source.url.is_none() {
        warn!(
            "Model not found at {:?} and no download URL configured. \
            Classification requests will fail.",
            config.model.source.path
        );
    }

    let state = Arc::new(AppState::new(config));

    if state.config.storage.persist {
        state.store.ensure_root()?;
    }

    if state.config.model.load == LoadStrategy::Eager {
        state.model.get().await?;
    }

    let listener = bind(&state.config.server.host, state.config.server.port).await?;
    let app = routes::router(state);

    info!("Starting server on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Bind the listener; `host` may be a hostname or an IPv4/IPv6 literal
async fn bind(host: &str, port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind((host, port)).await
}
