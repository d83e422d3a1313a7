//! Logging setup
//!
//! One global `tracing` subscriber per process, configured from the
//! `[logging]` table of the service config.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::utils::error::{ClassifyError, Result};

/// Subscriber settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Maximum level when no `filter` is given
    pub level: LogLevel,
    /// Per-target directives such as `cifar_classify=debug,tower_http=info`.
    /// Overrides `level`.
    pub filter: Option<String>,
    /// Print the module path of each event
    pub include_target: bool,
    /// Print the worker thread id of each event
    pub include_thread_ids: bool,
    /// Disable when logs go to a collector instead of a terminal
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            filter: None,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

/// Verbosity threshold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ClassifyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(ClassifyError::Config(format!("unknown log level '{}'", other))),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Install the global subscriber.
///
/// Fails on an invalid `filter` or when a subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let builder = FmtSubscriber::builder()
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact();

    let installed = match &config.filter {
        Some(directives) => {
            let filter = EnvFilter::try_new(directives).map_err(|e| {
                ClassifyError::Config(format!("invalid log filter '{}': {}", directives, e))
            })?;
            tracing::subscriber::set_global_default(builder.with_env_filter(filter).finish())
        }
        None => tracing::subscriber::set_global_default(
            builder.with_max_level(Level::from(config.level)).finish(),
        ),
    };

    installed.map_err(|e| ClassifyError::Config(format!("Failed to initialize logging: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!(" INFO ".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("Warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_level_maps_to_tracing() {
        assert_eq!(Level::from(LogLevel::Warn), Level::WARN);
        assert_eq!(LogLevel::Trace.to_string(), "trace");
    }

    #[test]
    fn test_logging_table_from_toml() {
        let config: LogConfig = toml::from_str(
            "level = \"warn\"\nfilter = \"cifar_classify=debug\"\nansi_colors = false",
        )
        .unwrap();
        assert_eq!(config.level, LogLevel::Warn);
        assert_eq!(config.filter.as_deref(), Some("cifar_classify=debug"));
        assert!(!config.ansi_colors);
        assert!(!config.include_target);
    }

    #[test]
    fn test_invalid_filter_is_config_error() {
        let config = LogConfig {
            filter: Some("cifar_classify=loudest".to_string()),
            ..LogConfig::default()
        };
        assert!(matches!(init_logging(&config), Err(ClassifyError::Config(_))));
    }
}
