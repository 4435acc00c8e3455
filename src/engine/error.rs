//! Error types for analysis passes and configuration loading

use std::path::PathBuf;
use thiserror::Error;

/// Reasons an analysis pass ends without touching the diagnostic store
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The shell or the analyser could not be started
    #[error("Failed to run PHPStan: {0}")]
    Spawn(#[from] std::io::Error),

    /// The analyser failed and printed no report
    #[error("PHPStan failed: {0}")]
    ToolFailed(String),

    /// The analyser exited successfully without printing a report
    #[error("PHPStan produced no output")]
    EmptyReport,

    /// The analyser printed something that is not a valid report
    #[error("Failed to parse PHPStan output: {0}")]
    MalformedReport(#[from] serde_json::Error),
}

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid settings: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid watch glob '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        source: globset::Error,
    },
}
