//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
///
/// None of these stops the server: the loader logs a warning and falls back
/// to defaults for whatever could not be read.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Explicitly requested config file does not exist.
    #[error("config file not found: {path}")]
    ConfigFileNotFound { path: PathBuf },

    #[error("config file is empty")]
    EmptyConfigFile,

    /// `${VAR}` used without a default and `VAR` is not set.
    #[error("environment variable '{var}' not set")]
    MissingEnvVar { var: String },

    #[error("invalid listen URL '{url}': {message}")]
    InvalidListenUrl { url: String, message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Wrapped errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("YAML parse error: {0}")]
    ParseError(#[from] serde_saphyr::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
