//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or applying binding configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required configuration file does not exist.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("cannot read configuration file {path}")]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file or string is neither TOML nor JSON.
    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    /// TOML syntax error or unknown key.
    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON syntax error or unknown key.
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// A key holds a value the engine cannot use.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Dotted key, e.g. `limits.max_text_part_bytes`.
        key: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An override variable could not be parsed.
    #[error("cannot parse environment variable {var}: {reason}")]
    Env {
        /// Variable name.
        var: String,
        /// Expected form.
        reason: String,
    },

    /// The logging subscriber could not be installed.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
}

impl ConfigError {
    pub(crate) fn invalid_value(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn env(var: &str, reason: &str) -> Self {
        Self::Env {
            var: var.to_string(),
            reason: reason.to_string(),
        }
    }
}
