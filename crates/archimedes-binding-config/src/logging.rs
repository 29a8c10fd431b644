//! Logging bootstrap.
//!
//! The engine only emits `tracing` events. Processes that embed it call
//! [`init_logging`] once at startup to install a subscriber.
//!
//! # Example
//!
//! ```rust,ignore
//! use archimedes_binding_config::{init_logging, LoggingConfig};
//!
//! init_logging(&LoggingConfig::development())?;
//! tracing::info!("binding engine ready");
//! ```

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::{ConfigError, LogFormat, LoggingConfig};

/// Installs the global `tracing` subscriber described by `config`.
///
/// Does nothing when logging is disabled.
///
/// # Errors
///
/// Returns `ConfigError::LoggingInit` if the level directive is invalid or
/// a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ConfigError> {
    if !config.enabled {
        return Ok(());
    }

    let filter = create_env_filter(&config.level)?;

    match config.format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_file(config.file_line_info)
                .with_line_number(config.file_line_info)
                .with_target(true)
                .with_filter(filter);

            tracing_subscriber::registry()
                .with(fmt_layer)
                .try_init()
                .map_err(|e| ConfigError::LoggingInit(e.to_string()))?;
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_file(config.file_line_info)
                .with_line_number(config.file_line_info)
                .with_target(true)
                .with_filter(filter);

            tracing_subscriber::registry()
                .with(fmt_layer)
                .try_init()
                .map_err(|e| ConfigError::LoggingInit(e.to_string()))?;
        }
    }

    Ok(())
}

/// Creates an env filter from a directive string such as
/// `"info,archimedes_binding=trace"`.
///
/// # Errors
///
/// Returns `ConfigError::LoggingInit` if the directive is invalid.
pub fn create_env_filter(filter: &str) -> Result<EnvFilter, ConfigError> {
    EnvFilter::try_new(filter)
        .map_err(|e| ConfigError::LoggingInit(format!("invalid log level: {e}")))
}
