//! Configuration and logging bootstrap for `archimedes-binding`.
//!
//! This crate loads the process-wide settings of the binding engine:
//! - Global date, time and number patterns
//! - Collection, upload and text-part limits
//! - Logging output
//!
//! Configuration is layered (defaults → file → env) and strict: unknown
//! keys are rejected and every pattern is checked against the type it
//! applies to before the engine sees it.
//!
//! # Example
//!
//! ```no_run
//! use archimedes_binding::Binder;
//! use archimedes_binding_config::{init_logging, ConfigLoader};
//!
//! # fn main() -> Result<(), archimedes_binding_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_dotenv()
//!     .with_optional_file("binding.toml")?
//!     .with_env_prefix("BINDING")
//!     .load()?;
//!
//! init_logging(&config.logging)?;
//! let binder = Binder::new().with_defaults(config.binding_defaults());
//! # let _ = binder;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [defaults]
//! date_pattern = "yyyy-MM-dd"
//! date_time_pattern = "yyyy-MM-dd'T'HH:mm:ss"
//! number_pattern = "#,##0.##"
//!
//! [limits]
//! max_collection_elements = 1000
//! max_file_size_bytes = 10485760
//! max_text_part_bytes = 65536
//!
//! [logging]
//! enabled = true
//! level = "info,archimedes_binding=debug"
//! format = "json"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Every key can be overridden as `PREFIX__SECTION__KEY`:
//!
//! - `BINDING__DEFAULTS__DATE_PATTERN=dd/MM/yyyy`
//! - `BINDING__LIMITS__MAX_FILE_SIZE_BYTES=none`
//! - `BINDING__LOGGING__FORMAT=pretty`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod logging;

pub use config::{BindingConfig, LimitsConfig, LogFormat, LoggingConfig, PatternDefaults};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use logging::{create_env_filter, init_logging};
