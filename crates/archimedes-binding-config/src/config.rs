//! Configuration types.
//!
//! [`BindingConfig`] is the root of the file format. Its sections map onto
//! the engine's [`BindingDefaults`] and the process logging setup.

use archimedes_binding::{
    check_pattern, BindingDefaults, ScalarType, DEFAULT_MAX_COLLECTION_ELEMENTS,
    DEFAULT_MAX_TEXT_PART_BYTES,
};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Complete binding configuration.
///
/// # Example
///
/// ```
/// use archimedes_binding_config::BindingConfig;
///
/// let config = BindingConfig::default();
/// assert_eq!(config.limits.max_collection_elements, 1000);
/// assert!(config.defaults.date_pattern.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct BindingConfig {
    /// Global conversion patterns.
    #[serde(default)]
    pub defaults: PatternDefaults,

    /// Per-request resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Logging bootstrap.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Patterns used by fields that declare none of their own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct PatternDefaults {
    /// Pattern for date fields, e.g. `yyyy-MM-dd`.
    #[serde(default)]
    pub date_pattern: Option<String>,

    /// Pattern for date-time fields.
    #[serde(default)]
    pub date_time_pattern: Option<String>,

    /// Pattern for time fields.
    #[serde(default)]
    pub time_pattern: Option<String>,

    /// Pattern for integer and float fields, e.g. `#,##0.00`.
    #[serde(default)]
    pub number_pattern: Option<String>,
}

/// Per-request resource limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Largest number of elements bound into one collection.
    #[serde(default = "default_max_collection_elements")]
    pub max_collection_elements: usize,

    /// Largest accepted upload; unlimited when unset.
    #[serde(default)]
    pub max_file_size_bytes: Option<u64>,

    /// Largest multipart text part read into a scalar field.
    #[serde(default = "default_max_text_part_bytes")]
    pub max_text_part_bytes: u64,
}

const fn default_max_collection_elements() -> usize {
    DEFAULT_MAX_COLLECTION_ELEMENTS
}

const fn default_max_text_part_bytes() -> u64 {
    DEFAULT_MAX_TEXT_PART_BYTES
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_collection_elements: DEFAULT_MAX_COLLECTION_ELEMENTS,
            max_file_size_bytes: None,
            max_text_part_bytes: DEFAULT_MAX_TEXT_PART_BYTES,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Whether to install a subscriber at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive, e.g. `info` or `archimedes_binding=trace`.
    #[serde(default = "default_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include source file and line in each event.
    #[serde(default)]
    pub file_line_info: bool,
}

const fn default_true() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_level(),
            format: LogFormat::Json,
            file_line_info: false,
        }
    }
}

impl LoggingConfig {
    /// Human-readable debug output for local work.
    #[must_use]
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            format: LogFormat::Pretty,
            file_line_info: true,
        }
    }
}

impl BindingConfig {
    /// Validate the configuration.
    ///
    /// Every global pattern must be usable by the type it applies to, and
    /// the limits must be non-zero.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let patterns = [
            ("defaults.date_pattern", ScalarType::Date, &self.defaults.date_pattern),
            (
                "defaults.date_time_pattern",
                ScalarType::DateTime,
                &self.defaults.date_time_pattern,
            ),
            ("defaults.time_pattern", ScalarType::Time, &self.defaults.time_pattern),
            // applies to integers too, which reject everything floats do plus `%`
            ("defaults.number_pattern", ScalarType::Integer, &self.defaults.number_pattern),
        ];
        for (key, scalar, pattern) in patterns {
            if let Some(pattern) = pattern {
                check_pattern(&scalar, pattern)
                    .map_err(|reason| ConfigError::invalid_value(key, reason))?;
            }
        }

        if self.limits.max_collection_elements == 0 {
            return Err(ConfigError::invalid_value(
                "limits.max_collection_elements",
                "must be greater than 0",
            ));
        }
        if self.limits.max_text_part_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "limits.max_text_part_bytes",
                "must be greater than 0",
            ));
        }
        if self.limits.max_file_size_bytes == Some(0) {
            return Err(ConfigError::invalid_value(
                "limits.max_file_size_bytes",
                "must be greater than 0",
            ));
        }

        Ok(())
    }

    /// The engine defaults described by this configuration.
    ///
    /// # Example
    ///
    /// ```
    /// use archimedes_binding_config::BindingConfig;
    ///
    /// let mut config = BindingConfig::default();
    /// config.defaults.date_pattern = Some("dd/MM/yyyy".to_string());
    ///
    /// let defaults = config.binding_defaults();
    /// assert_eq!(defaults.date_pattern.as_deref(), Some("dd/MM/yyyy"));
    /// ```
    #[must_use]
    pub fn binding_defaults(&self) -> BindingDefaults {
        let mut defaults = BindingDefaults::default();
        defaults.date_pattern = self.defaults.date_pattern.clone();
        defaults.date_time_pattern = self.defaults.date_time_pattern.clone();
        defaults.time_pattern = self.defaults.time_pattern.clone();
        defaults.number_pattern = self.defaults.number_pattern.clone();
        defaults.max_collection_elements = self.limits.max_collection_elements;
        defaults.max_file_size_bytes = self.limits.max_file_size_bytes;
        defaults.max_text_part_bytes = self.limits.max_text_part_bytes;
        defaults
    }
}
