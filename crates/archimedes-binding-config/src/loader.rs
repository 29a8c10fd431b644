//! Layered configuration loading.
//!
//! Layers apply in call order and each replaces what came before:
//! built-in defaults, then a TOML or JSON document, then
//! `PREFIX__SECTION__KEY` environment variables. Validation runs last.

use std::env;
use std::fs;
use std::path::Path;

use crate::{BindingConfig, ConfigError, LogFormat};

/// Document formats accepted for configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Toml,
    Json,
}

impl Format {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    fn parse(self, content: &str) -> Result<BindingConfig, ConfigError> {
        Ok(match self {
            Self::Toml => toml::from_str(content)?,
            Self::Json => serde_json::from_str(content)?,
        })
    }
}

/// Builds a [`BindingConfig`] from defaults, a document and the
/// environment.
///
/// # Example
///
/// ```no_run
/// use archimedes_binding_config::ConfigLoader;
///
/// # fn main() -> Result<(), archimedes_binding_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("binding.toml")?
///     .with_env_prefix("BINDING")
///     .load()?;
/// # let _ = config;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: BindingConfig,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// A loader holding the built-in defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the configuration with the contents of `path`.
    ///
    /// The extension selects the format: `.toml` or `.json`.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Format::from_name)
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))?;
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        self.config = format.parse(&content)?;
        tracing::debug!(path = %path.display(), "binding configuration file loaded");
        Ok(self)
    }

    /// Like [`with_file`](Self::with_file), but a missing file leaves the
    /// configuration unchanged.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            tracing::debug!(path = %path.as_ref().display(), "no binding configuration file");
            Ok(self)
        }
    }

    /// Replaces the configuration with an in-memory document.
    ///
    /// ```
    /// use archimedes_binding_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[defaults]\ndate_pattern = \"yyyy-MM-dd\"", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.defaults.date_pattern.as_deref(), Some("yyyy-MM-dd"));
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let format = Format::from_name(format)
            .ok_or_else(|| ConfigError::UnsupportedFormat(format.to_string()))?;
        self.config = format.parse(content)?;
        Ok(self)
    }

    /// Enables `PREFIX__SECTION__KEY` overrides, e.g.
    /// `BINDING__LIMITS__MAX_FILE_SIZE_BYTES=1048576`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Loads a `.env` file into the process environment when one is found.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), ".env file loaded");
        }
        self
    }

    /// Applies environment overrides and validates.
    pub fn load(mut self) -> Result<BindingConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let mut vars: Vec<(String, String)> =
                env::vars().filter(|(k, _)| k.starts_with(&prefix)).collect();
            vars.sort();
            for (key, value) in vars {
                self.apply_env_var(&key, &value, &prefix)?;
            }
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Returns the configuration without overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> BindingConfig {
        self.config
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(rest) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__")) else {
            return Ok(());
        };

        let parts: Vec<&str> = rest.split("__").collect();
        let defaults = &mut self.config.defaults;
        let limits = &mut self.config.limits;
        let logging = &mut self.config.logging;

        match parts.as_slice() {
            ["DEFAULTS", "DATE_PATTERN"] => defaults.date_pattern = non_empty(value),
            ["DEFAULTS", "DATE_TIME_PATTERN"] => defaults.date_time_pattern = non_empty(value),
            ["DEFAULTS", "TIME_PATTERN"] => defaults.time_pattern = non_empty(value),
            ["DEFAULTS", "NUMBER_PATTERN"] => defaults.number_pattern = non_empty(value),

            ["LIMITS", "MAX_COLLECTION_ELEMENTS"] => {
                limits.max_collection_elements = parse_number(key, value)?;
            }
            ["LIMITS", "MAX_FILE_SIZE_BYTES"] => {
                limits.max_file_size_bytes = match non_empty(value) {
                    Some(v) if !v.eq_ignore_ascii_case("none") => Some(parse_number(key, &v)?),
                    _ => None,
                };
            }
            ["LIMITS", "MAX_TEXT_PART_BYTES"] => {
                limits.max_text_part_bytes = parse_number(key, value)?;
            }

            ["LOGGING", "ENABLED"] => logging.enabled = parse_flag(key, value)?,
            ["LOGGING", "LEVEL"] => logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                logging.format = match value.to_ascii_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => return Err(ConfigError::env(key, "expected 'json' or 'pretty'")),
                };
            }
            ["LOGGING", "FILE_LINE_INFO"] => logging.file_line_info = parse_flag(key, value)?,

            _ => tracing::warn!(var = %key, "ignoring unknown binding configuration variable"),
        }

        Ok(())
    }
}

fn non_empty(value: &str) -> Option<String> {
    Some(value.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env(key, "expected a non-negative integer"))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::env(key, "expected a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader_with(vars: &[(&str, &str)]) -> Result<ConfigLoader, ConfigError> {
        let mut loader = ConfigLoader::new();
        for (key, value) in vars {
            loader.apply_env_var(key, value, "TEST")?;
        }
        Ok(loader)
    }

    #[test]
    fn test_defaults_load() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, BindingConfig::default());
    }

    #[test]
    fn test_toml_document() {
        let toml = r##"
            [defaults]
            date_pattern = "dd/MM/yyyy"
            number_pattern = "#,##0.##"

            [limits]
            max_collection_elements = 50
            max_file_size_bytes = 1048576

            [logging]
            level = "archimedes_binding=trace"
            format = "pretty"
        "##;

        let config = ConfigLoader::new()
            .with_string(toml, "TOML")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.defaults.date_pattern.as_deref(), Some("dd/MM/yyyy"));
        assert_eq!(config.limits.max_collection_elements, 50);
        assert_eq!(config.limits.max_file_size_bytes, Some(1_048_576));
        assert_eq!(config.limits.max_text_part_bytes, 64 * 1024);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.logging.enabled);
    }

    #[test]
    fn test_json_document() {
        let config = ConfigLoader::new()
            .with_string(r#"{"limits": {"max_text_part_bytes": 128}}"#, "json")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.limits.max_text_part_bytes, 128);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = ConfigLoader::new().with_string("[limits]\nmax_elements = 5", "toml");
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_unsupported_format() {
        let result = ConfigLoader::new().with_string("", "yaml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(ref f)) if f == "yaml"));
    }

    #[test]
    fn test_invalid_pattern_fails_load() {
        let result = ConfigLoader::new()
            .with_string("[defaults]\ntime_pattern = \"yyyy\"", "toml")
            .unwrap()
            .load();
        assert!(matches!(result, Err(ConfigError::InvalidValue { ref key, .. }) if key == "defaults.time_pattern"));
    }

    #[test]
    fn test_missing_files() {
        let result = ConfigLoader::new().with_file("/nonexistent/binding.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));

        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/binding.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config, BindingConfig::default());
    }

    #[test]
    fn test_parse_flag() {
        for on in ["true", "ON", "1", "Yes"] {
            assert!(parse_flag("K", on).unwrap());
        }
        for off in ["false", "off", "0", "NO"] {
            assert!(!parse_flag("K", off).unwrap());
        }
        assert!(parse_flag("K", "maybe").is_err());
        assert!(parse_flag("K", "").is_err());
    }

    // Overrides are applied through apply_env_var so tests never touch
    // the process environment.

    #[test]
    fn test_env_pattern_overrides() {
        let loader = loader_with(&[
            ("TEST__DEFAULTS__DATE_PATTERN", "yyyy-MM-dd"),
            ("TEST__DEFAULTS__NUMBER_PATTERN", ""),
        ])
        .unwrap();
        assert_eq!(loader.config.defaults.date_pattern.as_deref(), Some("yyyy-MM-dd"));
        assert_eq!(loader.config.defaults.number_pattern, None);
    }

    #[test]
    fn test_env_limit_overrides() {
        let loader = loader_with(&[("TEST__LIMITS__MAX_FILE_SIZE_BYTES", "2048")]).unwrap();
        assert_eq!(loader.config.limits.max_file_size_bytes, Some(2048));

        let loader = loader_with(&[
            ("TEST__LIMITS__MAX_FILE_SIZE_BYTES", "2048"),
            ("TEST__LIMITS__MAX_FILE_SIZE_BYTES", "none"),
        ])
        .unwrap();
        assert_eq!(loader.config.limits.max_file_size_bytes, None);

        let result = loader_with(&[("TEST__LIMITS__MAX_COLLECTION_ELEMENTS", "lots")]);
        assert!(matches!(result, Err(ConfigError::Env { .. })));
    }

    #[test]
    fn test_env_logging_overrides() {
        let loader = loader_with(&[
            ("TEST__LOGGING__FORMAT", "pretty"),
            ("TEST__LOGGING__ENABLED", "off"),
            ("TEST__LOGGING__LEVEL", "debug"),
        ])
        .unwrap();
        assert_eq!(loader.config.logging.format, LogFormat::Pretty);
        assert!(!loader.config.logging.enabled);
        assert_eq!(loader.config.logging.level, "debug");

        assert!(loader_with(&[("TEST__LOGGING__FORMAT", "xml")]).is_err());
    }

    #[test]
    fn test_unrelated_variables_ignored() {
        let loader = loader_with(&[("TESTING_HOME", "/tmp"), ("TEST__UNKNOWN__KEY", "x")]).unwrap();
        assert_eq!(loader.config, BindingConfig::default());
    }
}
