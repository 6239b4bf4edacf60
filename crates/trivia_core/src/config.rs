//! Gateway configuration.
//!
//! # Responsibility
//! - Load settings from TOML, then apply `TRIVIA_*` environment overrides.
//! - Validate settings before any backend is constructed.
//!
//! # Invariants
//! - A validated config has an `http(s)` functions URL and a positive
//!   search timeout.

use crate::logging::normalize_level;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "TRIVIA_";

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(toml::de::Error),
    InvalidValue { key: &'static str, message: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config: {err}"),
            Self::InvalidValue { key, message } => write!(f, "invalid `{key}`: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::InvalidValue { .. } => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    /// Absolute directory for rotating log files. `None` disables file logs.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Base URL of the hosted search functions.
    pub functions_url: String,
    pub database_path: PathBuf,
    pub blob_root: PathBuf,
    pub search_timeout_secs: u64,
    pub logging: LoggingConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            functions_url: "http://localhost:5001".to_string(),
            database_path: PathBuf::from("trivia.sqlite3"),
            blob_root: PathBuf::from("blobs"),
            search_timeout_secs: 30,
            logging: LoggingConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads a TOML file, applies process environment overrides and validates.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?.with_env_overrides(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus process environment overrides, validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::default().with_env_overrides(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `TRIVIA_*` variables on top of the current values.
    ///
    /// Unknown `TRIVIA_*` names are ignored.
    pub fn with_env_overrides<I>(mut self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(key) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match key {
                "FUNCTIONS_URL" => self.functions_url = value,
                "DATABASE_PATH" => self.database_path = PathBuf::from(value),
                "BLOB_ROOT" => self.blob_root = PathBuf::from(value),
                "SEARCH_TIMEOUT_SECS" => {
                    self.search_timeout_secs =
                        value
                            .trim()
                            .parse()
                            .map_err(|err| ConfigError::InvalidValue {
                                key: "search_timeout_secs",
                                message: format!("`{value}`: {err}"),
                            })?;
                }
                "LOG_LEVEL" => self.logging.level = value,
                "LOG_DIR" => self.logging.dir = Some(PathBuf::from(value)),
                _ => {}
            }
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.functions_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "functions_url",
                message: format!("`{url}` is not an http(s) URL"),
            });
        }
        if self.search_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "search_timeout_secs",
                message: "must be positive".to_string(),
            });
        }
        normalize_level(&self.logging.level).map_err(|message| ConfigError::InvalidValue {
            key: "logging.level",
            message,
        })?;
        Ok(())
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, GatewayConfig};
    use std::path::PathBuf;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn toml_values_override_defaults() {
        let config = GatewayConfig::from_toml_str(
            r#"
            functions_url = "https://fn.example.com"
            search_timeout_secs = 5

            [logging]
            level = "warn"
            "#,
        )
        .unwrap();

        assert_eq!(config.functions_url, "https://fn.example.com");
        assert_eq!(config.search_timeout_secs, 5);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.blob_root, PathBuf::from("blobs"));
        config.validate().unwrap();
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = GatewayConfig::from_toml_str("functions = \"x\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn env_overrides_apply_and_ignore_foreign_names() {
        let config = GatewayConfig::default()
            .with_env_overrides(vars(&[
                ("TRIVIA_FUNCTIONS_URL", "https://env.example.com"),
                ("TRIVIA_SEARCH_TIMEOUT_SECS", "7"),
                ("TRIVIA_LOG_DIR", "/var/log/trivia"),
                ("TRIVIA_UNKNOWN", "ignored"),
                ("HOME", "/root"),
            ]))
            .unwrap();

        assert_eq!(config.functions_url, "https://env.example.com");
        assert_eq!(config.search_timeout_secs, 7);
        assert_eq!(config.logging.dir, Some(PathBuf::from("/var/log/trivia")));
    }

    #[test]
    fn bad_timeout_override_is_reported() {
        let err = GatewayConfig::default()
            .with_env_overrides(vars(&[("TRIVIA_SEARCH_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("search_timeout_secs"));
    }

    #[test]
    fn validate_rejects_non_http_url_and_zero_timeout() {
        let mut config = GatewayConfig {
            functions_url: "ftp://fn".to_string(),
            ..GatewayConfig::default()
        };
        assert!(config.validate().is_err());

        config.functions_url = "http://fn".to_string();
        config.search_timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
