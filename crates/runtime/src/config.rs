//! Configuration management for the model runtime
//!
//! Defaults, a TOML file, and environment variables are layered in that
//! order. Environment names match the deployment variables of the serving
//! process (`MODEL_CACHE_SIZE`, `CACHE_TTL`, `ADDITIONAL_INFO_FIELD`).

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

pub use crate::types::ConfigError;

/// Main runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub cache: CacheConfig,
    pub executor: ExecutorConfig,
    pub logging: LoggingConfig,
}

/// Model cache bounds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of resident executors
    pub max_entries: usize,
    /// Maximum residency of one executor
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

/// Invocation executor settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Endpoint metadata field whose object is merged into every response
    pub info_field: String,
    /// Run synchronous model calls on the blocking thread pool
    pub offload_predictions: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            other => Err(ConfigError::InvalidValue {
                key: "LOG_FORMAT".to_string(),
                reason: format!("Unknown log format '{}'", other),
            }),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 64,
            ttl: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Both bounds must be non-zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::InvalidValue {
                key: "cache.max_entries".to_string(),
                reason: "Cache must hold at least one entry".to_string(),
            });
        }

        if self.ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "cache.ttl".to_string(),
                reason: "TTL must be > 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            info_field: "additional".to_string(),
            offload_predictions: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables and defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Apply environment variables on top of an existing configuration
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(size) = env::var("MODEL_CACHE_SIZE") {
            self.cache.max_entries = size.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "MODEL_CACHE_SIZE".to_string(),
                reason: "Invalid entry count".to_string(),
            })?;
        }

        if let Ok(ttl) = env::var("CACHE_TTL") {
            let seconds: u64 = ttl.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "CACHE_TTL".to_string(),
                reason: "Invalid number of seconds".to_string(),
            })?;
            self.cache.ttl = Duration::from_secs(seconds);
        }

        if let Ok(field) = env::var("ADDITIONAL_INFO_FIELD") {
            self.executor.info_field = field;
        }

        if let Ok(level) = env::var("LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = env::var("LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }

        Ok(self)
    }

    /// Load configuration from file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            message: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.validate()?;

        if self.executor.info_field.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "executor.info_field".to_string(),
                reason: "Field name cannot be empty".to_string(),
            });
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                reason: format!("Must be one of: {}", valid_levels.join(", ")),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.cache.max_entries, 64);
        assert_eq!(config.cache.ttl, Duration::from_secs(60));
        assert_eq!(config.executor.info_field, "additional");
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        env::set_var("MODEL_CACHE_SIZE", "8");
        env::set_var("CACHE_TTL", "300");
        env::set_var("ADDITIONAL_INFO_FIELD", "extra");
        env::set_var("LOG_FORMAT", "json");

        let config = RuntimeConfig::from_env().unwrap();
        assert_eq!(config.cache.max_entries, 8);
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert_eq!(config.executor.info_field, "extra");
        assert_eq!(config.logging.format, LogFormat::Json);

        // Cleanup
        env::remove_var("MODEL_CACHE_SIZE");
        env::remove_var("CACHE_TTL");
        env::remove_var("ADDITIONAL_INFO_FIELD");
        env::remove_var("LOG_FORMAT");
    }

    #[test]
    #[serial]
    fn test_config_from_env_invalid_size() {
        env::set_var("MODEL_CACHE_SIZE", "lots");

        let result = RuntimeConfig::from_env();
        assert!(result.is_err());
        if let Err(ConfigError::InvalidValue { key, reason }) = result {
            assert_eq!(key, "MODEL_CACHE_SIZE");
            assert!(reason.contains("Invalid entry count"));
        }

        env::remove_var("MODEL_CACHE_SIZE");
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[cache]
max_entries = 2
ttl = "5m"

[logging]
level = "debug"
format = "compact"
"#
        )
        .unwrap();

        let config = RuntimeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.cache.max_entries, 2);
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert_eq!(config.executor, ExecutorConfig::default());
    }

    #[test]
    fn test_config_from_missing_file() {
        assert!(matches!(
            RuntimeConfig::from_file("/nonexistent/modelrt.toml"),
            Err(ConfigError::IoError { .. })
        ));
    }

    #[test]
    fn test_invalid_values() {
        let mut config = RuntimeConfig::default();
        config.cache.max_entries = 0;
        assert!(config.validate().is_err());

        let mut config = RuntimeConfig::default();
        config.cache.ttl = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = RuntimeConfig::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        let mut config = RuntimeConfig::default();
        config.executor.info_field = " ".to_string();
        assert!(config.validate().is_err());
    }
}
