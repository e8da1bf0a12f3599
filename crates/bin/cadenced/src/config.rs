//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `cadence.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::time::Duration;

use cadence_app::engine::EngineConfig;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine settings.
    pub engine: EngineSection,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Engine tuning.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Maximum number of schedules held at once.
    pub schedule_limit: usize,
    /// Condition check timeout in seconds.
    pub condition_timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from `cadence.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if
    /// the resulting values are invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("cadence.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CADENCE_SCHEDULE_LIMIT")
            && let Ok(limit) = val.parse()
        {
            self.engine.schedule_limit = limit;
        }
        if let Ok(val) = std::env::var("CADENCE_CONDITION_TIMEOUT_SECS")
            && let Ok(secs) = val.parse()
        {
            self.engine.condition_timeout_secs = secs;
        }
        if let Ok(val) = std::env::var("CADENCE_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.engine_config()
            .validate()
            .map_err(|err| ConfigError::Validation(err.to_string()))
    }

    /// Engine configuration derived from this file.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            schedule_limit: self.engine.schedule_limit,
            condition_timeout: Duration::from_secs(self.engine.condition_timeout_secs),
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        let defaults = EngineConfig::default();
        Self {
            schedule_limit: defaults.schedule_limit,
            condition_timeout_secs: defaults.condition_timeout.as_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "cadenced=info,cadence=info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
