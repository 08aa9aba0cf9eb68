//! # Router Configuration
//!
//! Typed settings for the engine, loaded from an optional file and
//! `ROUTER__*` environment variables (double underscore separates
//! sections), e.g. `ROUTER__FALLBACK__ENABLED=false`.
//!
//! Every section has defaults, so an empty environment yields a runnable
//! configuration apart from the database URL.
//!
//! # Examples
//!
//! ```ignore
//! let config = RouterConfig::load(Some("router.toml"))?;
//! config.validate()?;
//! ```

use crate::application::error::ApplicationError;
use crate::application::services::DEFAULT_FALLBACK_TIMEOUT_MS;
use crate::domain::entities::DEFAULT_STATS_WINDOW_HOURS;
use crate::infrastructure::callbacks::DEFAULT_TIMESTAMP_TOLERANCE_SECS;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Prefix of environment variables read by [`RouterConfig::load`].
pub const ENV_PREFIX: &str = "ROUTER";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A value is out of range.
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// Dotted field path.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

impl From<ConfigError> for ApplicationError {
    fn from(err: ConfigError) -> Self {
        ApplicationError::configuration(err.to_string())
    }
}

/// Assignment tick settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    /// Tick interval in milliseconds.
    pub tick_interval_ms: u64,
    /// Expiry sweep interval in milliseconds.
    pub expiry_interval_ms: u64,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            expiry_interval_ms: 5_000,
        }
    }
}

impl AssignmentConfig {
    /// Tick interval.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Expiry sweep interval.
    #[must_use]
    pub fn expiry_interval(&self) -> Duration {
        Duration::from_millis(self.expiry_interval_ms)
    }
}

/// Partner fallback settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Whether unplaced operations go to aggregator partners.
    pub enabled: bool,
    /// Timeout for partners without their own, in milliseconds.
    pub default_timeout_ms: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_timeout_ms: DEFAULT_FALLBACK_TIMEOUT_MS,
        }
    }
}

impl FallbackConfig {
    /// Default partner timeout.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

/// Partner ranking settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Re-ranking interval in seconds.
    pub interval_secs: u64,
    /// Statistics window in hours.
    pub window_hours: u32,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            window_hours: DEFAULT_STATS_WINDOW_HOURS,
        }
    }
}

impl RankingConfig {
    /// Re-ranking interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Callback verification settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbacksConfig {
    /// Accepted distance between callback timestamp and receipt.
    pub timestamp_tolerance_secs: u64,
}

impl Default for CallbacksConfig {
    fn default() -> Self {
        Self {
            timestamp_tolerance_secs: DEFAULT_TIMESTAMP_TOLERANCE_SECS,
        }
    }
}

/// PostgreSQL settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL.
    pub url: String,
    /// Pool size.
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub filter: String,
    /// JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,deal_router=debug".into(),
            json: false,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Assignment tick.
    pub assignment: AssignmentConfig,
    /// Partner fallback.
    pub fallback: FallbackConfig,
    /// Partner ranking.
    pub ranking: RankingConfig,
    /// Partner callbacks.
    pub callbacks: CallbacksConfig,
    /// Database.
    pub database: DatabaseConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

impl RouterConfig {
    /// Loads configuration from `path` (optional) and the environment.
    ///
    /// Environment variables override file values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Load` if a source is malformed.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Rejects zero intervals, windows and pool sizes.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(bool, &'static str); 6] = [
            (self.assignment.tick_interval_ms > 0, "assignment.tick_interval_ms"),
            (self.assignment.expiry_interval_ms > 0, "assignment.expiry_interval_ms"),
            (self.fallback.default_timeout_ms > 0, "fallback.default_timeout_ms"),
            (self.ranking.interval_secs > 0, "ranking.interval_secs"),
            (self.ranking.window_hours > 0, "ranking.window_hours"),
            (self.database.max_connections > 0, "database.max_connections"),
        ];
        match checks.iter().find(|(ok, _)| !*ok) {
            Some(&(_, field)) => Err(ConfigError::InvalidValue {
                field,
                reason: "must be greater than zero",
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RouterConfig::default();
        config.validate().unwrap();
        assert_eq!(config.assignment.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.callbacks.timestamp_tolerance_secs, 120);
        assert_eq!(config.ranking.window_hours, 24);
        assert!(config.fallback.enabled);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut config = RouterConfig::default();
        config.ranking.window_hours = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "ranking.window_hours",
                ..
            }
        ));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = RouterConfig::load(Some("/nonexistent/router")).unwrap();
        assert_eq!(config.assignment, AssignmentConfig::default());
    }

    #[test]
    fn partial_sections_deserialize() {
        let config: RouterConfig =
            serde_json::from_str(r#"{"fallback":{"enabled":false}}"#).unwrap();
        assert!(!config.fallback.enabled);
        assert_eq!(config.fallback.default_timeout_ms, DEFAULT_FALLBACK_TIMEOUT_MS);
        assert_eq!(config.logging, LoggingConfig::default());
    }
}
