//! # Telemetry
//!
//! Process-wide `tracing` subscriber setup.
//!
//! `RUST_LOG` wins over the configured filter when set.

use crate::infrastructure::config::LoggingConfig;
use tracing_subscriber::{EnvFilter, fmt};

/// Builds the filter from `RUST_LOG`, falling back to `config.filter`.
#[must_use]
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber.
///
/// Returns false if one was already installed.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = env_filter(config);
    let installed = if config.json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(true).try_init()
    };
    installed.is_ok()
}
