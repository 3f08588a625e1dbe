//! Configuration types and loading for dapline
//!
//! This crate provides:
//! - [`SessionConfig`] - timeouts, polling, cache sizing and connection retry policy
//! - [`LoggingConfig`] - log level and optional log file
//! - [`load_config`] / [`load_config_from_str`] - TOML loading with validation
//!
//! Every field has a default backed by [`constants`], so an empty file is a
//! valid configuration.
//!
//! ```toml
//! [session]
//! request_timeout_ms = 10000
//! stack_page_size = 20
//!
//! [session.trace]
//! io = true
//!
//! [logging]
//! level = "debug"
//! file = "/tmp/dapline.log"
//! ```

mod loader;
mod session;

pub mod constants;

pub use loader::{load_config, load_config_from_str, ConfigError};
pub use session::{SessionConfig, TraceConfig};

use constants::DEFAULT_LOG_LEVEL;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Write logs to this file (daily rotation) instead of stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            file: None,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        if VALID_LOG_LEVELS.contains(&self.level.to_ascii_lowercase().as_str()) {
            Vec::new()
        } else {
            vec![format!(
                "logging.level must be one of {}, got '{}'",
                VALID_LOG_LEVELS.join(", "),
                self.level
            )]
        }
    }
}
