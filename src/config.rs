//! Configuration loading using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (default `config/sensor_link.toml`)
//! 2. Environment variables prefixed with `SENSOR_LINK_`, nested keys split on `__`
//!
//! Every field has a default (window 3, report every 10 polls, 500 ms cadence,
//! 300 ms read window), so a missing file yields a runnable configuration.
//!
//! # Example
//! ```no_run
//! use sensor_link::config::LinkConfig;
//!
//! let config = LinkConfig::load()?;
//! config.validate()?;
//! println!("Responder identity: {}", config.responder.identity);
//! # Ok::<(), sensor_link::error::LinkError>(())
//! ```
//!
//! Override a single value from the environment:
//!
//! ```bash
//! SENSOR_LINK_CONTROLLER__WINDOW=10 sensor-link simulate
//! ```

use crate::error::{LinkError, LinkResult};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/sensor_link.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Responder (sensor side) settings
    #[serde(default)]
    pub responder: ResponderConfig,
    /// Controller (polling side) settings
    #[serde(default)]
    pub controller: ControllerConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Responder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponderConfig {
    /// Identity reported in reply to `SendId` (0..=99)
    #[serde(default)]
    pub identity: i64,
    /// Sleep between iterations in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// How long one command read may wait, in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Seed for the synthetic signal noise; `None` draws from OS entropy
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Moving-average window width
    #[serde(default = "default_window")]
    pub window: usize,
    /// Report max/min once every this many iterations
    #[serde(default = "default_report_every")]
    pub report_every: u32,
    /// Sleep between iterations in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// How long one reply read may wait, in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Readings at or above this value are flagged; `None` disables the check
    #[serde(default = "default_value_limit")]
    pub value_limit: Option<i64>,
    /// Maximum filtered values kept for max/min (0 = unbounded)
    #[serde(default)]
    pub history_retention: usize,
}

// Default value functions
fn default_name() -> String {
    "sensor-link".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_interval_ms() -> u64 {
    500
}

fn default_read_timeout_ms() -> u64 {
    300
}

fn default_window() -> usize {
    crate::filter::DEFAULT_WIDTH
}

fn default_report_every() -> u32 {
    10
}

fn default_value_limit() -> Option<i64> {
    Some(99)
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            identity: 0,
            interval_ms: default_interval_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            seed: None,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            report_every: default_report_every(),
            interval_ms: default_interval_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            value_limit: default_value_limit(),
            history_retention: 0,
        }
    }
}

impl ResponderConfig {
    /// Inter-iteration sleep
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Command read window
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl ControllerConfig {
    /// Inter-iteration sleep
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Reply read window
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl LinkConfig {
    /// Load configuration from the default path and environment variables
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load() -> LinkResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> LinkResult<Self> {
        let config = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SENSOR_LINK_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> LinkResult<()> {
        crate::logging::parse_log_level(&self.application.log_level)
            .map_err(LinkError::Configuration)?;

        if !crate::responder::Identity::is_valid(self.responder.identity) {
            return Err(LinkError::InvalidIdentity(self.responder.identity));
        }

        if self.controller.window == 0 {
            return Err(LinkError::InvalidWindow(0));
        }

        if self.controller.report_every == 0 {
            return Err(LinkError::Configuration(
                "controller.report_every must be at least 1".to_string(),
            ));
        }

        if self.responder.read_timeout_ms == 0 || self.controller.read_timeout_ms == 0 {
            return Err(LinkError::Configuration(
                "read_timeout_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
