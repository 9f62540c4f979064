//! Car configuration.
//!
//! One explicit struct carries everything a car process needs to know:
//! identity, floor range, timing, and the controller endpoint. All of it
//! is read-only after startup, so the components that receive it share it
//! freely without locking.
//!
//! The command line supplies the identity and a single base delay, as the
//! original operator interface does; an optional TOML file overrides the
//! derived timing fields and the controller address individually.

use crate::consts::DEFAULT_CONTROLLER_ADDR;
use crate::floor::FloorLabel;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors from configuration loading and validation.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at the given path.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parsing failed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// Semantic validation failed.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete runtime configuration of one car.
#[derive(Debug, Clone)]
pub struct CarConfig {
    /// Car name; also names the shared-memory segment and identifies the
    /// car to the controller.
    pub name: String,
    /// Lowest floor served.
    pub lowest: FloorLabel,
    /// Highest floor served.
    pub highest: FloorLabel,
    /// Simulated time to travel one floor.
    pub travel_delay: Duration,
    /// Simulated time for a door to open or close.
    pub door_delay: Duration,
    /// How long doors stay open on an automatic cycle before closing.
    pub open_dwell: Duration,
    /// Interval between `STATUS` reports to the controller.
    pub report_interval: Duration,
    /// Wait between reconnection attempts to the controller.
    pub reconnect_backoff: Duration,
    /// Controller endpoint, `host:port`.
    pub controller_addr: String,
}

impl CarConfig {
    /// Build a configuration from the operator-facing arguments.
    ///
    /// Every timing field is seeded from the single base delay; use
    /// [`apply_file`](Self::apply_file) to override fields individually.
    pub fn new(
        name: String,
        lowest: FloorLabel,
        highest: FloorLabel,
        delay_ms: u64,
    ) -> Result<Self, ConfigError> {
        let delay = Duration::from_millis(delay_ms);
        let config = Self {
            name,
            lowest,
            highest,
            travel_delay: delay,
            door_delay: delay,
            open_dwell: delay,
            report_interval: delay,
            reconnect_backoff: delay,
            controller_addr: DEFAULT_CONTROLLER_ADDR.to_string(),
        };
        config.validate(delay_ms)?;
        Ok(config)
    }

    fn validate(&self, delay_ms: u64) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("car name cannot be empty".to_string()));
        }
        if self.name.contains([' ', '/']) {
            return Err(ConfigError::Invalid(format!(
                "car name {:?} may not contain spaces or slashes",
                self.name
            )));
        }
        if delay_ms == 0 {
            return Err(ConfigError::Invalid(
                "delay must be a positive number of milliseconds".to_string(),
            ));
        }
        if self.lowest > self.highest {
            return Err(ConfigError::Invalid(format!(
                "lowest floor {} is above highest floor {}",
                self.lowest, self.highest
            )));
        }
        Ok(())
    }

    /// Apply per-field overrides from a loaded configuration file.
    pub fn apply_file(&mut self, file: &CarConfigFile) {
        let ms = Duration::from_millis;
        if let Some(v) = file.travel_delay_ms {
            self.travel_delay = ms(v);
        }
        if let Some(v) = file.door_delay_ms {
            self.door_delay = ms(v);
        }
        if let Some(v) = file.open_dwell_ms {
            self.open_dwell = ms(v);
        }
        if let Some(v) = file.report_interval_ms {
            self.report_interval = ms(v);
        }
        if let Some(v) = file.reconnect_backoff_ms {
            self.reconnect_backoff = ms(v);
        }
        if let Some(v) = &file.controller_addr {
            self.controller_addr = v.clone();
        }
    }
}

/// Optional TOML override file for a car.
///
/// ```toml
/// controller_addr = "10.0.0.5:3000"
/// travel_delay_ms = 2000
/// open_dwell_ms = 4000
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CarConfigFile {
    pub controller_addr: Option<String>,
    pub travel_delay_ms: Option<u64>,
    pub door_delay_ms: Option<u64>,
    pub open_dwell_ms: Option<u64>,
    pub report_interval_ms: Option<u64>,
    pub reconnect_backoff_ms: Option<u64>,
}

impl CarConfigFile {
    /// Load overrides from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.display().to_string())
            } else {
                ConfigError::Parse(e.to_string())
            }
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
