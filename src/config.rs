//! Configuration System using Figment
//!
//! This module provides strongly-typed configuration loading for the scope controller.
//! Configuration is loaded from:
//! 1. a TOML file (base configuration, optional)
//! 2. Environment variables (prefixed with `SCOPE_`, nested keys split on `__`)
//!
//! # Example
//! ```no_run
//! use scope_daq::config::ScopeConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ScopeConfig::load_from("config/scope.toml")?;
//! println!("Resource: {:?}", config.instrument.resource);
//! # Ok(())
//! # }
//! ```
//!
//! ```toml
//! [instrument]
//! resource = "TCPIP0::192.168.0.17::5025::SOCKET"
//! timeout = "5s"
//!
//! [capture]
//! points = 10240
//!
//! [logging]
//! level = "debug"
//! ```

use crate::error::{Result, ScopeError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Which instrument to talk to, and how
    #[serde(default)]
    pub instrument: InstrumentConfig,
    /// Waveform capture defaults
    #[serde(default)]
    pub capture: CaptureConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Instrument connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// VISA-style resource identifier; selection prompts among `candidates` when absent
    #[serde(default)]
    pub resource: Option<String>,
    /// Resources offered for interactive selection
    #[serde(default)]
    pub candidates: Vec<String>,
    /// Bounded wait applied to every read and write
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Use the simulated oscilloscope instead of real hardware
    #[serde(default)]
    pub mock: bool,
    /// Log every transmitted command and result at info level
    #[serde(default)]
    pub verbose: bool,
}

/// Waveform capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Points requested per capture
    #[serde(default = "default_points")]
    pub points: u32,
    /// Pin raw/byte/channel1 capture settings when the controller is created
    #[serde(default = "default_true")]
    pub default_setup: bool,
    /// Attempts allowed when selecting a resource interactively
    #[serde(default = "default_attempts")]
    pub max_selection_attempts: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_level")]
    pub level: String,
    /// Output format (pretty, compact, json)
    #[serde(default = "default_format")]
    pub format: String,
}

// Default value functions
fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_points() -> u32 {
    10240
}

fn default_true() -> bool {
    true
}

fn default_attempts() -> u32 {
    3
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            resource: None,
            candidates: Vec::new(),
            timeout: default_timeout(),
            mock: false,
            verbose: false,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            points: default_points(),
            default_setup: true,
            max_selection_attempts: default_attempts(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

impl ScopeConfig {
    /// Figment seeded with defaults and environment overrides, without a file.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(ScopeConfig::default()))
            .merge(Env::prefixed("SCOPE_").split("__"))
    }

    /// Load configuration from defaults and environment variables only.
    pub fn load() -> Result<Self> {
        let config: Self = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then environment variables
    ///
    /// Environment variables override the file.
    /// Example: `SCOPE_INSTRUMENT__RESOURCE=TCPIP0::10.0.0.2::INSTR`
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = Figment::from(Serialized::defaults(ScopeConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SCOPE_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ScopeError::Configuration(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(ScopeError::Configuration(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            )));
        }

        if self.capture.points == 0 {
            return Err(ScopeError::Configuration(
                "capture.points must be greater than 0".into(),
            ));
        }

        if self.capture.max_selection_attempts == 0 {
            return Err(ScopeError::Configuration(
                "capture.max_selection_attempts must be greater than 0".into(),
            ));
        }

        if self.instrument.timeout.is_zero() {
            return Err(ScopeError::Configuration(
                "instrument.timeout must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}
