//! Configuration management for the exporter
//!
//! Settings come from an optional YAML file and are then overridden by
//! command line flags (see [`crate::cli`]).

use crate::error::{PowermeterError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Meter identity and serial device
    pub meter: MeterConfig,

    /// Web server binding configuration
    pub web: WebConfig,

    /// When and how often the meter is read
    pub acquisition: AcquisitionConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Meter and serial device settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Name of the monitored meter, exported as the `meter_name` label
    pub name: String,

    /// Serial device of the optical read head
    pub device: String,

    /// Longest silence tolerated between bytes, in milliseconds
    pub read_timeout_ms: u64,

    /// Upper bound for one whole capture, counted from port open. Must cover
    /// the meter's push interval plus the telegram itself.
    pub frame_timeout_ms: u64,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

/// Trigger for acquisition cycles. Exactly one is active per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMode {
    /// Fixed-interval background task
    #[default]
    Background,
    /// One cycle per `GET /`
    OnRequest,
}

/// Acquisition scheduling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub mode: AcquisitionMode,

    /// Seconds between background cycles
    pub interval_seconds: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Log file path or directory; empty disables file logging
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            device: "/dev/ttyUSB0".to_string(),
            read_timeout_ms: 2000,
            frame_timeout_ms: 10_000,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8010,
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            mode: AcquisitionMode::Background,
            interval_seconds: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: String::new(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Config {
    /// Default search locations, first hit wins
    pub const DEFAULT_PATHS: [&'static str; 2] = [
        "powermeter_exporter.yaml",
        "/etc/powermeter_exporter/config.yaml",
    ];

    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from `path` if given, else from the first default location that
    /// exists, else fall back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        for path in &Self::DEFAULT_PATHS {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.meter.device.trim().is_empty() {
            return Err(PowermeterError::validation(
                "meter.device",
                "Device cannot be empty",
            ));
        }

        if self.meter.read_timeout_ms == 0 {
            return Err(PowermeterError::validation(
                "meter.read_timeout_ms",
                "Must be greater than 0",
            ));
        }

        if self.meter.frame_timeout_ms < self.meter.read_timeout_ms {
            return Err(PowermeterError::validation(
                "meter.frame_timeout_ms",
                "Must not be shorter than meter.read_timeout_ms",
            ));
        }

        if self.web.port == 0 {
            return Err(PowermeterError::validation(
                "web.port",
                "Port must be greater than 0",
            ));
        }

        if self.acquisition.interval_seconds == 0 {
            return Err(PowermeterError::validation(
                "acquisition.interval_seconds",
                "Must be greater than 0",
            ));
        }

        crate::logging::parse_log_level(&self.logging.level).map_err(|_| {
            PowermeterError::config(format!("Invalid log level: {}", self.logging.level))
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.meter.device, "/dev/ttyUSB0");
        assert_eq!(config.web.port, 8010);
        assert_eq!(config.acquisition.interval_seconds, 60);
        assert_eq!(config.acquisition.mode, AcquisitionMode::Background);
        assert!(config.meter.frame_timeout_ms > config.meter.read_timeout_ms);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.meter.device = "  ".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.web.port = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.meter.frame_timeout_ms = config.meter.read_timeout_ms - 1;
        assert!(config.validate().is_err());

        config = Config::default();
        config.logging.level = "chatty".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "meter:\n  name: cellar\nacquisition:\n  mode: on_request\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.meter.name, "cellar");
        assert_eq!(config.meter.device, "/dev/ttyUSB0");
        assert_eq!(config.acquisition.mode, AcquisitionMode::OnRequest);
        assert_eq!(config.acquisition.interval_seconds, 60);
    }
}
