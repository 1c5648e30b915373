//! Command line flags. Every flag overrides the matching configuration key.

use crate::config::{AcquisitionMode, Config};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "powermeter_exporter",
    version = env!("APP_VERSION"),
    about = "Export SML smart meter readings as Prometheus metrics"
)]
pub struct Cli {
    /// YAML configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// The name of the meter which is monitored
    #[arg(long, value_name = "NAME")]
    pub meter_name: Option<String>,

    /// The serial device of the meter's read head
    #[arg(long, value_name = "PATH")]
    pub device: Option<String>,

    /// The port where to expose the exporter
    #[arg(long, env = "EXPORTER_PORT")]
    pub port: Option<u16>,

    /// The address to bind the HTTP server to
    #[arg(long)]
    pub host: Option<String>,

    /// Seconds between background acquisitions
    #[arg(long, env = "INTERVAL", value_name = "SECONDS")]
    pub interval: Option<u64>,

    /// What triggers an acquisition
    #[arg(long, value_enum)]
    pub mode: Option<AcquisitionMode>,

    /// Activate debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Apply flags on top of a loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(ref name) = self.meter_name {
            config.meter.name.clone_from(name);
        }
        if let Some(ref device) = self.device {
            config.meter.device.clone_from(device);
        }
        if let Some(port) = self.port {
            config.web.port = port;
        }
        if let Some(ref host) = self.host {
            config.web.host.clone_from(host);
        }
        if let Some(interval) = self.interval {
            config.acquisition.interval_seconds = interval;
        }
        if let Some(mode) = self.mode {
            config.acquisition.mode = mode;
        }
        if self.debug {
            config.logging.level = "DEBUG".to_string();
        }
    }
}
