//! # powermeter_exporter - SML smart meter exporter for Prometheus
//!
//! Reads the push telegrams of an SML electricity meter through an optical
//! serial head and exposes instantaneous power and the energy registers as
//! Prometheus gauges.
//!
//! ## Architecture
//!
//! - `serial`: one frame per cycle from the serial device
//! - `sml`: marker table and value extraction
//! - `metrics`: gauge registry and text exposition
//! - `exporter`: acquisition cycle and background scheduling
//! - `web`: HTTP endpoints
//! - `config` / `cli`: YAML configuration and command line overrides
//! - `logging`: structured logging and tracing

pub mod cli;
pub mod config;
pub mod error;
pub mod exporter;
pub mod logging;
pub mod metrics;
pub mod serial;
pub mod sml;
pub mod web;

#[cfg(test)]
mod web_tests;

// Re-export commonly used types
pub use config::Config;
pub use error::{PowermeterError, Result};
pub use exporter::Exporter;
