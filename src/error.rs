//! Error types and handling for the exporter
//!
//! Only acquisition and startup paths produce errors. A missing marker or a
//! truncated frame is never an error; the extractor simply yields no reading.

use thiserror::Error;

/// Result type alias for exporter operations
pub type Result<T> = std::result::Result<T, PowermeterError>;

/// Main error type for the exporter
#[derive(Debug, Error)]
pub enum PowermeterError {
    /// Serial device could not be opened or read; the cycle is abandoned
    #[error("Device unavailable: {device} - {message}")]
    DeviceUnavailable { device: String, message: String },

    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// HTTP server errors
    #[error("Web server error: {message}")]
    Web { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl PowermeterError {
    /// Create a new device error
    pub fn device_unavailable<D: Into<String>, S: Into<String>>(device: D, message: S) -> Self {
        Self::DeviceUnavailable {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new web error
    pub fn web<S: Into<String>>(message: S) -> Self {
        Self::Web {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Whether this error only affects the current acquisition cycle
    pub const fn is_device_error(&self) -> bool {
        matches!(self, Self::DeviceUnavailable { .. })
    }
}

impl From<std::io::Error> for PowermeterError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for PowermeterError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}
