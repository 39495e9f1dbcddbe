//! Port configuration
//!
//! Everything needed to open a diagnostic port and tune its command queue,
//! loadable from JSON so tools can keep per-device settings on disk.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::protocol::{DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS, SERIAL_BUF_SIZE};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataBits {
    Seven,
    Eight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopBits {
    One,
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

/// Settings for one diagnostic port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// Device path (e.g. "/dev/ttyUSB0"); also names the port in logs
    pub device: String,

    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,

    /// Pause between bytes when writing, in microseconds; 0 writes each
    /// command in one go
    pub send_delay_us: u64,

    /// Trim the response buffer when it grows past `buffer_ceiling`
    pub spew_control: bool,

    /// Response buffer size that triggers spew control
    pub buffer_ceiling: usize,

    /// Response timeout used when a caller does not give one, in milliseconds
    pub timeout_ms: u64,

    /// Take an exclusive lock on the device (unix only)
    pub exclusive: bool,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            send_delay_us: 0,
            spew_control: true,
            buffer_ceiling: SERIAL_BUF_SIZE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            exclusive: true,
        }
    }
}

impl PortConfig {
    /// Default settings for `device`
    pub fn for_device(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    /// Parse and validate a JSON config; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Write the config as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be non-zero".into()));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout_ms must be non-zero".into()));
        }
        // The buffer is trimmed by half its ceiling; anything smaller than a
        // couple of frames would discard replies before they complete.
        if self.spew_control && self.buffer_ceiling < 64 {
            return Err(ConfigError::Invalid(format!(
                "buffer_ceiling {} is too small (minimum 64)",
                self.buffer_ceiling
            )));
        }
        Ok(())
    }

    pub fn send_delay(&self) -> Duration {
        Duration::from_micros(self.send_delay_us)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
