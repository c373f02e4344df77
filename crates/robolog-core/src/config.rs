//! Provider configuration
//!
//! Settings are plain serde structs with defaults matching the viewer, and
//! can be persisted as JSON next to a project.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default playback/ingestion period in milliseconds
pub const DEFAULT_PERIOD_MS: u64 = 30;

/// Default number of samples on each side of a trajectory's current point
pub const DEFAULT_TRAJECTORY_SPAN: usize = 200;

/// Default realtime window in seconds
pub const DEFAULT_REALTIME_WINDOW_SECONDS: f64 = 20.0;

/// Root group name used by the realtime logger
pub const REALTIME_ROOT_NAME: &str = "robot_realtime";

/// Errors that can occur while loading or saving configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Settings shared by both provider variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Period of the playback/ingestion loop in milliseconds
    pub period_ms: u64,
    /// Name of the root group signals are looked up under
    pub signal_root_name: String,
    /// Neighbor window used for 3D trajectories
    pub trajectory_span: usize,
    /// Trailing window kept by the realtime provider, in seconds
    pub realtime_window_seconds: f64,
    /// Joint position path used when no joints path is configured
    pub joints_default_path: Vec<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            period_ms: DEFAULT_PERIOD_MS,
            signal_root_name: crate::archive::DEFAULT_ROOT_NAME.to_string(),
            trajectory_span: DEFAULT_TRAJECTORY_SPAN,
            realtime_window_seconds: DEFAULT_REALTIME_WINDOW_SECONDS,
            joints_default_path: vec!["joints_state".to_string(), "positions".to_string()],
        }
    }
}

impl ProviderConfig {
    /// Defaults for replaying archives
    pub fn offline() -> Self {
        Self::default()
    }

    /// Defaults for the realtime logger feed
    pub fn realtime() -> Self {
        Self {
            signal_root_name: REALTIME_ROOT_NAME.to_string(),
            ..Self::default()
        }
    }

    /// Playback tick period
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    /// Set the playback tick period
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period_ms = period.as_millis() as u64;
        self
    }

    /// Set the realtime window length in seconds
    pub fn with_window(mut self, seconds: f64) -> Self {
        self.realtime_window_seconds = seconds;
        self
    }

    /// Check values that would make the provider misbehave
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "period_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if !(self.realtime_window_seconds.is_finite() && self.realtime_window_seconds > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "realtime_window_seconds".to_string(),
                message: format!("must be a positive number, got {}", self.realtime_window_seconds),
            });
        }
        if self.signal_root_name.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "signal_root_name".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Settings for the TCP realtime client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpClientConfig {
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Read timeout for one frame in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for TcpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 2000,
            read_timeout_ms: 100,
        }
    }
}
