//! Runtime configuration
//!
//! Loaded from JSON. Durations are written in human form ("250ms", "1s").
//! Every field has a default, so a config file only names what it changes.

use std::path::Path;
use std::time::Duration;

use concentric_core::PropagationConfig;
use serde::{Deserialize, Serialize};

use crate::RuntimeError;

/// Environment variable naming a JSON config file
pub const CONFIG_ENV: &str = "CONCENTRIC_CONFIG";

/// Logging setup
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Include the event target (module path)
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            with_target: true,
        }
    }
}

/// Runtime configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Commands buffered per session before submissions are rejected
    pub queue_depth: usize,
    /// Notifications buffered per subscriber before it starts lagging
    pub notification_capacity: usize,
    /// Period of the decay tick
    #[serde(with = "human_duration")]
    pub tick_interval: Duration,
    pub log: LogConfig,
    /// Propagation parameters for sessions created without their own
    pub propagation: PropagationConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_depth: 1024,
            notification_capacity: 256,
            tick_interval: Duration::from_secs(1),
            log: LogConfig::default(),
            propagation: PropagationConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(json: &str) -> Result<Self, RuntimeError> {
        let config: RuntimeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Load from the file named by `CONCENTRIC_CONFIG`, or fall back to defaults
    pub fn from_env() -> Result<Self, RuntimeError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_path(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.queue_depth == 0 {
            return Err(RuntimeError::Invalid("queue_depth must be at least 1"));
        }
        if self.notification_capacity == 0 {
            return Err(RuntimeError::Invalid(
                "notification_capacity must be at least 1",
            ));
        }
        if self.tick_interval.is_zero() {
            return Err(RuntimeError::Invalid("tick_interval must be non-zero"));
        }
        self.propagation.validate()?;
        Ok(())
    }
}

/// Serde adapter for durations in humantime form
mod human_duration {
    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(D::Error::custom)
    }
}
