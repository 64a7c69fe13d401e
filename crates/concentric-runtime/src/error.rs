//! Runtime setup errors

use concentric_core::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Propagation(#[from] ConfigError),

    #[error("invalid runtime config: {0}")]
    Invalid(&'static str),

    #[error("failed to install tracing subscriber: {0}")]
    Telemetry(String),
}
