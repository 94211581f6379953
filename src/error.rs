//! Error handling module for ffmr-bootstrap
//!
//! Domain errors use these thiserror types; orchestration code wraps them in
//! `anyhow` with context at the boundaries.

use thiserror::Error;

/// Main error type for ffmr-bootstrap
#[derive(Error, Debug)]
pub enum FfmrError {
    /// IO errors (file operations, spawning children)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (loading, parsing, validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// nodes.json could not be fetched or understood
    #[error("Nodes error: {0}")]
    Nodes(String),

    /// InfluxDB rejected a request or could not be reached
    #[error("InfluxDB error: {0}")]
    Influx(String),
}

/// Result type alias for ffmr-bootstrap operations
pub type Result<T> = std::result::Result<T, FfmrError>;

impl FfmrError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a nodes.json error
    pub fn nodes(msg: impl Into<String>) -> Self {
        Self::Nodes(msg.into())
    }

    /// Create an InfluxDB error
    pub fn influx(msg: impl Into<String>) -> Self {
        Self::Influx(msg.into())
    }
}
