//! Error handling for the polling engine
//!
//! A single consolidated error type is used across the crate; helper
//! constructors keep call sites short.

use thiserror::Error;

/// Engine error type
#[derive(Error, Debug, Clone)]
pub enum PlcPollError {
    /// Configuration-related errors (tag table, engine settings)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Controller connection errors
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Raw buffer decoding errors
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Errors scoped to a single configured tag
    #[error("Tag error: {0}")]
    TagError(String),

    /// Downstream event store errors
    #[error("Storage error: {0}")]
    StorageError(String),

    /// State and synchronization errors
    #[error("State error: {0}")]
    StateError(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type alias for the polling engine
pub type Result<T> = std::result::Result<T, PlcPollError>;

impl PlcPollError {
    pub fn config(msg: impl Into<String>) -> Self {
        PlcPollError::ConfigError(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        PlcPollError::ConnectionError(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        PlcPollError::DecodeError(msg.into())
    }

    pub fn tag(msg: impl Into<String>) -> Self {
        PlcPollError::TagError(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        PlcPollError::StorageError(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        PlcPollError::StateError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        PlcPollError::InternalError(msg.into())
    }
}

// ============================================================================
// From implementations for external error types
// ============================================================================

impl From<std::io::Error> for PlcPollError {
    fn from(err: std::io::Error) -> Self {
        PlcPollError::InternalError(err.to_string())
    }
}

impl From<figment::Error> for PlcPollError {
    fn from(err: figment::Error) -> Self {
        PlcPollError::ConfigError(err.to_string())
    }
}

impl From<csv::Error> for PlcPollError {
    fn from(err: csv::Error) -> Self {
        PlcPollError::ConfigError(format!("CSV: {err}"))
    }
}

impl From<serde_json::Error> for PlcPollError {
    fn from(err: serde_json::Error) -> Self {
        PlcPollError::InternalError(format!("JSON: {err}"))
    }
}

impl From<anyhow::Error> for PlcPollError {
    fn from(err: anyhow::Error) -> Self {
        PlcPollError::ConfigError(format!("{err:#}"))
    }
}
