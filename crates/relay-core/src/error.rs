//! Error types for relay-core

use thiserror::Error;

/// Main error type for relay-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("A relay run is already in progress for session: {0}")]
    Conflict(String),

    #[error("Agent runtime error: {0}")]
    Runtime(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for relay-core
pub type Result<T> = std::result::Result<T, Error>;
