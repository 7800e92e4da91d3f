//! Error types for SIMS

use thiserror::Error;

/// Result type alias for SIMS operations
pub type Result<T> = std::result::Result<T, SimsError>;

/// Main error type for SIMS
#[derive(Error, Debug)]
pub enum SimsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
