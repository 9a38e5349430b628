//! Error types for SonicRack

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum SrError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Invalid buffer: {0}")]
    InvalidBuffer(String),
}

/// Result type alias
pub type SrResult<T> = Result<T, SrError>;
