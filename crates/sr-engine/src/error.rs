//! Engine error types

use sr_core::SrError;
use thiserror::Error;

/// Engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unknown track: {0}")]
    UnknownTrack(String),

    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    #[error("Command queue full")]
    QueueFull,

    #[error("Render error: {0}")]
    Render(String),

    #[error("WAV error: {0}")]
    Wav(String),

    #[error(transparent)]
    Core(#[from] SrError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<hound::Error> for EngineError {
    fn from(e: hound::Error) -> Self {
        EngineError::Wav(e.to_string())
    }
}

/// Result type alias
pub type EngineResult<T> = Result<T, EngineError>;
