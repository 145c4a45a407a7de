use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PlayerError>;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Unsupported file type '{mime}': please select a valid .mp3 file")]
    UnsupportedFormat { mime: String },
    #[error("Failed to load audio file: {0}")]
    DecodeFailure(#[from] DecodeError),
    #[error("No audio loaded")]
    NoSourceLoaded,
    #[error("Failed to process audio: {0}")]
    RenderFailure(String),
    #[error("A render is already in progress")]
    RenderInProgress,
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),
    #[error("Invalid audio buffer: {0}")]
    InvalidBuffer(String),
    #[error("Invalid parameters: {0}")]
    InvalidParams(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("input contains no audio frames")]
    Empty,
    #[error("malformed stream at frame {frame}: {reason}")]
    Malformed { frame: usize, reason: String },
    #[error("stream changes format mid-file at frame {frame}")]
    FormatChange { frame: usize },
    #[error("host decoder rejected the file: {0}")]
    Host(String),
}
