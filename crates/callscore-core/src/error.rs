//! Error types for the call-record pipeline

use callscore_asr::AsrError;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors surfaced by stores, scoring, and tick handlers
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Record store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Pending set error: {0}")]
    Pending(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("ASR error: {0}")]
    Asr(#[from] AsrError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Config(err.to_string())
    }
}
