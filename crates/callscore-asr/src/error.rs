//! Error types for the ASR gateway client

use thiserror::Error;

/// Result type alias for ASR operations
pub type AsrResult<T> = Result<T, AsrError>;

/// Errors that can occur while talking to ASR endpoints
#[derive(Error, Debug)]
pub enum AsrError {
    #[error("No ASR endpoints configured")]
    NoEndpoints,

    #[error("Invalid ASR endpoint '{0}' (expected host:port)")]
    InvalidEndpoint(String),

    #[error("Failed to read audio file {path}: {source}")]
    Audio {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ASR endpoint {endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("All ASR endpoints failed after {rounds} round(s)")]
    Exhausted { rounds: u32 },
}

impl AsrError {
    /// True when a later attempt may succeed without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AsrError::Http(_) | AsrError::Status { .. } | AsrError::Exhausted { .. }
        )
    }
}
