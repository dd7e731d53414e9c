//! # callscore-asr
//!
//! Client for Whisper-style ASR containers: health probe (`GET /`), multipart
//! transcription (`POST /asr`), and an explicit retry policy across several
//! `host:port` endpoints.

pub mod endpoint;
pub mod error;
pub mod gateway;
pub mod retry;

pub use endpoint::{parse_endpoints, Endpoint};
pub use error::{AsrError, AsrResult};
pub use gateway::{AsrGateway, HttpAsrGateway, ASR_QUERY, AUDIO_FIELD};
pub use retry::RetryPolicy;
