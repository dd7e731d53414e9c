//! ASR endpoint addresses (`host:port` pairs).

use crate::error::{AsrError, AsrResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One Whisper-style ASR container reachable over plain HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Base URL without trailing slash, e.g. `http://whisper:9000`.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Health probe target (`GET /`).
    pub fn health_url(&self) -> String {
        format!("{}/", self.base_url())
    }

    /// Transcription target (`POST /asr`).
    pub fn asr_url(&self) -> String {
        format!("{}/asr", self.base_url())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = AsrError;

    fn from_str(s: &str) -> AsrResult<Self> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AsrError::InvalidEndpoint(s.to_string()))?;
        let host = host.trim();
        if host.is_empty() {
            return Err(AsrError::InvalidEndpoint(s.to_string()));
        }
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|_| AsrError::InvalidEndpoint(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

/// Parse a list of `host:port` strings, rejecting an empty result.
pub fn parse_endpoints<S: AsRef<str>>(items: &[S]) -> AsrResult<Vec<Endpoint>> {
    let endpoints = items
        .iter()
        .map(|s| s.as_ref())
        .filter(|s| !s.trim().is_empty())
        .map(Endpoint::from_str)
        .collect::<AsrResult<Vec<_>>>()?;
    if endpoints.is_empty() {
        return Err(AsrError::NoEndpoints);
    }
    Ok(endpoints)
}
