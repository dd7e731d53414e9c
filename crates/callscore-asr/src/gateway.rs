//! **ASR gateway**: probe-then-transcribe against Whisper-style HTTP containers.
//!
//! Each candidate endpoint is health-probed with `GET /` before the audio is
//! uploaded to `POST /asr`. Unhealthy or failing endpoints are skipped; when a
//! full round fails the gateway waits `RetryPolicy::backoff` and starts over.

use crate::endpoint::Endpoint;
use crate::error::{AsrError, AsrResult};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::path::Path;
use tracing::{debug, info, warn};

/// Fixed form parameters for the `/asr` call: Russian, plain text output.
pub const ASR_QUERY: [(&str, &str); 6] = [
    ("encode", "false"),
    ("task", "transcribe"),
    ("language", "ru"),
    ("vad_filter", "false"),
    ("word_timestamps", "false"),
    ("output", "txt"),
];

/// Multipart field carrying the raw audio bytes.
pub const AUDIO_FIELD: &str = "audio_file";

/// Backend that turns one audio file into raw transcription text.
#[async_trait]
pub trait AsrGateway: Send + Sync {
    /// Transcribe the recording at `audio_path`. Blocks (asynchronously) until an
    /// endpoint answers or the retry policy gives up.
    async fn transcribe(&self, audio_path: &Path) -> AsrResult<String>;
}

/// Production gateway over a fixed list of endpoints.
#[derive(Debug, Clone)]
pub struct HttpAsrGateway {
    endpoints: Vec<Endpoint>,
    policy: RetryPolicy,
    probe_client: reqwest::Client,
    client: reqwest::Client,
}

impl HttpAsrGateway {
    pub fn new(endpoints: Vec<Endpoint>, policy: RetryPolicy) -> AsrResult<Self> {
        if endpoints.is_empty() {
            return Err(AsrError::NoEndpoints);
        }
        let probe_client = reqwest::Client::builder()
            .timeout(policy.probe_timeout)
            .build()?;
        let client = reqwest::Client::builder()
            .timeout(policy.request_timeout)
            .build()?;
        Ok(Self {
            endpoints,
            policy,
            probe_client,
            client,
        })
    }

    /// `GET /` with the probe timeout. Only `200 OK` counts as healthy.
    pub async fn probe(&self, endpoint: &Endpoint) -> bool {
        match self.probe_client.get(endpoint.health_url()).send().await {
            Ok(res) if res.status() == StatusCode::OK => true,
            Ok(res) => {
                warn!(endpoint = %endpoint, status = %res.status(), "ASR health probe unhealthy");
                false
            }
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "ASR health probe failed");
                false
            }
        }
    }

    /// Upload the audio to one endpoint and return the response body.
    pub async fn post_audio(&self, endpoint: &Endpoint, audio: Vec<u8>) -> AsrResult<String> {
        let part = reqwest::multipart::Part::bytes(audio)
            .file_name("audio_file.wav")
            .mime_str("audio/wav")?;
        let form = reqwest::multipart::Form::new().part(AUDIO_FIELD, part);
        let res = self
            .client
            .post(endpoint.asr_url())
            .query(&ASR_QUERY)
            .multipart(form)
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(AsrError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(res.text().await?)
    }
}

#[async_trait]
impl AsrGateway for HttpAsrGateway {
    async fn transcribe(&self, audio_path: &Path) -> AsrResult<String> {
        let audio = tokio::fs::read(audio_path)
            .await
            .map_err(|source| AsrError::Audio {
                path: audio_path.display().to_string(),
                source,
            })?;
        info!(path = %audio_path.display(), bytes = audio.len(), "Processing audio file");

        let mut rounds: u32 = 0;
        loop {
            for endpoint in &self.endpoints {
                debug!(endpoint = %endpoint, "Trying ASR endpoint");
                if !self.probe(endpoint).await {
                    continue;
                }
                match self.post_audio(endpoint, audio.clone()).await {
                    Ok(text) => {
                        info!(endpoint = %endpoint, path = %audio_path.display(), "Audio file transcribed");
                        return Ok(text);
                    }
                    Err(e) => {
                        warn!(endpoint = %endpoint, error = %e, "ASR request failed; trying next endpoint");
                    }
                }
            }
            rounds += 1;
            if self.policy.exhausted(rounds) {
                return Err(AsrError::Exhausted { rounds });
            }
            warn!(
                rounds,
                backoff_ms = self.policy.backoff.as_millis() as u64,
                "No ASR endpoint available; retrying"
            );
            tokio::time::sleep(self.policy.backoff).await;
        }
    }
}
