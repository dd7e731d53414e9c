//! Retry policy for the probe-then-transcribe loop.
//!
//! A "round" is one pass over every configured endpoint. The reference
//! behavior retries until success, so `max_rounds: None` is the default.

use std::time::Duration;

const DEFAULT_BACKOFF_MS: u64 = 5_000;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of full rounds; `None` keeps cycling until an endpoint answers.
    pub max_rounds: Option<u32>,
    /// Pause between two rounds.
    pub backoff: Duration,
    /// Timeout for the `GET /` health probe.
    pub probe_timeout: Duration,
    /// Timeout for the `POST /asr` call (long recordings take a while).
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_rounds: None,
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl RetryPolicy {
    /// Policy with an attempt cap. `0` is treated as unlimited.
    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = (rounds > 0).then_some(rounds);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// True once `completed_rounds` has reached the cap.
    pub fn exhausted(&self, completed_rounds: u32) -> bool {
        self.max_rounds.is_some_and(|max| completed_rounds >= max)
    }
}
