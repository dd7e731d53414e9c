//! Call record model as stored in the `records` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder transcription used when ASR yields no usable text.
pub const NO_ANSWER: &str = "no-answer";

/// Fill value for missing categorical attributes.
pub const NO_DATA: &str = "Нет данных";

/// Call session identifier; unique and stable for the lifetime of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl RecordId {
    /// Big-endian bytes, so sled key order matches numeric order for non-negative ids.
    pub fn to_key(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_key(key: &[u8]) -> Option<Self> {
        let bytes: [u8; 8] = key.try_into().ok()?;
        Some(Self(i64::from_be_bytes(bytes)))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RecordId {
    fn from(v: i64) -> Self {
        Self(v)
    }
}

/// One call record. The pipeline only mutates `transcription_text`,
/// `transcribed`, `score` and `score_delivered`; the rest are model features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub call_session: RecordId,
    pub audio_path: String,
    pub project_id: Option<i64>,
    pub project_name: Option<String>,
    pub status: Option<String>,
    pub call_type: Option<String>,
    pub site: Option<String>,
    pub visitor_type: Option<String>,
    pub scenario: Option<String>,
    pub operations: Option<String>,
    pub device_type: Option<String>,
    pub first_ad_campaign: Option<String>,
    pub net_duration_secs: i64,
    pub request_number: f64,
    pub visitor_id: Option<i64>,
    pub transcription_text: String,
    pub transcribed: bool,
    pub score: Option<i64>,
    pub score_delivered: bool,
    pub created_at: DateTime<Utc>,
}

impl Record {
    /// A fresh, untranscribed record with only the identity fields set.
    pub fn new(call_session: impl Into<RecordId>, audio_path: impl Into<String>) -> Self {
        Self {
            call_session: call_session.into(),
            audio_path: audio_path.into(),
            project_id: None,
            project_name: None,
            status: None,
            call_type: None,
            site: None,
            visitor_type: None,
            scenario: None,
            operations: None,
            device_type: None,
            first_ad_campaign: None,
            net_duration_secs: 0,
            request_number: 0.0,
            visitor_id: None,
            transcription_text: NO_ANSWER.to_string(),
            transcribed: false,
            score: None,
            score_delivered: false,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> RecordId {
        self.call_session
    }

    pub fn with_transcription(mut self, text: impl Into<String>) -> Self {
        self.transcription_text = text.into();
        self.transcribed = true;
        self
    }
}
