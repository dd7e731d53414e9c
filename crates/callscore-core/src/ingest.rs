//! Import of call-tracking exports (JSON array of rows with Russian column names).

use crate::error::PipelineResult;
use crate::record::{Record, RecordId, NO_ANSWER};
use crate::store::RecordStore;
use crate::text::remove_braces;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

static SESSION_IN_FILE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"session_(\d+)_talk").expect("static regex"));

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCallRow {
    #[serde(rename = "Идентификатор сессии звонка", default)]
    pub call_session: Option<i64>,
    #[serde(rename = "ID проекта", default)]
    pub project_id: Option<i64>,
    #[serde(rename = "Name", default)]
    pub project_name: Option<String>,
    #[serde(rename = "Имя файла", default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub whisper: Option<String>,
    #[serde(rename = "Статус", default)]
    pub status: Option<String>,
    #[serde(rename = "Тип", default)]
    pub call_type: Option<String>,
    #[serde(rename = "Сайт", default)]
    pub site: Option<String>,
    #[serde(rename = "Тип посетителя", default)]
    pub visitor_type: Option<String>,
    #[serde(rename = "Сценарий", default)]
    pub scenario: Option<String>,
    #[serde(rename = "Операции", default)]
    pub operations: Option<String>,
    #[serde(rename = "Тип устройства", default)]
    pub device_type: Option<String>,
    #[serde(rename = "Первая рекламная кампания", default)]
    pub first_ad_campaign: Option<String>,
    #[serde(rename = "Чистая длительность разговора", default)]
    pub net_duration: Option<Value>,
    #[serde(rename = "Номер обращения", default)]
    pub request_number: Option<Value>,
    #[serde(rename = "ID посетителя", default)]
    pub visitor_id: Option<Value>,
}

/// `session_<digits>_talk` anywhere in the audio file name.
pub fn session_from_file_name(name: &str) -> Option<RecordId> {
    SESSION_IN_FILE_NAME
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .map(RecordId)
}

/// `HH:MM:SS` or a plain integer. Anything else (including values that
/// overflow) counts as zero.
pub fn duration_secs(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
        Some(Value::String(s)) => {
            let parts: Vec<_> = s.trim().split(':').map(|p| p.parse::<i64>()).collect();
            match parts.as_slice() {
                [Ok(h), Ok(m), Ok(s)] => h
                    .checked_mul(3600)
                    .and_then(|t| m.checked_mul(60).and_then(|mm| t.checked_add(mm)))
                    .and_then(|t| t.checked_add(*s))
                    .unwrap_or(0),
                _ => 0,
            }
        }
        _ => 0,
    }
}

/// Numbers, numeric strings, or the literal `"None"` (case-insensitive).
fn numeric(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().eq_ignore_ascii_case("none") => None,
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn categorical(value: Option<String>) -> Option<String> {
    value
        .map(|v| remove_braces(&v))
        .filter(|v| !v.trim().is_empty())
}

impl RawCallRow {
    /// Convert to an untranscribed [`Record`]. `None` when no session id can be found.
    pub fn into_record(self) -> Option<Record> {
        let file_name = self.file_name.unwrap_or_default();
        let id = self
            .call_session
            .map(RecordId)
            .or_else(|| session_from_file_name(&file_name))?;

        let mut record = Record::new(id, file_name);
        record.project_id = self.project_id;
        record.project_name = self.project_name;
        record.status = categorical(self.status);
        record.call_type = categorical(self.call_type);
        record.site = categorical(self.site);
        record.visitor_type = categorical(self.visitor_type);
        record.scenario = categorical(self.scenario);
        record.operations = categorical(self.operations);
        record.device_type = categorical(self.device_type);
        record.first_ad_campaign = categorical(self.first_ad_campaign);
        record.net_duration_secs = duration_secs(self.net_duration.as_ref());
        record.request_number = numeric(self.request_number.as_ref()).unwrap_or(0.0);
        record.visitor_id = numeric(self.visitor_id.as_ref()).map(|v| v as i64);
        record.transcription_text = match self.whisper {
            Some(text) if !text.trim().is_empty() => text,
            _ => NO_ANSWER.to_string(),
        };
        Some(record)
    }
}

/// Parse an export file into records, skipping rows without a session id.
pub fn load_export(path: impl AsRef<Path>) -> PipelineResult<Vec<Record>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)?;
    let rows: Vec<RawCallRow> = serde_json::from_str(&raw)?;
    let total = rows.len();
    let records: Vec<Record> = rows
        .into_iter()
        .enumerate()
        .filter_map(|(i, row)| {
            let file_name = row.file_name.clone();
            let record = row.into_record();
            if record.is_none() {
                warn!(row = i, file_name = ?file_name, "Row has no call session id; skipped");
            }
            record
        })
        .collect();
    info!(path = %path.display(), total, loaded = records.len(), "Export parsed");
    Ok(records)
}

/// Upsert every record; returns how many were written.
pub fn import_records(store: &dyn RecordStore, records: &[Record]) -> PipelineResult<usize> {
    for record in records {
        store.upsert(record)?;
    }
    Ok(records.len())
}
