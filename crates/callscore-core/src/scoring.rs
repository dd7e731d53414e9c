//! Batch inference: feature rows built from records, and the predictor seam.
//!
//! Feature preparation mirrors what the trained classifier expects:
//! cleaned transcription text (bag of words), categorical attributes with a
//! fixed fill value, and three numerics scaled by the batch maximum.

use crate::error::{PipelineError, PipelineResult};
use crate::record::{Record, RecordId, NO_ANSWER, NO_DATA};
use crate::text::{normalize_text, remove_braces};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// Visitor ids are large; they are shrunk before batch normalization.
const VISITOR_ID_DIVISOR: f64 = 100_000_000.0;

/// One normalized input row for the classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub record_id: RecordId,
    /// Cleaned transcription.
    pub text: String,
    /// `(field, value)` pairs in a fixed field order.
    pub categorical: Vec<(&'static str, String)>,
    /// `[net_duration_secs, request_number, visitor_id / 1e8]`, divided by the batch maximum.
    pub numeric: [f32; 3],
}

fn categorical(field: &'static str, value: &Option<String>) -> (&'static str, String) {
    let v = value
        .as_deref()
        .map(remove_braces)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| NO_DATA.to_string());
    (field, v)
}

/// Build feature rows for a whole batch. Numeric normalization depends on the
/// batch, so rows must be built together.
pub fn build_feature_rows(records: &[Record]) -> Vec<FeatureRow> {
    let raw: Vec<[f64; 3]> = records
        .iter()
        .map(|r| {
            [
                r.net_duration_secs as f64,
                r.request_number,
                r.visitor_id.unwrap_or(0) as f64 / VISITOR_ID_DIVISOR,
            ]
        })
        .collect();
    let max = raw
        .iter()
        .flat_map(|row| row.iter().copied())
        .fold(0.0_f64, f64::max);
    let scale = if max > 0.0 { max } else { 1.0 };

    records
        .iter()
        .zip(raw)
        .map(|(r, nums)| FeatureRow {
            record_id: r.call_session,
            text: normalize_text(&r.transcription_text)
                .unwrap_or_else(|| NO_ANSWER.to_string()),
            categorical: vec![
                categorical("status", &r.status),
                categorical("call_type", &r.call_type),
                categorical("site", &r.site),
                categorical("visitor_type", &r.visitor_type),
                categorical("scenario", &r.scenario),
                categorical("operations", &r.operations),
                categorical("device_type", &r.device_type),
                categorical("first_ad_campaign", &r.first_ad_campaign),
            ],
            numeric: nums.map(|n| (n / scale) as f32),
        })
        .collect()
}

/// External classifier. Returns a prediction for every row it could score;
/// missing ids are left for the next tick.
pub trait BatchPredictor: Send + Sync {
    fn predict(&self, rows: &[FeatureRow]) -> PipelineResult<HashMap<RecordId, i64>>;
}

fn default_threshold() -> f32 {
    0.5
}

/// Logistic model over bag-of-words, one-hot categoricals and numerics,
/// loaded from a JSON weights file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinearModel {
    #[serde(default)]
    pub bias: f32,
    /// Per-token weight; a token contributes once no matter how often it appears.
    #[serde(default)]
    pub token_weights: HashMap<String, f32>,
    /// Keyed `field=value`, e.g. `site=example.ru`.
    #[serde(default)]
    pub categorical_weights: HashMap<String, f32>,
    #[serde(default)]
    pub numeric_weights: [f32; 3],
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

impl LinearModel {
    pub fn load(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Model(format!("cannot read model {}: {}", path.display(), e))
        })?;
        let model: LinearModel = serde_json::from_str(&content)?;
        info!(
            path = %path.display(),
            tokens = model.token_weights.len(),
            categorical = model.categorical_weights.len(),
            "Scoring model loaded"
        );
        Ok(model)
    }

    /// Probability of the positive class.
    pub fn probability(&self, row: &FeatureRow) -> f32 {
        let tokens: HashSet<&str> = row.text.split_whitespace().collect();
        let text_term: f32 = tokens
            .iter()
            .filter_map(|t| self.token_weights.get(*t))
            .sum();
        let cat_term: f32 = row
            .categorical
            .iter()
            .filter_map(|(field, value)| self.categorical_weights.get(&format!("{field}={value}")))
            .sum();
        let num_term: f32 = row
            .numeric
            .iter()
            .zip(self.numeric_weights.iter())
            .map(|(x, w)| x * w)
            .sum();
        let z = self.bias + text_term + cat_term + num_term;
        1.0 / (1.0 + (-z).exp())
    }
}

impl BatchPredictor for LinearModel {
    fn predict(&self, rows: &[FeatureRow]) -> PipelineResult<HashMap<RecordId, i64>> {
        let out: HashMap<RecordId, i64> = rows
            .iter()
            .map(|row| {
                let p = self.probability(row);
                (row.record_id, i64::from(p >= self.threshold))
            })
            .collect();
        debug!(rows = rows.len(), "batch prediction done");
        Ok(out)
    }
}
