//! Prediction Updater: the `PredictionTick` handler.

use crate::error::PipelineResult;
use crate::scoring::{build_feature_rows, BatchPredictor};
use crate::store::RecordStore;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// `scored` of `batch` eligible records received a score.
    Scored { scored: usize, batch: usize },
    NothingToScore,
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateStatus::Scored { scored, batch } => write!(f, "scored {scored} of {batch}"),
            UpdateStatus::NothingToScore => write!(f, "nothing to score"),
        }
    }
}

pub struct PredictionUpdater {
    records: Arc<dyn RecordStore>,
    predictor: Arc<dyn BatchPredictor>,
}

impl PredictionUpdater {
    pub fn new(records: Arc<dyn RecordStore>, predictor: Arc<dyn BatchPredictor>) -> Self {
        Self { records, predictor }
    }

    /// Score every transcribed, undelivered record in one batch and commit the
    /// scores in a single transaction. Any error leaves the store untouched.
    pub fn tick(&self) -> PipelineResult<UpdateStatus> {
        let batch = self.records.list_eligible_for_scoring()?;
        if batch.is_empty() {
            return Ok(UpdateStatus::NothingToScore);
        }

        let rows = build_feature_rows(&batch);
        let predictions = self.predictor.predict(&rows)?;
        let scores: HashMap<_, _> = batch
            .iter()
            .filter_map(|r| predictions.get(&r.call_session).map(|s| (r.call_session, *s)))
            .collect();

        let scored = if scores.is_empty() {
            0
        } else {
            self.records.update_scores_batch(&scores)?
        };
        info!(scored, batch = batch.len(), "Predictions updated");
        Ok(UpdateStatus::Scored {
            scored,
            batch: batch.len(),
        })
    }
}
