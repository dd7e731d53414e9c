//! Completion Handler: folds one transcription result back into the Record Store
//! and clears its pending entry.

use crate::error::PipelineResult;
use crate::pending::{PendingEntry, PendingSet};
use crate::store::{RecordStore, TranscriptionUpdate};
use crate::text::clean_text;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Message passed from the worker to the handler: the exact pending entry that
/// was dispatched, plus the raw ASR text (`None` when ASR failed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionOutcome {
    pub entry: PendingEntry,
    pub result: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// No result; the entry stays pending for retry.
    Skipped,
    /// The record no longer exists. Left pending for operator attention.
    NotFound,
    /// Transcription stored; `removed` tells whether this call cleared the entry.
    Completed { text: String, removed: bool },
    /// An earlier completion already stored the text; only the pending entry was reconciled.
    AlreadyTranscribed { removed: bool },
}

impl fmt::Display for CompletionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionOutcome::Skipped => write!(f, "skipped (no result)"),
            CompletionOutcome::NotFound => write!(f, "record not found"),
            CompletionOutcome::Completed { .. } => write!(f, "transcription updated"),
            CompletionOutcome::AlreadyTranscribed { .. } => write!(f, "already transcribed"),
        }
    }
}

pub struct CompletionHandler {
    records: Arc<dyn RecordStore>,
    pending: Arc<dyn PendingSet>,
}

impl CompletionHandler {
    pub fn new(records: Arc<dyn RecordStore>, pending: Arc<dyn PendingSet>) -> Self {
        Self { records, pending }
    }

    /// Persist the cleaned text, flip `transcribed`, then remove the exact entry
    /// that was dispatched. The pending entry is only removed after the record
    /// write has committed.
    pub fn complete(&self, outcome: TranscriptionOutcome) -> PipelineResult<CompletionOutcome> {
        let TranscriptionOutcome { entry, result } = outcome;
        let Some(raw) = result else {
            debug!(record_id = %entry.record_id, "No transcription result; leaving entry pending");
            return Ok(CompletionOutcome::Skipped);
        };

        let Some(record) = self.records.get_by_id(entry.record_id)? else {
            error!(
                record_id = %entry.record_id,
                audio_path = %entry.audio_path,
                "Record not found for completed transcription; pending entry kept for manual reconciliation"
            );
            return Ok(CompletionOutcome::NotFound);
        };
        if record.audio_path != entry.audio_path {
            debug!(
                record_id = %entry.record_id,
                stored = %record.audio_path,
                dispatched = %entry.audio_path,
                "Audio path changed since dispatch; removing the dispatched entry"
            );
        }

        let text = clean_text(&raw);
        match self.records.update_transcription(entry.record_id, &text)? {
            TranscriptionUpdate::Updated => {
                let removed = self.pending.remove_exact(&entry)?;
                info!(record_id = %entry.record_id, removed, "Transcription stored and entry removed from pending set");
                Ok(CompletionOutcome::Completed { text, removed })
            }
            TranscriptionUpdate::AlreadyTranscribed => {
                let removed = self.pending.remove_exact(&entry)?;
                debug!(record_id = %entry.record_id, removed, "Record already transcribed");
                Ok(CompletionOutcome::AlreadyTranscribed { removed })
            }
            TranscriptionUpdate::NotFound => {
                error!(record_id = %entry.record_id, "Record vanished during write-back; pending entry kept");
                Ok(CompletionOutcome::NotFound)
            }
        }
    }
}
