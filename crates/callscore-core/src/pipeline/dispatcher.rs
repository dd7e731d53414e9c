//! Dispatcher: the `DispatchTick` handler.

use crate::error::PipelineResult;
use crate::pending::{PendingEntry, PendingSet};
use crate::pipeline::worker::TranscriptionWorker;
use crate::store::RecordStore;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Default number of records seeded per tick; keeps ASR load small.
pub const DEFAULT_BATCH_SIZE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    /// Pending set was empty; `inserted` new entries were seeded.
    Seeded { inserted: usize },
    /// Pending set was empty and no record needs transcription.
    NothingEligible,
    /// Previous batch not drained yet. Residual entries were handed to the worker.
    AlreadyDraining { pending: usize, redispatched: usize },
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchStatus::Seeded { inserted } => write!(f, "seeded new batch ({inserted})"),
            DispatchStatus::NothingEligible => write!(f, "nothing eligible"),
            DispatchStatus::AlreadyDraining { pending, .. } => {
                write!(f, "already draining ({pending} pending)")
            }
        }
    }
}

pub struct Dispatcher {
    records: Arc<dyn RecordStore>,
    pending: Arc<dyn PendingSet>,
    worker: Arc<TranscriptionWorker>,
    batch_size: usize,
}

impl Dispatcher {
    pub fn new(
        records: Arc<dyn RecordStore>,
        pending: Arc<dyn PendingSet>,
        worker: Arc<TranscriptionWorker>,
        batch_size: usize,
    ) -> Self {
        Self {
            records,
            pending,
            worker,
            batch_size: batch_size.max(1),
        }
    }

    /// Seed the pending set when it is empty, then trigger the worker.
    /// Must be called from within a tokio runtime (the worker spawns tasks).
    pub fn tick(&self) -> PipelineResult<DispatchStatus> {
        let pending = self.pending.len()?;
        if pending > 0 {
            let run = self.worker.run()?;
            debug!(pending, redispatched = run.dispatched, "Pending set still draining");
            return Ok(DispatchStatus::AlreadyDraining {
                pending,
                redispatched: run.dispatched,
            });
        }

        let candidates = self.records.list_eligible_for_transcription(self.batch_size)?;
        if candidates.is_empty() {
            return Ok(DispatchStatus::NothingEligible);
        }

        let mut inserted = 0;
        for record in &candidates {
            if self.pending.insert_if_absent(&PendingEntry::from_record(record))? {
                inserted += 1;
            } else {
                debug!(record_id = %record.call_session, "Record already pending");
            }
        }
        info!(inserted, candidates = candidates.len(), "Records added to the pending set");
        self.worker.run()?;
        Ok(DispatchStatus::Seeded { inserted })
    }
}
