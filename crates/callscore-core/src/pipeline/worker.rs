//! Transcription Worker: one independent ASR task per pending entry.
//!
//! The pending set is re-read on every invocation, so entries left over from a
//! failed task or a previous process are picked up again. An in-process
//! registry skips entries whose task is still running; it only prevents
//! duplicate requests from this process and is never consulted for
//! pending status.

use crate::error::{PipelineError, PipelineResult};
use crate::pending::{PendingEntry, PendingSet};
use crate::pipeline::completion::{CompletionHandler, CompletionOutcome, TranscriptionOutcome};
use crate::record::RecordId;
use callscore_asr::AsrGateway;
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type InFlight = Arc<DashMap<RecordId, ()>>;

/// Removes the record from the in-flight registry when the task ends, panics included.
struct InFlightGuard {
    in_flight: InFlight,
    id: RecordId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.id);
    }
}

/// Handles for the tasks started by one worker invocation.
#[derive(Debug, Default)]
pub struct WorkerRun {
    pub dispatched: usize,
    pub skipped_in_flight: usize,
    /// Listed, but completed and removed before a task could be claimed.
    pub skipped_completed: usize,
    pub handles: Vec<JoinHandle<PipelineResult<CompletionOutcome>>>,
}

impl WorkerRun {
    /// Wait for every task (tests and shutdown paths only; ticks never wait).
    pub async fn join(self) -> Vec<PipelineResult<CompletionOutcome>> {
        let mut out = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            out.push(handle.await.map_err(PipelineError::from).and_then(|r| r));
        }
        out
    }
}

pub struct TranscriptionWorker {
    pending: Arc<dyn PendingSet>,
    asr: Arc<dyn AsrGateway>,
    completion: Arc<CompletionHandler>,
    in_flight: InFlight,
}

impl TranscriptionWorker {
    pub fn new(
        pending: Arc<dyn PendingSet>,
        asr: Arc<dyn AsrGateway>,
        completion: Arc<CompletionHandler>,
    ) -> Self {
        Self {
            pending,
            asr,
            completion,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Number of entries with a running task in this process.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Spawn one task per pending entry not already in flight. Must be called
    /// from within a tokio runtime; returns without waiting for the tasks.
    pub fn run(&self) -> PipelineResult<WorkerRun> {
        let entries = self.pending.list_all()?;
        let mut run = WorkerRun::default();
        if entries.is_empty() {
            info!("All records from the pending set are already processed");
            return Ok(run);
        }

        for entry in entries {
            if entry.audio_path.trim().is_empty() {
                warn!(record_id = %entry.record_id, "Pending entry has no audio path; skipping");
                continue;
            }
            if self.in_flight.insert(entry.record_id, ()).is_some() {
                run.skipped_in_flight += 1;
                continue;
            }
            let guard = InFlightGuard {
                in_flight: Arc::clone(&self.in_flight),
                id: entry.record_id,
            };
            // Completion removes the entry before releasing the in-flight slot,
            // so a stale snapshot is caught here.
            if !self.pending.contains(&entry)? {
                debug!(record_id = %entry.record_id, "Entry completed since listing; skipping");
                run.skipped_completed += 1;
                continue;
            }
            run.handles.push(self.spawn_entry(entry, guard));
            run.dispatched += 1;
        }
        info!(
            dispatched = run.dispatched,
            skipped_in_flight = run.skipped_in_flight,
            skipped_completed = run.skipped_completed,
            "Pending records sent for transcription"
        );
        Ok(run)
    }

    fn spawn_entry(
        &self,
        entry: PendingEntry,
        guard: InFlightGuard,
    ) -> JoinHandle<PipelineResult<CompletionOutcome>> {
        let asr = Arc::clone(&self.asr);
        let completion = Arc::clone(&self.completion);
        tokio::spawn(async move {
            let _guard = guard;
            let result = match asr.transcribe(Path::new(&entry.audio_path)).await {
                Ok(text) => Some(text),
                Err(e) if e.is_transient() => {
                    warn!(
                        record_id = %entry.record_id,
                        audio_path = %entry.audio_path,
                        error = %e,
                        "Transcription failed; entry stays pending"
                    );
                    None
                }
                Err(e) => {
                    error!(
                        record_id = %entry.record_id,
                        audio_path = %entry.audio_path,
                        error = %e,
                        "Transcription cannot succeed until fixed; entry stays pending"
                    );
                    None
                }
            };
            let record_id = entry.record_id;
            let outcome = TranscriptionOutcome { entry, result };
            let res = tokio::task::spawn_blocking(move || completion.complete(outcome))
                .await
                .map_err(PipelineError::from)
                .and_then(|r| r);
            if let Err(ref e) = res {
                error!(record_id = %record_id, error = %e, "Completion failed; entry stays pending");
            }
            res
        })
    }
}
