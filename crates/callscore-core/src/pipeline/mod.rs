//! Dispatch → transcribe → complete state machine, plus the scoring flow.
//!
//! ```text
//! DispatchTick ─► Dispatcher ─► PendingSet ─► TranscriptionWorker ─► CompletionHandler
//!                                   ▲                                     │
//!                                   └──────────── remove_exact ◄─────────┘
//! PredictionTick ─► PredictionUpdater ─► RecordStore
//! ```

pub mod completion;
pub mod dispatcher;
pub mod updater;
pub mod worker;

pub use completion::{CompletionHandler, CompletionOutcome, TranscriptionOutcome};
pub use dispatcher::{DispatchStatus, Dispatcher, DEFAULT_BATCH_SIZE};
pub use updater::{PredictionUpdater, UpdateStatus};
pub use worker::{TranscriptionWorker, WorkerRun};

use crate::pending::PendingSet;
use crate::scoring::BatchPredictor;
use crate::store::RecordStore;
use callscore_asr::AsrGateway;
use std::sync::Arc;

/// Both tick handlers wired over shared stores.
#[derive(Clone)]
pub struct Pipeline {
    pub dispatcher: Arc<Dispatcher>,
    pub updater: Arc<PredictionUpdater>,
    pub worker: Arc<TranscriptionWorker>,
}

impl Pipeline {
    pub fn new(
        records: Arc<dyn RecordStore>,
        pending: Arc<dyn PendingSet>,
        asr: Arc<dyn AsrGateway>,
        predictor: Arc<dyn BatchPredictor>,
        batch_size: usize,
    ) -> Self {
        let completion = Arc::new(CompletionHandler::new(
            Arc::clone(&records),
            Arc::clone(&pending),
        ));
        let worker = Arc::new(TranscriptionWorker::new(
            Arc::clone(&pending),
            asr,
            completion,
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&records),
            pending,
            Arc::clone(&worker),
            batch_size,
        ));
        let updater = Arc::new(PredictionUpdater::new(records, predictor));
        Self {
            dispatcher,
            updater,
            worker,
        }
    }
}
