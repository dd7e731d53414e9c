//! Call-record pipeline: periodic dispatch of audio recordings to ASR,
//! durable tracking of in-flight work, and batch scoring of transcripts.
//!
//! - [`store`]: SQLite-backed Record Store
//! - [`pending`]: sled-backed Pending-Set Store
//! - [`pipeline`]: Dispatcher, Transcription Worker, Completion Handler, Prediction Updater
//! - [`scheduler`]: the two periodic triggers

pub mod config;
pub mod error;
pub mod ingest;
pub mod pending;
pub mod pipeline;
pub mod record;
pub mod scheduler;
pub mod scoring;
pub mod store;
pub mod text;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use pending::{PendingEntry, PendingSet, SledPendingSet};
pub use pipeline::{
    CompletionHandler, CompletionOutcome, DispatchStatus, Dispatcher, Pipeline,
    PredictionUpdater, TranscriptionOutcome, TranscriptionWorker, UpdateStatus, WorkerRun,
};
pub use record::{Record, RecordId, NO_ANSWER, NO_DATA};
pub use scheduler::Scheduler;
pub use scoring::{build_feature_rows, BatchPredictor, FeatureRow, LinearModel};
pub use store::{RecordStore, SqliteRecordStore, TranscriptionUpdate};
pub use text::{clean_text, normalize_text, remove_braces};
