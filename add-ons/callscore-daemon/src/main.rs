//! Callscore daemon
//!
//! Seeds the pending set every dispatch tick, transcribes pending recordings
//! through the configured ASR endpoints, and scores transcribed records every
//! prediction tick.
//!
//! Flags:
//! - `--import <file>`: upsert records from a call-tracking JSON export and exit
//! - `--reset-pending`: clear the pending set before starting

mod telemetry;

use callscore_asr::HttpAsrGateway;
use callscore_core::{
    ingest, LinearModel, PendingSet, Pipeline, PipelineConfig, Scheduler, SledPendingSet,
    SqliteRecordStore,
};
use std::sync::Arc;
use tokio::sync::watch;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[callscore-daemon] .env not loaded: {} (using system environment)", e);
    }

    let config = PipelineConfig::load()?;
    let _log_guard = telemetry::init(config.log_dir.as_deref());

    let args: Vec<String> = std::env::args().collect();
    let records = Arc::new(SqliteRecordStore::new(&config.database_path)?);

    if let Some(pos) = args.iter().position(|a| a == "--import") {
        let Some(file) = args.get(pos + 1) else {
            eprintln!("Usage: callscore-daemon --import <export.json>");
            std::process::exit(1);
        };
        let loaded = ingest::load_export(file)?;
        let written = ingest::import_records(records.as_ref(), &loaded)?;
        tracing::info!(file = %file, written, "Import finished");
        return Ok(());
    }

    let pending = Arc::new(SledPendingSet::open(&config.pending_path)?);
    if args.iter().any(|a| a == "--reset-pending") {
        let dropped = pending.len()?;
        pending.clear()?;
        tracing::warn!(dropped, "Pending set cleared on request");
    }

    let asr = Arc::new(HttpAsrGateway::new(config.endpoints()?, config.retry_policy())?);
    let model = Arc::new(LinearModel::load(&config.model_path)?);
    let pipeline = Pipeline::new(records, pending.clone(), asr, model, config.batch_size);

    tracing::info!(
        database = %config.database_path,
        pending = pending.len()?,
        endpoints = ?config.asr_endpoints,
        batch_size = config.batch_size,
        dispatch_every_secs = config.dispatch_interval_secs,
        predict_every_secs = config.prediction_interval_secs,
        "Callscore daemon started"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Scheduler::new(config.dispatch_interval(), config.prediction_interval());
    let running = tokio::spawn(scheduler.run_pipeline(pipeline, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("CTRL-C received; shutting down daemon");
    let _ = shutdown_tx.send(true);
    running.await?;

    // In-flight ASR tasks are abandoned; their entries stay pending for the next start.
    Ok(())
}
