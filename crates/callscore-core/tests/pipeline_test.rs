//! End-to-end pipeline tests over real SQLite and sled stores with a scripted ASR.
//!
//! ## Scenarios
//! - Seeding respects the batch size and is skipped while the set drains
//! - Worker round trip: transcribed, cleaned, entry removed
//! - ASR failure leaves the entry pending; the next tick retries it
//! - Entries already in flight are not dispatched twice
//! - A listing taken before completion does not resubmit the finished entry
//! - Completion is idempotent; missing records stay pending
//! - Prediction updater scores only ids the predictor returned

use async_trait::async_trait;
use callscore_asr::{AsrError, AsrGateway, AsrResult};
use callscore_core::{
    BatchPredictor, CompletionHandler, CompletionOutcome, DispatchStatus, FeatureRow, PendingEntry,
    PendingSet, Pipeline, PipelineResult, PredictionUpdater, Record, RecordId, RecordStore,
    SledPendingSet, SqliteRecordStore, TranscriptionOutcome, TranscriptionWorker, UpdateStatus,
    NO_ANSWER,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

/// Replies per audio path; paths without a script fail once per call.
#[derive(Default)]
struct ScriptedAsr {
    replies: Mutex<HashMap<String, Vec<AsrResult<String>>>>,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl ScriptedAsr {
    fn reply(self, path: &str, replies: Vec<AsrResult<String>>) -> Self {
        self.replies.lock().unwrap().insert(path.to_string(), replies);
        self
    }

    fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl AsrGateway for ScriptedAsr {
    async fn transcribe(&self, audio_path: &Path) -> AsrResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let mut replies = self.replies.lock().unwrap();
        match replies.get_mut(audio_path.to_string_lossy().as_ref()) {
            Some(queue) if !queue.is_empty() => queue.remove(0),
            _ => Err(AsrError::Exhausted { rounds: 1 }),
        }
    }
}

/// Pending set whose listing is frozen at construction; everything else is live.
struct FrozenListing {
    inner: Arc<SledPendingSet>,
    listing: Vec<PendingEntry>,
}

impl PendingSet for FrozenListing {
    fn len(&self) -> PipelineResult<usize> {
        self.inner.len()
    }

    fn insert_if_absent(&self, entry: &PendingEntry) -> PipelineResult<bool> {
        self.inner.insert_if_absent(entry)
    }

    fn contains(&self, entry: &PendingEntry) -> PipelineResult<bool> {
        self.inner.contains(entry)
    }

    fn list_all(&self) -> PipelineResult<Vec<PendingEntry>> {
        Ok(self.listing.clone())
    }

    fn remove_exact(&self, entry: &PendingEntry) -> PipelineResult<bool> {
        self.inner.remove_exact(entry)
    }

    fn clear(&self) -> PipelineResult<()> {
        self.inner.clear()
    }
}

struct FixedPredictor(HashMap<RecordId, i64>);

impl BatchPredictor for FixedPredictor {
    fn predict(&self, _rows: &[FeatureRow]) -> PipelineResult<HashMap<RecordId, i64>> {
        Ok(self.0.clone())
    }
}

struct Harness {
    _dir: TempDir,
    records: Arc<SqliteRecordStore>,
    pending: Arc<SledPendingSet>,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let records = Arc::new(SqliteRecordStore::new(dir.path().join("records.sqlite")).unwrap());
        let pending = Arc::new(SledPendingSet::temporary().unwrap());
        Self {
            _dir: dir,
            records,
            pending,
        }
    }

    fn seed(&self, ids: &[i64]) {
        for id in ids {
            self.records
                .upsert(&Record::new(*id, format!("audio/session_{id}_talk.wav")))
                .unwrap();
        }
    }

    fn pipeline(&self, asr: Arc<dyn AsrGateway>, batch: usize) -> Pipeline {
        Pipeline::new(
            self.records.clone(),
            self.pending.clone(),
            asr,
            Arc::new(FixedPredictor(HashMap::new())),
            batch,
        )
    }

    fn completion(&self) -> CompletionHandler {
        CompletionHandler::new(self.records.clone(), self.pending.clone())
    }

    async fn wait_drained(&self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !self.pending.is_empty().unwrap() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("pending set drains");
    }
}

fn path(id: i64) -> String {
    format!("audio/session_{id}_talk.wav")
}

#[tokio::test]
async fn seeding_is_bounded_and_skipped_while_draining() {
    let h = Harness::new();
    h.seed(&[1, 2, 3]);
    let gate = Arc::new(Notify::new());
    let asr = Arc::new(ScriptedAsr::default().gated(gate.clone()));
    let pipeline = h.pipeline(asr, 2);

    let status = pipeline.dispatcher.tick().unwrap();
    assert_eq!(status, DispatchStatus::Seeded { inserted: 2 });
    assert_eq!(status.to_string(), "seeded new batch (2)");
    let ids: Vec<_> = h.pending.list_all().unwrap().iter().map(|e| e.record_id).collect();
    assert_eq!(ids, vec![RecordId(1), RecordId(2)]);

    for _ in 0..3 {
        let status = pipeline.dispatcher.tick().unwrap();
        assert!(matches!(status, DispatchStatus::AlreadyDraining { pending: 2, .. }));
    }
    assert_eq!(h.pending.len().unwrap(), 2);
    gate.notify_waiters();
}

#[tokio::test]
async fn worker_round_trip_cleans_text_and_removes_entry() {
    let h = Harness::new();
    h.seed(&[10, 11]);
    let asr = Arc::new(
        ScriptedAsr::default()
            .reply(&path(10), vec![Ok("Здравствуйте!   Запись НА консультацию.".into())])
            .reply(&path(11), vec![Ok("hello".into())]),
    );
    let pipeline = h.pipeline(asr, 2);

    pipeline.dispatcher.tick().unwrap();
    h.wait_drained().await;

    let first = h.records.get_by_id(RecordId(10)).unwrap().unwrap();
    assert!(first.transcribed);
    assert_eq!(first.transcription_text, "здравствуйте запись на консультацию");
    let second = h.records.get_by_id(RecordId(11)).unwrap().unwrap();
    assert!(second.transcribed);
    assert_eq!(second.transcription_text, NO_ANSWER);

    assert_eq!(pipeline.dispatcher.tick().unwrap(), DispatchStatus::NothingEligible);
}

#[tokio::test]
async fn failed_transcription_stays_pending_and_is_retried() {
    let h = Harness::new();
    h.seed(&[20]);
    let asr = Arc::new(ScriptedAsr::default().reply(
        &path(20),
        vec![Err(AsrError::Exhausted { rounds: 1 }), Ok("вторая попытка".into())],
    ));
    let pipeline = h.pipeline(asr.clone(), 2);

    pipeline.dispatcher.tick().unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while pipeline.worker.in_flight() > 0 || asr.calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(h.pending.len().unwrap(), 1);
    assert!(!h.records.get_by_id(RecordId(20)).unwrap().unwrap().transcribed);

    let status = pipeline.dispatcher.tick().unwrap();
    assert!(matches!(
        status,
        DispatchStatus::AlreadyDraining { pending: 1, redispatched: 1 }
    ));
    h.wait_drained().await;
    let record = h.records.get_by_id(RecordId(20)).unwrap().unwrap();
    assert_eq!(record.transcription_text, "вторая попытка");
}

#[tokio::test]
async fn in_flight_entries_are_not_dispatched_twice() {
    let h = Harness::new();
    h.seed(&[30]);
    let gate = Arc::new(Notify::new());
    let asr = Arc::new(
        ScriptedAsr::default()
            .reply(&path(30), vec![Ok("один".into())])
            .gated(gate.clone()),
    );
    let pipeline = h.pipeline(asr.clone(), 2);

    pipeline.dispatcher.tick().unwrap();
    let again = pipeline.worker.run().unwrap();
    assert_eq!(again.dispatched, 0);
    assert_eq!(again.skipped_in_flight, 1);

    tokio::time::timeout(Duration::from_secs(5), async {
        while asr.calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    gate.notify_one();
    h.wait_drained().await;
    assert_eq!(asr.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stale_listing_does_not_resubmit_completed_entry() {
    let h = Harness::new();
    h.seed(&[50]);
    let entry = PendingEntry::new(RecordId(50), path(50));
    h.pending.insert_if_absent(&entry).unwrap();

    let asr = Arc::new(ScriptedAsr::default().reply(&path(50), vec![Ok("готово".into())]));
    let frozen = Arc::new(FrozenListing {
        inner: h.pending.clone(),
        listing: h.pending.list_all().unwrap(),
    });
    let worker = TranscriptionWorker::new(frozen, asr.clone(), Arc::new(h.completion()));

    let first = worker.run().unwrap();
    assert_eq!(first.dispatched, 1);
    let outcomes = first.join().await;
    assert!(matches!(outcomes[0], Ok(CompletionOutcome::Completed { removed: true, .. })));
    assert!(h.pending.is_empty().unwrap());

    let second = worker.run().unwrap();
    assert_eq!(second.dispatched, 0);
    assert_eq!(second.skipped_completed, 1);
    assert!(second.join().await.is_empty());
    assert_eq!(asr.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn completion_is_idempotent() {
    let h = Harness::new();
    h.seed(&[40]);
    let entry = PendingEntry::new(RecordId(40), path(40));
    assert!(h.pending.insert_if_absent(&entry).unwrap());
    let handler = h.completion();
    let outcome = TranscriptionOutcome {
        entry: entry.clone(),
        result: Some("Первый ответ".into()),
    };

    assert_eq!(
        handler.complete(outcome.clone()).unwrap(),
        CompletionOutcome::Completed {
            text: "первый ответ".into(),
            removed: true
        }
    );
    assert_eq!(
        handler
            .complete(TranscriptionOutcome {
                entry,
                result: Some("другой".into())
            })
            .unwrap(),
        CompletionOutcome::AlreadyTranscribed { removed: false }
    );
    let record = h.records.get_by_id(RecordId(40)).unwrap().unwrap();
    assert_eq!(record.transcription_text, "первый ответ");
    assert!(h.pending.is_empty().unwrap());
}

#[tokio::test]
async fn missing_record_and_missing_result_stay_pending() {
    let h = Harness::new();
    let ghost = PendingEntry::new(RecordId(99), path(99));
    h.pending.insert_if_absent(&ghost).unwrap();
    let handler = h.completion();

    let not_found = handler
        .complete(TranscriptionOutcome {
            entry: ghost.clone(),
            result: Some("текст".into()),
        })
        .unwrap();
    assert_eq!(not_found, CompletionOutcome::NotFound);

    let skipped = handler
        .complete(TranscriptionOutcome {
            entry: ghost.clone(),
            result: None,
        })
        .unwrap();
    assert_eq!(skipped, CompletionOutcome::Skipped);
    assert_eq!(h.pending.list_all().unwrap(), vec![ghost]);
}

#[tokio::test]
async fn updater_scores_only_predicted_ids() {
    let h = Harness::new();
    for id in 1..=5 {
        h.records
            .upsert(&Record::new(id, path(id)))
            .unwrap();
        h.records.update_transcription(RecordId(id), "текст").unwrap();
    }
    let scores: HashMap<_, _> = [(RecordId(1), 1), (RecordId(3), 0), (RecordId(5), 1)].into();
    let updater = PredictionUpdater::new(h.records.clone(), Arc::new(FixedPredictor(scores)));

    let status = updater.tick().unwrap();
    assert_eq!(status, UpdateStatus::Scored { scored: 3, batch: 5 });
    assert_eq!(status.to_string(), "scored 3 of 5");

    let left: Vec<_> = h
        .records
        .list_eligible_for_scoring()
        .unwrap()
        .into_iter()
        .map(|r| r.call_session)
        .collect();
    assert_eq!(left, vec![RecordId(2), RecordId(4)]);
    assert_eq!(h.records.get_by_id(RecordId(3)).unwrap().unwrap().score, Some(0));
}

#[tokio::test]
async fn updater_without_transcribed_records_is_noop() {
    let h = Harness::new();
    h.seed(&[7]);
    let updater = PredictionUpdater::new(
        h.records.clone(),
        Arc::new(FixedPredictor([(RecordId(7), 1)].into())),
    );
    assert_eq!(updater.tick().unwrap(), UpdateStatus::NothingToScore);
    assert_eq!(h.records.get_by_id(RecordId(7)).unwrap().unwrap().score, None);
}
