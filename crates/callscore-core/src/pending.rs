//! Pending-Set Store: durable, deduplicated set of records in flight for transcription.
//!
//! Backed by a sled tree keyed by the record id (big-endian `i64`). The value is
//! the JSON-serialized [`PendingEntry`]. Insert and remove are both
//! compare-and-swap operations, so overlapping ticks see atomic results:
//! a second insert for the same id is a no-op, and removal only succeeds when
//! the stored entry matches the expected one byte for byte.

use crate::error::PipelineResult;
use crate::record::{Record, RecordId};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

const PENDING_TREE: &str = "records_for_transcribe";

/// One record handed to the transcription worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingEntry {
    pub record_id: RecordId,
    pub audio_path: String,
}

impl PendingEntry {
    pub fn new(record_id: RecordId, audio_path: impl Into<String>) -> Self {
        Self {
            record_id,
            audio_path: audio_path.into(),
        }
    }

    pub fn from_record(record: &Record) -> Self {
        Self::new(record.call_session, record.audio_path.clone())
    }

    fn to_value(&self) -> PipelineResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Set semantics over pending entries, shared across processes and ticks.
pub trait PendingSet: Send + Sync {
    fn len(&self) -> PipelineResult<usize>;

    fn is_empty(&self) -> PipelineResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Insert unless an entry with the same record id exists. Returns true when inserted.
    fn insert_if_absent(&self, entry: &PendingEntry) -> PipelineResult<bool>;

    /// True when the stored entry for `entry.record_id` equals `entry`.
    fn contains(&self, entry: &PendingEntry) -> PipelineResult<bool>;

    /// Snapshot of every entry, in key (record id) order.
    fn list_all(&self) -> PipelineResult<Vec<PendingEntry>>;

    /// Remove the entry only if the stored one equals `entry`. Returns true when removed.
    fn remove_exact(&self, entry: &PendingEntry) -> PipelineResult<bool>;

    /// Drop every entry (operator reset).
    fn clear(&self) -> PipelineResult<()>;
}

/// sled implementation of [`PendingSet`].
pub struct SledPendingSet {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledPendingSet {
    /// Open (or create) the pending set at `path`.
    pub fn open(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Throwaway store removed on drop. Used by tests and dry runs.
    pub fn temporary() -> PipelineResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> PipelineResult<Self> {
        let tree = db.open_tree(PENDING_TREE)?;
        Ok(Self { db, tree })
    }

    /// Entry currently stored for `id`, if any.
    pub fn get(&self, id: RecordId) -> PipelineResult<Option<PendingEntry>> {
        match self.tree.get(id.to_key())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn flush(&self) -> PipelineResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl PendingSet for SledPendingSet {
    fn len(&self) -> PipelineResult<usize> {
        Ok(self.tree.len())
    }

    fn insert_if_absent(&self, entry: &PendingEntry) -> PipelineResult<bool> {
        let value = entry.to_value()?;
        let swapped = self
            .tree
            .compare_and_swap(entry.record_id.to_key(), None::<&[u8]>, Some(value))?;
        let inserted = swapped.is_ok();
        if inserted {
            self.flush()?;
        }
        Ok(inserted)
    }

    fn contains(&self, entry: &PendingEntry) -> PipelineResult<bool> {
        let expected = entry.to_value()?;
        Ok(self
            .tree
            .get(entry.record_id.to_key())?
            .is_some_and(|stored| stored.as_ref() == expected.as_slice()))
    }

    fn list_all(&self) -> PipelineResult<Vec<PendingEntry>> {
        let mut entries = Vec::new();
        for item in self.tree.iter() {
            let (key, value) = item?;
            match serde_json::from_slice::<PendingEntry>(&value) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(key = ?RecordId::from_key(&key), error = %e, "Skipping unreadable pending entry");
                }
            }
        }
        Ok(entries)
    }

    fn remove_exact(&self, entry: &PendingEntry) -> PipelineResult<bool> {
        let expected = entry.to_value()?;
        let swapped = self.tree.compare_and_swap(
            entry.record_id.to_key(),
            Some(expected.as_slice()),
            None::<sled::IVec>,
        )?;
        let removed = swapped.is_ok();
        if removed {
            self.flush()?;
        }
        Ok(removed)
    }

    fn clear(&self) -> PipelineResult<()> {
        self.tree.clear()?;
        self.flush()
    }
}
