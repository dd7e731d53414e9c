//! Record Store: SQLite-backed `records` table.
//!
//! Every operation opens its own connection (WAL journal, busy timeout), so the
//! dispatch flow and the scoring flow can share one database file without an
//! in-process lock.

use crate::error::PipelineResult;
use crate::record::{Record, RecordId};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const RECORD_COLUMNS: &str = "call_session, audio_path, project_id, project_name, status, call_type, \
     site, visitor_type, scenario, operations, device_type, first_ad_campaign, net_duration_secs, \
     request_number, visitor_id, transcription_text, transcribed, score, score_delivered, created_at";

/// Result of writing a transcription back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptionUpdate {
    /// Text written and `transcribed` flipped to true.
    Updated,
    /// Row exists but was already transcribed; nothing written.
    AlreadyTranscribed,
    NotFound,
}

/// Narrow storage interface consumed by the pipeline.
pub trait RecordStore: Send + Sync {
    /// Untranscribed records, lowest id first, at most `limit`.
    fn list_eligible_for_transcription(&self, limit: usize) -> PipelineResult<Vec<Record>>;

    fn get_by_id(&self, id: RecordId) -> PipelineResult<Option<Record>>;

    /// Write `text` and set `transcribed = true`. Never overwrites an earlier transcription.
    fn update_transcription(&self, id: RecordId, text: &str) -> PipelineResult<TranscriptionUpdate>;

    /// Records with `transcribed = true` and `score_delivered = false`.
    fn list_eligible_for_scoring(&self) -> PipelineResult<Vec<Record>>;

    /// Set `score` and `score_delivered = true` for every id in `scores`, in one
    /// transaction. Returns the number of rows changed.
    fn update_scores_batch(&self, scores: &HashMap<RecordId, i64>) -> PipelineResult<usize>;

    /// Insert or refresh a record's descriptive fields. Pipeline state
    /// (transcription, score) of an existing row is preserved.
    fn upsert(&self, record: &Record) -> PipelineResult<()>;
}

/// SQLite implementation of [`RecordStore`].
pub struct SqliteRecordStore {
    db_path: PathBuf,
}

impl SqliteRecordStore {
    /// Open or create the database and ensure the `records` table exists.
    pub fn new(db_path: impl Into<PathBuf>) -> PipelineResult<Self> {
        let this = Self {
            db_path: db_path.into(),
        };
        this.init()?;
        Ok(this)
    }

    fn open(&self) -> PipelineResult<Connection> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    fn init(&self) -> PipelineResult<()> {
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = self.open()?;
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        debug!(journal_mode = %mode, path = %self.db_path.display(), "Record store opened");

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                call_session INTEGER PRIMARY KEY,
                audio_path TEXT NOT NULL,
                project_id INTEGER NULL,
                project_name TEXT NULL,
                status TEXT NULL,
                call_type TEXT NULL,
                site TEXT NULL,
                visitor_type TEXT NULL,
                scenario TEXT NULL,
                operations TEXT NULL,
                device_type TEXT NULL,
                first_ad_campaign TEXT NULL,
                net_duration_secs INTEGER NOT NULL DEFAULT 0,
                request_number REAL NOT NULL DEFAULT 0,
                visitor_id INTEGER NULL,
                transcription_text TEXT NOT NULL DEFAULT 'no-answer',
                transcribed INTEGER NOT NULL DEFAULT 0,
                score INTEGER NULL,
                score_delivered INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_records_transcribed ON records(transcribed);
            CREATE INDEX IF NOT EXISTS idx_records_scoring ON records(transcribed, score_delivered);
            "#,
        )?;
        Ok(())
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<Record> {
        Ok(Record {
            call_session: RecordId(row.get(0)?),
            audio_path: row.get(1)?,
            project_id: row.get(2)?,
            project_name: row.get(3)?,
            status: row.get(4)?,
            call_type: row.get(5)?,
            site: row.get(6)?,
            visitor_type: row.get(7)?,
            scenario: row.get(8)?,
            operations: row.get(9)?,
            device_type: row.get(10)?,
            first_ad_campaign: row.get(11)?,
            net_duration_secs: row.get(12)?,
            request_number: row.get(13)?,
            visitor_id: row.get(14)?,
            transcription_text: row.get(15)?,
            transcribed: row.get(16)?,
            score: row.get(17)?,
            score_delivered: row.get(18)?,
            created_at: row.get(19)?,
        })
    }

    fn query_records(
        &self,
        where_clause: &str,
        params: impl rusqlite::Params,
    ) -> PipelineResult<Vec<Record>> {
        let conn = self.open()?;
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records {where_clause}");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params, Self::map_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl RecordStore for SqliteRecordStore {
    fn list_eligible_for_transcription(&self, limit: usize) -> PipelineResult<Vec<Record>> {
        let records = self.query_records(
            "WHERE transcribed = 0 ORDER BY call_session LIMIT ?1",
            params![limit as i64],
        )?;
        debug!(count = records.len(), "records to transcribe");
        Ok(records)
    }

    fn get_by_id(&self, id: RecordId) -> PipelineResult<Option<Record>> {
        let conn = self.open()?;
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE call_session = ?1");
        Ok(conn
            .query_row(&sql, params![id.0], Self::map_row)
            .optional()?)
    }

    fn update_transcription(&self, id: RecordId, text: &str) -> PipelineResult<TranscriptionUpdate> {
        let conn = self.open()?;
        let changed = conn.execute(
            "UPDATE records SET transcription_text = ?1, transcribed = 1 \
             WHERE call_session = ?2 AND transcribed = 0",
            params![text, id.0],
        )?;
        if changed > 0 {
            return Ok(TranscriptionUpdate::Updated);
        }
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM records WHERE call_session = ?1",
                params![id.0],
                |row| row.get(0),
            )
            .optional()?;
        Ok(match exists {
            Some(_) => TranscriptionUpdate::AlreadyTranscribed,
            None => TranscriptionUpdate::NotFound,
        })
    }

    fn list_eligible_for_scoring(&self) -> PipelineResult<Vec<Record>> {
        let records = self.query_records(
            "WHERE transcribed = 1 AND score_delivered = 0 ORDER BY call_session",
            [],
        )?;
        debug!(count = records.len(), "records for predict");
        Ok(records)
    }

    fn update_scores_batch(&self, scores: &HashMap<RecordId, i64>) -> PipelineResult<usize> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE records SET score = ?1, score_delivered = 1 \
                 WHERE call_session = ?2 AND score_delivered = 0",
            )?;
            for (id, score) in scores {
                changed += stmt.execute(params![score, id.0])?;
            }
        }
        tx.commit()?;
        info!(changed, requested = scores.len(), "scores committed");
        Ok(changed)
    }

    fn upsert(&self, record: &Record) -> PipelineResult<()> {
        let conn = self.open()?;
        conn.execute(
            r#"
            INSERT INTO records (call_session, audio_path, project_id, project_name, status, call_type,
                site, visitor_type, scenario, operations, device_type, first_ad_campaign,
                net_duration_secs, request_number, visitor_id, transcription_text, transcribed,
                score, score_delivered, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
            ON CONFLICT(call_session) DO UPDATE SET
                audio_path = CASE WHEN records.transcribed = 0 THEN excluded.audio_path ELSE records.audio_path END,
                project_id = excluded.project_id,
                project_name = excluded.project_name,
                status = excluded.status,
                call_type = excluded.call_type,
                site = excluded.site,
                visitor_type = excluded.visitor_type,
                scenario = excluded.scenario,
                operations = excluded.operations,
                device_type = excluded.device_type,
                first_ad_campaign = excluded.first_ad_campaign,
                net_duration_secs = excluded.net_duration_secs,
                request_number = excluded.request_number,
                visitor_id = excluded.visitor_id
            "#,
            params![
                record.call_session.0,
                record.audio_path,
                record.project_id,
                record.project_name,
                record.status,
                record.call_type,
                record.site,
                record.visitor_type,
                record.scenario,
                record.operations,
                record.device_type,
                record.first_ad_campaign,
                record.net_duration_secs,
                record.request_number,
                record.visitor_id,
                record.transcription_text,
                record.transcribed,
                record.score,
                record.score_delivered,
                record.created_at,
            ],
        )?;
        Ok(())
    }
}
