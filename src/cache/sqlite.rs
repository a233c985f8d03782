//! SQLite-based cache store implementation.
//!
//! One row per fingerprint. The transcript body is a JSON column; listing
//! selects only the summary columns.

use super::{CacheEntry, CacheStore, CacheSummary, SortKey};
use crate::batch::{BatchJobRecord, BatchState};
use crate::error::{HarkError, Result};
use crate::fingerprint::{Fingerprint, SourceType};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS transcripts (
        fingerprint TEXT PRIMARY KEY,
        source_type TEXT NOT NULL,
        source TEXT NOT NULL,
        title TEXT,
        duration_seconds REAL,
        created_at TEXT NOT NULL,
        content_length INTEGER NOT NULL,
        content_json TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_transcripts_created_at ON transcripts(created_at);

    CREATE TABLE IF NOT EXISTS batch_jobs (
        name TEXT PRIMARY KEY,
        display_name TEXT,
        created_at TEXT NOT NULL,
        state TEXT NOT NULL,
        options_json TEXT NOT NULL,
        targets_json TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
"#;

/// SQLite-based cache store.
pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
}

impl SqliteCacheStore {
    /// Open (or create) a cache database at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL keeps readers off the writer's lock
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite cache at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite cache (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| HarkError::Storage(format!("Failed to acquire lock: {}", e)))
    }
}

fn to_db_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn from_db_time(value: &str, context: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| HarkError::Storage(format!("Corrupt timestamp in {}: {}", context, e)))
}

fn corrupt(context: &str, e: impl std::fmt::Display) -> HarkError {
    HarkError::Storage(format!("Corrupt cache record {}: {}", context, e))
}

/// Summary columns as read from a row, before validation.
struct SummaryRow {
    fingerprint: String,
    source_type: String,
    source: String,
    title: Option<String>,
    duration_seconds: Option<f64>,
    created_at: String,
    content_length: i64,
}

impl SummaryRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            fingerprint: row.get(0)?,
            source_type: row.get(1)?,
            source: row.get(2)?,
            title: row.get(3)?,
            duration_seconds: row.get(4)?,
            created_at: row.get(5)?,
            content_length: row.get(6)?,
        })
    }

    fn into_summary(self) -> Result<CacheSummary> {
        let fingerprint: Fingerprint = self.fingerprint.parse()?;
        let source_type: SourceType = self
            .source_type
            .parse()
            .map_err(|e| corrupt(fingerprint.as_str(), e))?;
        let created_at = from_db_time(&self.created_at, fingerprint.as_str())?;

        Ok(CacheSummary {
            fingerprint,
            source_type,
            source: self.source,
            title: self.title,
            duration_seconds: self.duration_seconds,
            created_at,
            content_length: self.content_length.max(0) as usize,
        })
    }
}

const SUMMARY_COLUMNS: &str =
    "fingerprint, source_type, source, title, duration_seconds, created_at, content_length";

struct JobRow {
    name: String,
    display_name: Option<String>,
    created_at: String,
    state: String,
    options_json: String,
    targets_json: String,
    updated_at: String,
}

impl JobRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            display_name: row.get(1)?,
            created_at: row.get(2)?,
            state: row.get(3)?,
            options_json: row.get(4)?,
            targets_json: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_record(self) -> Result<BatchJobRecord> {
        let state: BatchState = self.state.parse().map_err(|e| corrupt(&self.name, e))?;
        Ok(BatchJobRecord {
            created_at: from_db_time(&self.created_at, &self.name)?,
            updated_at: from_db_time(&self.updated_at, &self.name)?,
            state,
            options: serde_json::from_str(&self.options_json).map_err(|e| corrupt(&self.name, e))?,
            targets: serde_json::from_str(&self.targets_json).map_err(|e| corrupt(&self.name, e))?,
            display_name: self.display_name,
            name: self.name,
        })
    }
}

const JOB_COLUMNS: &str =
    "name, display_name, created_at, state, options_json, targets_json, updated_at";

#[async_trait]
impl CacheStore for SqliteCacheStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    #[instrument(skip(self), fields(fingerprint = %fingerprint))]
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        let conn = self.lock()?;

        let row = conn
            .query_row(
                &format!(
                    "SELECT {}, content_json FROM transcripts WHERE fingerprint = ?1",
                    SUMMARY_COLUMNS
                ),
                params![fingerprint.as_str()],
                |row| Ok((SummaryRow::from_row(row)?, row.get::<_, String>(7)?)),
            )
            .optional()?;

        let Some((summary, content_json)) = row else {
            debug!("Cache miss");
            return Ok(None);
        };

        let summary = summary.into_summary()?;
        let content = serde_json::from_str(&content_json)
            .map_err(|e| corrupt(fingerprint.as_str(), e))?;

        debug!("Cache hit");
        Ok(Some(CacheEntry {
            fingerprint: summary.fingerprint,
            source_type: summary.source_type,
            source: summary.source,
            title: summary.title,
            duration_seconds: summary.duration_seconds,
            created_at: summary.created_at,
            content,
        }))
    }

    #[instrument(skip(self, entry), fields(fingerprint = %entry.fingerprint))]
    async fn put(&self, entry: &CacheEntry) -> Result<()> {
        let content_json = serde_json::to_string(&entry.content)?;
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO transcripts
            (fingerprint, source_type, source, title, duration_seconds, created_at,
             content_length, content_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                entry.fingerprint.as_str(),
                entry.source_type.as_str(),
                entry.source,
                entry.title,
                entry.duration_seconds,
                to_db_time(&entry.created_at),
                entry.content_length() as i64,
                content_json,
            ],
        )?;

        debug!("Stored transcript");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list(&self, limit: usize, sort: SortKey) -> Result<Vec<CacheSummary>> {
        let order_by = match sort {
            SortKey::CreatedDesc => "created_at DESC, fingerprint ASC",
            SortKey::Title => "lower(COALESCE(title, source)) ASC, created_at DESC",
            SortKey::Duration => "duration_seconds IS NULL, duration_seconds DESC, created_at DESC",
        };

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transcripts ORDER BY {} LIMIT ?1",
            SUMMARY_COLUMNS, order_by
        ))?;

        let rows = stmt
            .query_map(params![limit as i64], SummaryRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(SummaryRow::into_summary).collect()
    }

    #[instrument(skip(self, job), fields(job = %job.name))]
    async fn put_job(&self, job: &BatchJobRecord) -> Result<()> {
        let options_json = serde_json::to_string(&job.options)?;
        let targets_json = serde_json::to_string(&job.targets)?;
        let conn = self.lock()?;

        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO batch_jobs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                JOB_COLUMNS
            ),
            params![
                job.name,
                job.display_name,
                to_db_time(&job.created_at),
                job.state.as_str(),
                options_json,
                targets_json,
                to_db_time(&job.updated_at),
            ],
        )?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_job(&self, name: &str) -> Result<Option<BatchJobRecord>> {
        let conn = self.lock()?;

        let row = conn
            .query_row(
                &format!("SELECT {} FROM batch_jobs WHERE name = ?1", JOB_COLUMNS),
                params![name],
                JobRow::from_row,
            )
            .optional()?;

        row.map(JobRow::into_record).transpose()
    }

    #[instrument(skip(self))]
    async fn list_jobs(&self, limit: usize) -> Result<Vec<BatchJobRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM batch_jobs ORDER BY created_at DESC LIMIT ?1",
            JOB_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![limit as i64], JobRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(JobRow::into_record).collect()
    }
}
