//! One-JSON-file-per-entry cache store.
//!
//! Records live at `<dir>/<fingerprint>.json`, batch jobs under `<dir>/jobs/`.
//! Writes go to a temp file in the same directory and are renamed into place,
//! so a reader never sees a half-written record. Records written by older
//! releases (32-char keys, plain-text transcript) are still readable.
//! Disk access runs on the blocking pool, never on a runtime worker.

use super::{CacheEntry, CacheStore, CacheSummary, SortKey};
use crate::batch::BatchJobRecord;
use crate::error::{HarkError, Result};
use crate::fingerprint::{Fingerprint, SourceType};
use crate::transcript::parse_timestamped;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, instrument, warn};

/// File-backed cache store.
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir.join("jobs"))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn record_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{}.json", fingerprint))
    }

    fn job_path(&self, name: &str) -> PathBuf {
        let file_name: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join("jobs").join(format!("{}.json", file_name))
    }
}

/// Run filesystem work on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| HarkError::Storage(format!("Cache task failed: {}", e)))?
}

/// All record files in `dir`, in no particular order.
fn record_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for dirent in std::fs::read_dir(dir)? {
        let path = dirent?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    Ok(files)
}

/// Write serialized JSON to `path` via rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| HarkError::Storage(format!("No parent directory for {:?}", path)))?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| HarkError::Io(e.error))?;
    Ok(())
}

/// Record layout written by older releases.
#[derive(Deserialize)]
struct LegacyRecord {
    transcript: String,
    #[serde(default)]
    metadata: LegacyMetadata,
    cached_at: String,
}

#[derive(Deserialize, Default)]
struct LegacyMetadata {
    source_type: Option<String>,
    source: Option<String>,
    title: Option<String>,
}

impl LegacyRecord {
    fn into_entry(self, fingerprint: Fingerprint) -> Result<CacheEntry> {
        let created_at = NaiveDateTime::parse_from_str(&self.cached_at, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| corrupt(fingerprint.as_str(), e))?;
        let source_type = self
            .metadata
            .source_type
            .as_deref()
            .unwrap_or("podcast")
            .parse::<SourceType>()
            .map_err(|e| corrupt(fingerprint.as_str(), e))?;
        let content = parse_timestamped(&self.transcript);
        let duration = content.duration_seconds();

        Ok(CacheEntry {
            source_type,
            source: self.metadata.source.unwrap_or_default(),
            title: self.metadata.title,
            duration_seconds: (duration > 0.0).then_some(duration),
            created_at,
            content,
            fingerprint,
        })
    }
}

/// Current record layout with the transcript body skipped.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryRecord {
    fingerprint: Fingerprint,
    source_type: SourceType,
    source: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    duration_seconds: Option<f64>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    content_length: Option<usize>,
    #[allow(dead_code)]
    content: IgnoredAny,
}

/// On-disk layout: the entry plus its precomputed length for cheap listing.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord<'a> {
    #[serde(flatten)]
    entry: &'a CacheEntry,
    content_length: usize,
}

fn corrupt(context: &str, e: impl std::fmt::Display) -> HarkError {
    HarkError::Storage(format!("Corrupt cache record {}: {}", context, e))
}

fn fingerprint_from_path(path: &Path) -> Result<Fingerprint> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| corrupt(&path.display().to_string(), "unreadable file name"))?
        .parse()
}

/// Read a full record, accepting the legacy layout.
fn read_entry(path: &Path, fingerprint: &Fingerprint) -> Result<CacheEntry> {
    let raw = std::fs::read_to_string(path)?;
    match serde_json::from_str::<CacheEntry>(&raw) {
        Ok(entry) => Ok(entry),
        Err(current_err) => match serde_json::from_str::<LegacyRecord>(&raw) {
            Ok(legacy) => legacy.into_entry(fingerprint.clone()),
            Err(_) => Err(corrupt(fingerprint.as_str(), current_err)),
        },
    }
}

/// Read only the summary fields of a record.
fn read_summary(path: &Path) -> Result<CacheSummary> {
    let fingerprint = fingerprint_from_path(path)?;
    let reader = BufReader::new(std::fs::File::open(path)?);

    match serde_json::from_reader::<_, SummaryRecord>(reader) {
        Ok(record) => {
            if let Some(length) = record.content_length {
                return Ok(CacheSummary {
                    fingerprint: record.fingerprint,
                    source_type: record.source_type,
                    source: record.source,
                    title: record.title,
                    duration_seconds: record.duration_seconds,
                    created_at: record.created_at,
                    content_length: length,
                });
            }
            Ok(read_entry(path, &fingerprint)?.summary())
        }
        Err(_) => Ok(read_entry(path, &fingerprint)?.summary()),
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    fn name(&self) -> &'static str {
        "file"
    }

    #[instrument(skip(self), fields(fingerprint = %fingerprint))]
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        let path = self.record_path(fingerprint);
        let key = fingerprint.clone();
        let entry = blocking(move || {
            if !path.exists() {
                return Ok(None);
            }
            read_entry(&path, &key).map(Some)
        })
        .await?;

        debug!("{}", if entry.is_some() { "Cache hit" } else { "Cache miss" });
        Ok(entry)
    }

    #[instrument(skip(self, entry), fields(fingerprint = %entry.fingerprint))]
    async fn put(&self, entry: &CacheEntry) -> Result<()> {
        let record = StoredRecord {
            entry,
            content_length: entry.content_length(),
        };
        let bytes = serde_json::to_vec_pretty(&record)?;
        let path = self.record_path(&entry.fingerprint);
        blocking(move || write_atomic(&path, &bytes)).await?;
        debug!("Stored transcript");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list(&self, limit: usize, sort: SortKey) -> Result<Vec<CacheSummary>> {
        let dir = self.dir.clone();
        let mut summaries = blocking(move || {
            let mut summaries = Vec::new();
            for path in record_files(&dir)? {
                match read_summary(&path) {
                    Ok(summary) => summaries.push(summary),
                    Err(HarkError::Io(e)) => return Err(HarkError::Io(e)),
                    Err(e) => warn!("Skipping unreadable cache record {:?}: {}", path, e),
                }
            }
            Ok(summaries)
        })
        .await?;

        sort.sort(&mut summaries);
        summaries.truncate(limit);
        Ok(summaries)
    }

    #[instrument(skip(self, job), fields(job = %job.name))]
    async fn put_job(&self, job: &BatchJobRecord) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(job)?;
        let path = self.job_path(&job.name);
        blocking(move || write_atomic(&path, &bytes)).await
    }

    #[instrument(skip(self))]
    async fn get_job(&self, name: &str) -> Result<Option<BatchJobRecord>> {
        let path = self.job_path(name);
        let raw = blocking(move || {
            if !path.exists() {
                return Ok(None);
            }
            Ok(Some(std::fs::read_to_string(&path)?))
        })
        .await?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw).map_err(|e| corrupt(name, e))?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn list_jobs(&self, limit: usize) -> Result<Vec<BatchJobRecord>> {
        let jobs_dir = self.dir.join("jobs");
        let mut jobs = blocking(move || {
            let mut jobs: Vec<BatchJobRecord> = Vec::new();
            for dirent in std::fs::read_dir(&jobs_dir)? {
                let path = dirent?.path();
                if path.extension().map_or(true, |ext| ext != "json") {
                    continue;
                }
                let raw = std::fs::read_to_string(&path)?;
                match serde_json::from_str(&raw) {
                    Ok(job) => jobs.push(job),
                    Err(e) => warn!("Skipping unreadable job record {:?}: {}", path, e),
                }
            }
            Ok(jobs)
        })
        .await?;

        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support;
    use super::*;

    #[tokio::test]
    async fn test_file_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path()).unwrap();
        test_support::store_contract(&store).await;
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path()).unwrap();
        let entry = test_support::entry("https://cdn.example.com/a.mp3", None, None);
        store.put(&entry).await.unwrap();
        store.put(&entry).await.unwrap();

        let files = record_files(dir.path()).unwrap();
        assert_eq!(files, vec![store.record_path(&entry.fingerprint)]);
    }

    #[tokio::test]
    async fn test_corrupt_record_errors_on_lookup_and_is_skipped_in_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path()).unwrap();
        let good = test_support::entry("https://cdn.example.com/a.mp3", None, None);
        store.put(&good).await.unwrap();

        let bad: Fingerprint = "ab".repeat(32).parse().unwrap();
        std::fs::write(store.record_path(&bad), "{\"truncated\": ").unwrap();

        assert!(matches!(store.lookup(&bad).await, Err(HarkError::Storage(_))));

        let listed = store.list(10, SortKey::CreatedDesc).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].fingerprint, good.fingerprint);
    }

    #[tokio::test]
    async fn test_reads_legacy_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path()).unwrap();
        let key: Fingerprint = "0123456789abcdef0123456789abcdef".parse().unwrap();

        let legacy = serde_json::json!({
            "transcript": "[00:00] Speaker A: Welcome back.\n[01:30] Speaker B: Thanks for having me.",
            "metadata": {
                "source_type": "podcast",
                "source": "https://cdn.example.com/old.mp3",
                "title": "Old Episode"
            },
            "cached_at": "2024-03-01T09:15:00.123456",
            "cache_key": "0123456789abcdef0123456789abcdef"
        });
        std::fs::write(store.record_path(&key), legacy.to_string()).unwrap();

        let entry = store.lookup(&key).await.unwrap().unwrap();
        assert_eq!(entry.title.as_deref(), Some("Old Episode"));
        assert_eq!(entry.source_type, SourceType::Podcast);
        assert_eq!(entry.content.segments.len(), 2);
        assert_eq!(entry.content.segments[1].speaker.as_deref(), Some("Speaker B"));

        let listed = store.list(10, SortKey::Title).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].fingerprint, key);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_concurrent_access_on_single_thread_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path()).unwrap();
        let a = test_support::entry("https://cdn.example.com/a.mp3", Some("A"), None);
        let b = test_support::entry("https://cdn.example.com/b.mp3", Some("B"), None);

        let missing_fp = Fingerprint::compute(
            SourceType::Podcast,
            "https://cdn.example.com/c.mp3",
            &crate::fingerprint::TranscribeOptions::default(),
        );
        let (put_a, put_b, missing) = tokio::join!(
            store.put(&a),
            store.put(&b),
            store.lookup(&missing_fp),
        );
        put_a.unwrap();
        put_b.unwrap();
        assert!(missing.unwrap().is_none());

        let (found_a, found_b, listed) = tokio::join!(
            store.lookup(&a.fingerprint),
            store.lookup(&b.fingerprint),
            store.list(10, SortKey::Title),
        );
        assert_eq!(found_a.unwrap().unwrap().title.as_deref(), Some("A"));
        assert_eq!(found_b.unwrap().unwrap().title.as_deref(), Some("B"));
        assert_eq!(listed.unwrap().len(), 2);
    }

    #[test]
    fn test_job_path_is_flat() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path()).unwrap();
        let path = store.job_path("batches/abc-123");
        assert_eq!(path, dir.path().join("jobs").join("batches_abc-123.json"));
    }
}
