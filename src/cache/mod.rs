//! Transcript cache.
//!
//! Provides a trait-based interface over durable stores keyed by
//! [`Fingerprint`]. Entries are never evicted. Stores also keep the metadata of
//! submitted batch jobs so results can be collected after a restart.

mod file;
mod memory;
mod sqlite;

pub use file::FileCacheStore;
pub use memory::MemoryCacheStore;
pub use sqlite::SqliteCacheStore;

use crate::batch::BatchJobRecord;
use crate::config::{CacheProvider, Settings};
use crate::error::Result;
use crate::fingerprint::{Fingerprint, SourceType};
use crate::transcript::Transcript;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A cached transcript with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub source_type: SourceType,
    /// Normalized locator (video ID or canonical audio URL).
    pub source: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub content: Transcript,
}

impl CacheEntry {
    /// Characters of plain transcript text.
    pub fn content_length(&self) -> usize {
        self.content.plain_text().chars().count()
    }

    pub fn summary(&self) -> CacheSummary {
        CacheSummary {
            fingerprint: self.fingerprint.clone(),
            source_type: self.source_type,
            source: self.source.clone(),
            title: self.title.clone(),
            duration_seconds: self.duration_seconds,
            created_at: self.created_at,
            content_length: self.content_length(),
        }
    }
}

/// Cache entry metadata without the transcript body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSummary {
    pub fingerprint: Fingerprint,
    pub source_type: SourceType,
    pub source: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub content_length: usize,
}

/// Listing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Newest first.
    #[default]
    CreatedDesc,
    /// Title ascending, case-insensitive; untitled entries sort by source.
    Title,
    /// Longest first; unknown durations last.
    Duration,
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" | "date" | "recent" => Ok(SortKey::CreatedDesc),
            "title" => Ok(SortKey::Title),
            "duration" | "length" => Ok(SortKey::Duration),
            _ => Err(format!("Unknown sort key: {}. Use created, title, or duration.", s)),
        }
    }
}

impl SortKey {
    /// Sort summaries in place. Ties fall back to newest first.
    pub fn sort(&self, summaries: &mut [CacheSummary]) {
        match self {
            SortKey::CreatedDesc => summaries.sort_by(|a, b| {
                b.created_at
                    .cmp(&a.created_at)
                    .then_with(|| a.fingerprint.cmp(&b.fingerprint))
            }),
            SortKey::Title => summaries.sort_by(|a, b| {
                title_key(a)
                    .cmp(&title_key(b))
                    .then_with(|| b.created_at.cmp(&a.created_at))
            }),
            SortKey::Duration => summaries.sort_by(|a, b| {
                match (a.duration_seconds, b.duration_seconds) {
                    (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(std::cmp::Ordering::Equal),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                }
                .then_with(|| b.created_at.cmp(&a.created_at))
            }),
        }
    }
}

fn title_key(summary: &CacheSummary) -> String {
    summary
        .title
        .as_deref()
        .unwrap_or(&summary.source)
        .to_lowercase()
}

/// Durable transcript store.
///
/// Reads never touch the network. An unreadable record is an error, not a
/// miss.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;

    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>>;

    /// Insert or overwrite. Readers see the old or the new entry, never a mix.
    async fn put(&self, entry: &CacheEntry) -> Result<()>;

    async fn list(&self, limit: usize, sort: SortKey) -> Result<Vec<CacheSummary>>;

    async fn put_job(&self, job: &BatchJobRecord) -> Result<()>;

    async fn get_job(&self, name: &str) -> Result<Option<BatchJobRecord>>;

    /// Newest first.
    async fn list_jobs(&self, limit: usize) -> Result<Vec<BatchJobRecord>>;
}

/// Open the store selected in settings.
pub fn open_store(settings: &Settings) -> Result<Arc<dyn CacheStore>> {
    match settings.cache.provider {
        CacheProvider::Sqlite => Ok(Arc::new(SqliteCacheStore::new(&settings.sqlite_path())?)),
        CacheProvider::File => Ok(Arc::new(FileCacheStore::new(&settings.cache_dir())?)),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_key_parsing() {
        assert_eq!("created".parse::<SortKey>().unwrap(), SortKey::CreatedDesc);
        assert_eq!("Title".parse::<SortKey>().unwrap(), SortKey::Title);
        assert_eq!("duration".parse::<SortKey>().unwrap(), SortKey::Duration);
        assert!("size".parse::<SortKey>().is_err());
    }

    #[test]
    fn test_content_length() {
        let entry = test_support::entry("https://cdn.example.com/a.mp3", None, None);
        assert_eq!(entry.content_length(), "Hello there.\nGeneral Kenobi.".len());
        assert_eq!(entry.summary().content_length, entry.content_length());
    }

    #[test]
    fn test_open_store_by_provider() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.cache.provider = CacheProvider::File;
        settings.cache.dir = dir.path().join("records").to_string_lossy().to_string();
        assert_eq!(open_store(&settings).unwrap().name(), "file");

        settings.cache.provider = CacheProvider::Sqlite;
        settings.cache.sqlite_path = dir.path().join("cache.db").to_string_lossy().to_string();
        assert_eq!(open_store(&settings).unwrap().name(), "sqlite");
    }
}
