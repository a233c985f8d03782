//! In-memory cache store implementation.
//!
//! Useful for testing; nothing survives the process.

use super::{CacheEntry, CacheStore, CacheSummary, SortKey};
use crate::batch::BatchJobRecord;
use crate::error::{HarkError, Result};
use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

fn poisoned(e: impl std::fmt::Display) -> HarkError {
    HarkError::Storage(format!("Cache lock poisoned: {}", e))
}

/// In-memory cache store.
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<Fingerprint, CacheEntry>>,
    jobs: RwLock<HashMap<String, BatchJobRecord>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Number of cached transcripts.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(fingerprint).cloned())
    }

    async fn put(&self, entry: &CacheEntry) -> Result<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert(entry.fingerprint.clone(), entry.clone());
        Ok(())
    }

    async fn list(&self, limit: usize, sort: SortKey) -> Result<Vec<CacheSummary>> {
        let entries = self.entries.read().map_err(poisoned)?;
        let mut summaries: Vec<CacheSummary> = entries.values().map(CacheEntry::summary).collect();
        sort.sort(&mut summaries);
        summaries.truncate(limit);
        Ok(summaries)
    }

    async fn put_job(&self, job: &BatchJobRecord) -> Result<()> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        jobs.insert(job.name.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, name: &str) -> Result<Option<BatchJobRecord>> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        Ok(jobs.get(name).cloned())
    }

    async fn list_jobs(&self, limit: usize) -> Result<Vec<BatchJobRecord>> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        let mut list: Vec<BatchJobRecord> = jobs.values().cloned().collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list.truncate(limit);
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support;
    use super::*;

    #[tokio::test]
    async fn test_memory_store_contract() {
        let store = MemoryCacheStore::new();
        test_support::store_contract(&store).await;
        assert_eq!(store.len(), 3);
    }
}
