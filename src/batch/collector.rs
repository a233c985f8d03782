//! Correlate a finished job's results to its targets and fill the cache.

use super::{
    BatchJobManager, BatchJobRecord, BatchService, BatchState, ResultRecord, TargetDescriptor,
};
use crate::cache::{CacheEntry, CacheStore, CacheSummary};
use crate::error::{HarkError, Result};
use crate::fingerprint::{Fingerprint, SourceType, TranscribeOptions};
use crate::source::{canonical_audio_url, title_from_url};
use crate::transcript::parse_timestamped;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// What happened to one target of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum TargetResult {
    /// Transcript stored in the cache.
    Transcribed(CacheSummary),
    /// The service reported an error for this item, or returned no text.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub index: usize,
    pub target: TargetDescriptor,
    pub result: TargetResult,
}

impl TargetOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.result, TargetResult::Transcribed(_))
    }
}

fn invalid(job: &str, message: String) -> HarkError {
    HarkError::InvalidState {
        job: job.to_string(),
        state: BatchState::Succeeded.to_string(),
        message,
    }
}

/// Index encoded in a request key such as `target-3`.
fn key_index(key: &str) -> Option<usize> {
    key.rsplit_once('-')?.1.parse().ok()
}

/// Put result records in target order.
///
/// Keyed records are placed by their key and must cover `0..expected`
/// exactly once. Keyless records are taken in the order received. Every
/// check runs before anything is written.
pub(crate) fn correlate(
    job: &str,
    expected: usize,
    records: Vec<ResultRecord>,
) -> Result<Vec<ResultRecord>> {
    if records.len() != expected {
        return Err(invalid(
            job,
            format!("expected {} results, got {}", expected, records.len()),
        ));
    }

    for (position, record) in records.iter().enumerate() {
        if record.text.is_none() && record.error.is_none() {
            return Err(invalid(
                job,
                format!("result {} has neither a response nor an error", position),
            ));
        }
    }

    let keyed = records.iter().filter(|r| r.key.is_some()).count();
    if keyed == 0 {
        return Ok(records);
    }
    if keyed != records.len() {
        return Err(invalid(
            job,
            format!("{} of {} results carry a request key", keyed, records.len()),
        ));
    }

    let mut slots: Vec<Option<ResultRecord>> = vec![None; expected];
    for record in records {
        let key = record.key.clone().unwrap_or_default();
        let index = key_index(&key)
            .ok_or_else(|| invalid(job, format!("unrecognized result key '{}'", key)))?;
        if index >= expected {
            return Err(invalid(
                job,
                format!("result key '{}' is outside 0..{}", key, expected),
            ));
        }
        if slots[index].is_some() {
            return Err(invalid(job, format!("duplicate result key '{}'", key)));
        }
        slots[index] = Some(record);
    }

    // Count matched and no duplicates, so every slot is filled.
    Ok(slots.into_iter().flatten().collect())
}

impl BatchJobManager {
    /// Collect the results of a succeeded job into the cache.
    ///
    /// Outcomes are returned in submission order. Per-item failures are
    /// reported in place; a malformed result set fails the whole call
    /// without touching the cache.
    #[instrument(skip(self))]
    pub async fn collect(&self, name: &str) -> Result<Vec<TargetOutcome>> {
        let status = self.poll(name).await?;
        if status.state != BatchState::Succeeded {
            return Err(HarkError::InvalidState {
                job: name.to_string(),
                state: status.state.to_string(),
                message: "results are only available once the job has SUCCEEDED".to_string(),
            });
        }

        let record = self.record(name).await?;
        let records = self.service.fetch_results(&status).await?;
        let ordered = correlate(name, record.targets.len(), records)?;

        let mut outcomes = Vec::with_capacity(ordered.len());
        for (index, (target, result)) in record.targets.iter().zip(ordered).enumerate() {
            let result = self.store_result(&record, target, result).await?;
            outcomes.push(TargetOutcome {
                index,
                target: target.clone(),
                result,
            });
        }

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        info!(
            "Collected job {}: {} transcribed, {} failed",
            name,
            succeeded,
            outcomes.len() - succeeded
        );
        Ok(outcomes)
    }

    async fn store_result(
        &self,
        job: &BatchJobRecord,
        target: &TargetDescriptor,
        result: ResultRecord,
    ) -> Result<TargetResult> {
        if let Some(error) = result.error {
            warn!("Target {} failed: {}", target.audio_url, error);
            return Ok(TargetResult::Failed(error));
        }

        let text = result.text.unwrap_or_default();
        let content = parse_timestamped(&text);
        if content.is_empty() {
            return Ok(TargetResult::Failed("the service returned an empty transcript".to_string()));
        }

        // Keyed exactly like a single-item podcast transcription.
        let options = TranscribeOptions {
            speaker_diarization: job.options.speaker_diarization,
            ..TranscribeOptions::default()
        };
        let source = canonical_audio_url(&target.audio_url)?;
        let duration = content.duration_seconds();

        let entry = CacheEntry {
            fingerprint: Fingerprint::compute(SourceType::Podcast, &source, &options),
            source_type: SourceType::Podcast,
            title: target.title.clone().or_else(|| title_from_url(&source)),
            duration_seconds: (duration > 0.0).then_some(duration),
            created_at: Utc::now(),
            source,
            content,
        };
        self.store.put(&entry).await?;

        Ok(TargetResult::Transcribed(entry.summary()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::fake::{ok_record, FakeBatchService, Step};
    use super::super::{wait_until_terminal, BatchOptions};
    use super::*;
    use crate::backoff::Backoff;
    use crate::cache::{CacheStore, MemoryCacheStore, SortKey};
    use crate::config::TranscriptionPrompts;
    use std::sync::Arc;
    use std::time::Duration;

    fn keyless(text: &str) -> ResultRecord {
        ResultRecord {
            text: Some(text.to_string()),
            ..ResultRecord::default()
        }
    }

    #[test]
    fn test_correlate_orders_by_key() {
        let records = vec![ok_record(2, "c"), ok_record(0, "a"), ok_record(1, "b")];
        let ordered = correlate("batches/1", 3, records).unwrap();
        let texts: Vec<_> = ordered.iter().map(|r| r.text.clone().unwrap()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_correlate_accepts_legacy_keys() {
        let records = vec![
            ResultRecord { key: Some("episode-1".into()), ..keyless("b") },
            ResultRecord { key: Some("episode-0".into()), ..keyless("a") },
        ];
        let ordered = correlate("batches/1", 2, records).unwrap();
        assert_eq!(ordered[0].text.as_deref(), Some("a"));
    }

    #[test]
    fn test_correlate_positional_when_keyless() {
        let ordered = correlate("batches/1", 2, vec![keyless("first"), keyless("second")]).unwrap();
        assert_eq!(ordered[1].text.as_deref(), Some("second"));
    }

    #[test]
    fn test_correlate_rejects_count_mismatch() {
        let err = correlate("batches/1", 3, vec![ok_record(0, "a"), ok_record(1, "b")]).unwrap_err();
        match err {
            HarkError::InvalidState { message, .. } => assert_eq!(message, "expected 3 results, got 2"),
            other => panic!("expected InvalidState, got {:?}", other),
        }
    }

    #[test]
    fn test_correlate_rejects_duplicates_and_gaps() {
        let dup = correlate("batches/1", 2, vec![ok_record(0, "a"), ok_record(0, "b")]);
        assert!(matches!(dup, Err(HarkError::InvalidState { .. })));

        let gap = correlate("batches/1", 2, vec![ok_record(0, "a"), ok_record(2, "c")]);
        assert!(matches!(gap, Err(HarkError::InvalidState { .. })));

        let mixed = correlate("batches/1", 2, vec![ok_record(0, "a"), keyless("b")]);
        assert!(matches!(mixed, Err(HarkError::InvalidState { .. })));
    }

    #[test]
    fn test_correlate_rejects_empty_record() {
        let records = vec![ok_record(0, "a"), ResultRecord { key: Some("target-1".into()), ..Default::default() }];
        assert!(matches!(
            correlate("batches/1", 2, records),
            Err(HarkError::InvalidState { .. })
        ));
    }

    fn setup() -> (Arc<FakeBatchService>, Arc<MemoryCacheStore>, BatchJobManager) {
        let service = Arc::new(FakeBatchService::new());
        let store = Arc::new(MemoryCacheStore::new());
        let manager = BatchJobManager::new(
            service.clone(),
            store.clone(),
            TranscriptionPrompts::default(),
            10,
        );
        (service, store, manager)
    }

    #[tokio::test]
    async fn test_collect_requires_success() {
        let (service, store, manager) = setup();
        let job = manager
            .submit(
                vec![TargetDescriptor::new("https://cdn.example.com/a.mp3")],
                BatchOptions::default(),
            )
            .await
            .unwrap();
        service.script([Step::State(BatchState::Running)]);

        let err = manager.collect(&job.name).await.unwrap_err();
        assert!(matches!(err, HarkError::InvalidState { ref state, .. } if state == "RUNNING"));
        assert_eq!(service.calls.fetch.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_count_mismatch_writes_nothing() {
        let (service, store, manager) = setup();
        let targets = vec![
            TargetDescriptor::new("https://cdn.example.com/a.mp3"),
            TargetDescriptor::new("https://cdn.example.com/b.mp3"),
        ];
        let job = manager.submit(targets, BatchOptions::default()).await.unwrap();
        service.script([Step::State(BatchState::Succeeded)]);
        service.set_results(vec![ok_record(0, "[00:00] Speaker A: Hi.")]);

        assert!(matches!(
            manager.collect(&job.name).await,
            Err(HarkError::InvalidState { .. })
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_collect_without_local_record_is_not_found() {
        let (service, _, manager) = setup();
        service.insert_job(super::super::BatchJobStatus {
            name: "batches/foreign".to_string(),
            display_name: None,
            state: BatchState::Succeeded,
            created_at: None,
            updated_at: None,
            request_count: 1,
            results: None,
            error: None,
        });

        assert!(matches!(
            manager.collect("batches/foreign").await,
            Err(HarkError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_miss_submit_poll_collect_hit() {
        let (service, store, manager) = setup();
        let urls = [
            "https://cdn.example.com/show/ep1.mp3",
            "https://cdn.example.com/show/ep2.mp3",
            "https://cdn.example.com/show/ep3.mp3",
        ];
        let options = TranscribeOptions::default();
        let keys: Vec<Fingerprint> = urls
            .iter()
            .map(|u| Fingerprint::for_audio(u, &options).unwrap())
            .collect();

        for key in &keys {
            assert!(store.lookup(key).await.unwrap().is_none());
        }

        let targets = vec![
            TargetDescriptor::new(urls[0]).with_title("Pilot"),
            TargetDescriptor::new(urls[1]),
            TargetDescriptor::new(urls[2]),
        ];
        let job = manager.submit(targets, BatchOptions::default()).await.unwrap();

        service.script([Step::State(BatchState::Running), Step::State(BatchState::Succeeded)]);
        service.set_results(vec![
            ok_record(2, "[00:00] Speaker A: Third."),
            ResultRecord {
                key: Some("target-1".to_string()),
                text: None,
                error: Some("audio too long".to_string()),
            },
            ok_record(0, "[00:00] Speaker A: Welcome.\n[00:42] Speaker B: Thanks."),
        ]);

        let status = wait_until_terminal(
            &manager,
            &job.name,
            Duration::from_secs(60),
            Duration::from_secs(3600),
            &Backoff::none(),
        )
        .await
        .unwrap();
        assert_eq!(status.state, BatchState::Succeeded);

        let outcomes = manager.collect(&job.name).await.unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes.iter().map(|o| o.index).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(outcomes[0].is_success());
        assert_eq!(outcomes[1].result, TargetResult::Failed("audio too long".to_string()));
        assert!(outcomes[2].is_success());

        let first = store.lookup(&keys[0]).await.unwrap().unwrap();
        assert_eq!(first.title.as_deref(), Some("Pilot"));
        assert_eq!(first.content.segments.len(), 2);
        assert_eq!(first.duration_seconds, Some(42.0));
        assert!(store.lookup(&keys[1]).await.unwrap().is_none());
        let third = store.lookup(&keys[2]).await.unwrap().unwrap();
        assert_eq!(third.title.as_deref(), Some("ep3"));

        assert_eq!(store.list(10, SortKey::CreatedDesc).await.unwrap().len(), 2);
    }
}
