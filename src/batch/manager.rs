//! Batch job lifecycle: submit, poll, cancel and list.

use super::{
    BatchJobRecord, BatchJobStatus, BatchJobSummary, BatchOptions, BatchService, StagedInput,
    TargetDescriptor,
};
use crate::cache::CacheStore;
use crate::config::TranscriptionPrompts;
use crate::error::{HarkError, Result};
use crate::source::canonical_audio_url;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, instrument, warn};

/// Submits batch jobs and tracks what was last observed about each.
///
/// Remote failures are surfaced to the caller, never retried here; the waiter
/// owns retry policy.
pub struct BatchJobManager {
    pub(super) service: Arc<dyn BatchService>,
    pub(super) store: Arc<dyn CacheStore>,
    prompts: TranscriptionPrompts,
    max_targets: usize,
    observed: RwLock<HashMap<String, BatchJobStatus>>,
}

impl BatchJobManager {
    /// `max_targets` is capped at what the service accepts.
    pub fn new(
        service: Arc<dyn BatchService>,
        store: Arc<dyn CacheStore>,
        prompts: TranscriptionPrompts,
        max_targets: usize,
    ) -> Self {
        let max_targets = max_targets.min(service.limits().max_targets);
        Self {
            service,
            store,
            prompts,
            max_targets,
            observed: RwLock::new(HashMap::new()),
        }
    }

    pub fn max_targets(&self) -> usize {
        self.max_targets
    }

    /// Last status observed for `name`, without a round trip.
    pub fn last_observed(&self, name: &str) -> Option<BatchJobStatus> {
        self.observed.read().ok()?.get(name).cloned()
    }

    fn remember(&self, status: &BatchJobStatus) -> Result<()> {
        let mut observed = self
            .observed
            .write()
            .map_err(|e| HarkError::Storage(format!("Failed to acquire lock: {}", e)))?;
        observed.insert(status.name.clone(), status.clone());
        Ok(())
    }

    fn validate(&self, targets: &[TargetDescriptor]) -> Result<()> {
        if targets.is_empty() {
            return Err(HarkError::InvalidInput(
                "A batch needs at least one target".to_string(),
            ));
        }
        if targets.len() > self.max_targets {
            return Err(HarkError::InvalidInput(format!(
                "A batch accepts at most {} targets, got {}",
                self.max_targets,
                targets.len()
            )));
        }
        for (index, target) in targets.iter().enumerate() {
            canonical_audio_url(&target.audio_url).map_err(|e| {
                HarkError::InvalidInput(format!("Target {} ({}): {}", index, target.audio_url, e))
            })?;
        }
        Ok(())
    }

    async fn discard_all(&self, staged: &[StagedInput]) {
        for input in staged {
            if let Err(e) = self.service.discard_input(input).await {
                warn!("Failed to discard staged input {}: {}", input.name, e);
            }
        }
    }

    /// Submit `targets` as one remote job.
    ///
    /// Inputs are staged in order. If any staging or the job creation fails,
    /// inputs staged so far are discarded and no job exists.
    #[instrument(skip_all, fields(targets = targets.len()))]
    pub async fn submit(
        &self,
        targets: Vec<TargetDescriptor>,
        mut options: BatchOptions,
    ) -> Result<BatchJobStatus> {
        self.validate(&targets)?;

        let display_name = options
            .display_name
            .clone()
            .unwrap_or_else(|| format!("hark-batch-{}", Utc::now().format("%Y%m%d-%H%M%S")));
        options.display_name = Some(display_name.clone());

        let mut staged = Vec::with_capacity(targets.len());
        for (index, target) in targets.iter().enumerate() {
            match self.service.stage_input(target, index).await {
                Ok(input) => {
                    debug!("Staged target {} as {}", index, input.name);
                    staged.push(input);
                }
                Err(e) => {
                    warn!("Staging target {} of {} failed: {}", index, targets.len(), e);
                    self.discard_all(&staged).await;
                    return Err(e);
                }
            }
        }

        // The cached form always carries timestamps; rendering can drop them.
        let prompt = self.prompts.select(true, options.speaker_diarization);

        let remote = match self.service.create_job(&display_name, &staged, prompt).await {
            Ok(job) => job,
            Err(e) => {
                self.discard_all(&staged).await;
                return Err(e);
            }
        };

        let now = Utc::now();
        let mut status = remote;
        status.created_at.get_or_insert(now);
        status.display_name.get_or_insert_with(|| display_name.clone());
        if status.request_count == 0 {
            status.request_count = targets.len();
        }

        let record = BatchJobRecord {
            name: status.name.clone(),
            display_name: Some(display_name),
            created_at: status.created_at.unwrap_or(now),
            updated_at: now,
            state: status.state,
            options,
            targets,
        };
        if let Err(e) = self.store.put_job(&record).await {
            warn!("Batch job {} was created but could not be recorded locally: {}", record.name, e);
        }

        self.remember(&status)?;
        info!("Submitted batch job {} with {} targets", status.name, record.targets.len());
        Ok(status)
    }

    /// Refresh the status of `name`.
    ///
    /// Terminal jobs are answered from the last observation. On error the
    /// last observation is left untouched.
    #[instrument(skip(self))]
    pub async fn poll(&self, name: &str) -> Result<BatchJobStatus> {
        if let Some(status) = self.last_observed(name) {
            if status.state.is_terminal() {
                debug!("Job already {}", status.state);
                return Ok(status);
            }
        }

        let remote = self.service.get_job(name).await?;
        self.observe(remote).await
    }

    async fn observe(&self, mut status: BatchJobStatus) -> Result<BatchJobStatus> {
        if let Some(previous) = self.last_observed(&status.name) {
            if !previous.state.can_transition_to(status.state) {
                warn!(
                    "Job {} reported {} after {}; keeping {}",
                    status.name, status.state, previous.state, previous.state
                );
                status.state = previous.state;
            }
        }

        match self.store.get_job(&status.name).await {
            Ok(Some(mut record)) => {
                status.created_at.get_or_insert(record.created_at);
                if status.display_name.is_none() {
                    status.display_name = record.display_name.clone();
                }

                let expires_at = record.created_at + self.service.limits().expiry;
                if !status.state.is_terminal() && Utc::now() > expires_at {
                    warn!(
                        "Job {} is past its expiry ({}) but still reported {}",
                        status.name, expires_at, status.state
                    );
                }

                if record.state != status.state {
                    record.state = status.state;
                    record.updated_at = Utc::now();
                    if let Err(e) = self.store.put_job(&record).await {
                        warn!("Failed to record state of job {}: {}", status.name, e);
                    }
                }
            }
            Ok(None) => debug!("Job {} has no local record", status.name),
            Err(e) => warn!("Failed to read local record of job {}: {}", status.name, e),
        }

        self.remember(&status)?;
        Ok(status)
    }

    /// Cancel `name`. Cancelling a finished job returns it unchanged.
    #[instrument(skip(self))]
    pub async fn cancel(&self, name: &str) -> Result<BatchJobStatus> {
        let current = self.poll(name).await?;
        if current.state.is_terminal() {
            info!("Job {} already {}; nothing to cancel", name, current.state);
            return Ok(current);
        }

        self.service.cancel_job(name).await?;
        info!("Requested cancellation of job {}", name);
        self.poll(name).await
    }

    /// Jobs known to the service, newest first.
    #[instrument(skip(self))]
    pub async fn list(&self, limit: usize) -> Result<Vec<BatchJobSummary>> {
        let mut summaries: Vec<BatchJobSummary> = self
            .service
            .list_jobs(limit)
            .await?
            .iter()
            .map(BatchJobStatus::summary)
            .collect();

        summaries.sort_by(|a, b| match (a.created_at, b.created_at) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.name.cmp(&b.name),
        });
        summaries.truncate(limit);
        Ok(summaries)
    }

    /// Persisted record of a submitted job.
    pub async fn record(&self, name: &str) -> Result<BatchJobRecord> {
        self.store
            .get_job(name)
            .await?
            .ok_or_else(|| HarkError::NotFound(format!("No local record of batch job {}", name)))
    }
}
