//! Remote batch service seam.

use super::{BatchJobStatus, TargetDescriptor};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Job resource as reported by the remote service.
pub type RemoteJob = BatchJobStatus;

/// An input uploaded to the service, ready to reference from a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedInput {
    /// Position of the target in the submission.
    pub index: usize,
    /// Remote handle used to delete the input.
    pub name: String,
    /// URI the job request references.
    pub uri: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// One result line of a finished job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Request key, when the service echoes it back.
    pub key: Option<String>,
    /// Transcript text on success.
    pub text: Option<String>,
    /// Per-item error on failure.
    pub error: Option<String>,
}

/// Limits the service imposes on jobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceLimits {
    pub max_targets: usize,
    pub max_input_bytes: u64,
    /// How long after creation the service expires an unfinished job.
    pub expiry: chrono::Duration,
}

/// Remote asynchronous batch inference service.
#[async_trait]
pub trait BatchService: Send + Sync {
    fn limits(&self) -> ServiceLimits;

    /// Upload the audio for one target.
    async fn stage_input(&self, target: &TargetDescriptor, index: usize) -> Result<StagedInput>;

    /// Delete a staged input. Best effort.
    async fn discard_input(&self, input: &StagedInput) -> Result<()>;

    /// Create one job whose requests are keyed by input position.
    async fn create_job(
        &self,
        display_name: &str,
        inputs: &[StagedInput],
        prompt: &str,
    ) -> Result<RemoteJob>;

    async fn get_job(&self, name: &str) -> Result<RemoteJob>;

    async fn cancel_job(&self, name: &str) -> Result<()>;

    async fn list_jobs(&self, limit: usize) -> Result<Vec<RemoteJob>>;

    /// Read the result records of a succeeded job.
    async fn fetch_results(&self, job: &RemoteJob) -> Result<Vec<ResultRecord>>;
}
