//! Batch service backed by the Gemini batch API.
//!
//! Each target's audio is downloaded, staged through the Files API and
//! referenced from one inlined request keyed `target-<index>`.

use super::{
    target_key, BatchJobStatus, BatchService, BatchState, RemoteJob, ResultRecord, ResultsHandle,
    ServiceLimits, StagedInput, TargetDescriptor,
};
use crate::audio::{download_audio, mime_type_for};
use crate::config::Settings;
use crate::error::{HarkError, Result};
use crate::gemini::{
    GenerateContentRequest, GenerateContentResponse, GeminiClient, InlinedRequest,
    InlinedResponse, Operation, Part, RequestMetadata, ResponseLine,
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub struct GeminiBatchService {
    client: GeminiClient,
    http: reqwest::Client,
    temp_dir: PathBuf,
    limits: ServiceLimits,
}

impl GeminiBatchService {
    pub fn new(client: GeminiClient, settings: &Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.gemini.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            http,
            temp_dir: settings.temp_dir(),
            limits: ServiceLimits {
                max_targets: settings.batch.max_targets,
                max_input_bytes: settings.batch.max_input_bytes,
                expiry: expiry_from_hours(settings.batch.expiry_hours)?,
            },
        })
    }
}

fn expiry_from_hours(hours: u64) -> Result<chrono::Duration> {
    i64::try_from(hours)
        .ok()
        .and_then(chrono::Duration::try_hours)
        .ok_or_else(|| HarkError::Config(format!("batch.expiry_hours is out of range: {}", hours)))
}

/// Map a batch operation to the status hark tracks.
pub(crate) fn status_from_operation(op: &Operation) -> Result<BatchJobStatus> {
    let batch = op.batch();
    let name = batch
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| op.name.clone());
    if name.is_empty() {
        return Err(HarkError::Remote("Batch response carries no job name".to_string()));
    }

    let state = match batch.state.as_deref() {
        Some(state) => state.parse()?,
        None if op.done && op.error.is_some() => BatchState::Failed,
        None if op.done => BatchState::Succeeded,
        None => BatchState::Pending,
    };

    let results = op.output().and_then(|output| {
        if let Some(file) = &output.responses_file {
            Some(ResultsHandle::File { name: file.clone() })
        } else {
            output.inlined_responses.as_ref().map(|_| ResultsHandle::Inlined)
        }
    });

    Ok(BatchJobStatus {
        name,
        display_name: batch.display_name.clone(),
        state,
        created_at: batch.create_time,
        updated_at: batch.update_time,
        request_count: batch
            .batch_stats
            .as_ref()
            .and_then(|s| s.request_count)
            .unwrap_or(0) as usize,
        results,
        error: op.error.as_ref().map(|e| e.to_string()),
    })
}

fn record_from_response(
    key: Option<String>,
    response: Option<&GenerateContentResponse>,
    error: Option<String>,
) -> ResultRecord {
    if let Some(error) = error {
        return ResultRecord { key, text: None, error: Some(error) };
    }
    match response {
        Some(response) => {
            let text = response.text();
            if text.trim().is_empty() {
                let reason = response
                    .block_reason()
                    .unwrap_or_else(|| "no text in response".to_string());
                ResultRecord { key, text: None, error: Some(format!("empty response: {}", reason)) }
            } else {
                ResultRecord { key, text: Some(text), error: None }
            }
        }
        None => ResultRecord { key, text: None, error: None },
    }
}

pub(crate) fn records_from_inlined(responses: &[InlinedResponse]) -> Vec<ResultRecord> {
    responses
        .iter()
        .map(|r| {
            record_from_response(
                r.metadata.as_ref().and_then(|m| m.key.clone()),
                r.response.as_ref(),
                r.error.as_ref().map(|e| e.to_string()),
            )
        })
        .collect()
}

pub(crate) fn records_from_jsonl(job: &str, body: &str) -> Result<Vec<ResultRecord>> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(n, line)| {
            let parsed: ResponseLine =
                serde_json::from_str(line).map_err(|e| HarkError::InvalidState {
                    job: job.to_string(),
                    state: BatchState::Succeeded.to_string(),
                    message: format!("unparsable result line {}: {}", n + 1, e),
                })?;
            Ok(record_from_response(
                parsed.key,
                parsed.response.as_ref(),
                parsed.error.as_ref().map(|e| e.to_string()),
            ))
        })
        .collect()
}

#[async_trait]
impl BatchService for GeminiBatchService {
    fn limits(&self) -> ServiceLimits {
        self.limits
    }

    #[instrument(skip(self, target), fields(url = %target.audio_url))]
    async fn stage_input(&self, target: &TargetDescriptor, index: usize) -> Result<StagedInput> {
        std::fs::create_dir_all(&self.temp_dir)?;
        let scratch = tempfile::tempdir_in(&self.temp_dir)?;

        let path = download_audio(
            &self.http,
            &target.audio_url,
            scratch.path(),
            target.title.as_deref(),
            self.limits.max_input_bytes,
        )
        .await?;
        let mime_type = mime_type_for(&path);

        let display_name = target
            .title
            .clone()
            .unwrap_or_else(|| target_key(index));
        let file = self.client.upload_file(&path, mime_type, &display_name).await?;
        let file = self.client.wait_until_active(file).await?;
        let size_bytes = file.size_bytes.unwrap_or_else(|| {
            std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0)
        });

        Ok(StagedInput {
            index,
            name: file.name,
            uri: file.uri,
            mime_type: mime_type.to_string(),
            size_bytes,
        })
    }

    async fn discard_input(&self, input: &StagedInput) -> Result<()> {
        self.client.delete_file(&input.name).await
    }

    async fn create_job(
        &self,
        display_name: &str,
        inputs: &[StagedInput],
        prompt: &str,
    ) -> Result<RemoteJob> {
        let requests = inputs
            .iter()
            .map(|input| InlinedRequest {
                request: GenerateContentRequest::prompt_with(
                    prompt,
                    Part::file(input.mime_type.clone(), input.uri.clone()),
                ),
                metadata: RequestMetadata {
                    key: Some(target_key(input.index)),
                },
            })
            .collect();

        let op = self.client.create_batch(display_name, requests).await?;
        let mut status = status_from_operation(&op)?;
        if status.request_count == 0 {
            status.request_count = inputs.len();
        }
        Ok(status)
    }

    async fn get_job(&self, name: &str) -> Result<RemoteJob> {
        status_from_operation(&self.client.get_batch(name).await?)
    }

    async fn cancel_job(&self, name: &str) -> Result<()> {
        self.client.cancel_batch(name).await
    }

    async fn list_jobs(&self, limit: usize) -> Result<Vec<RemoteJob>> {
        let ops = self.client.list_batches(limit).await?;
        Ok(ops
            .iter()
            .filter_map(|op| match status_from_operation(op) {
                Ok(status) => Some(status),
                Err(e) => {
                    warn!("Skipping unreadable batch {}: {}", op.name, e);
                    None
                }
            })
            .collect())
    }

    #[instrument(skip(self, job), fields(job = %job.name))]
    async fn fetch_results(&self, job: &RemoteJob) -> Result<Vec<ResultRecord>> {
        if let Some(ResultsHandle::File { name }) = &job.results {
            debug!("Downloading results file {}", name);
            return records_from_jsonl(&job.name, &self.client.download_file(name).await?);
        }

        let op = self.client.get_batch(&job.name).await?;
        let output = op.output().ok_or_else(|| HarkError::InvalidState {
            job: job.name.clone(),
            state: job.state.to_string(),
            message: "the service reported no output".to_string(),
        })?;

        if let Some(file) = &output.responses_file {
            return records_from_jsonl(&job.name, &self.client.download_file(file).await?);
        }
        match &output.inlined_responses {
            Some(inlined) => Ok(records_from_inlined(&inlined.inlined_responses)),
            None => Err(HarkError::InvalidState {
                job: job.name.clone(),
                state: job.state.to_string(),
                message: "the service reported no output".to_string(),
            }),
        }
    }
}
