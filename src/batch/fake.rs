//! Scripted in-process batch service for tests.

use super::{
    BatchJobStatus, BatchService, BatchState, RemoteJob, ResultRecord, ResultsHandle,
    ServiceLimits, StagedInput, TargetDescriptor,
};
use crate::error::{HarkError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// What the next `get_job` call observes.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    State(BatchState),
    Transient,
}

/// Call counters, one per service method.
#[derive(Debug, Default)]
pub struct Calls {
    pub stage: AtomicUsize,
    pub discard: AtomicUsize,
    pub create: AtomicUsize,
    pub get: AtomicUsize,
    pub cancel: AtomicUsize,
    pub fetch: AtomicUsize,
}

impl Calls {
    pub fn get(&self) -> usize {
        self.get.load(Ordering::SeqCst)
    }
}

pub struct FakeBatchService {
    pub limits: ServiceLimits,
    pub calls: Calls,
    /// Index whose staging fails, if any.
    pub fail_stage_at: Option<usize>,
    steps: Mutex<VecDeque<Step>>,
    jobs: Mutex<HashMap<String, RemoteJob>>,
    results: Mutex<Vec<ResultRecord>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeBatchService {
    pub fn new() -> Self {
        Self {
            limits: ServiceLimits {
                max_targets: 100,
                max_input_bytes: 1 << 30,
                expiry: chrono::Duration::hours(48),
            },
            calls: Calls::default(),
            fail_stage_at: None,
            steps: Mutex::new(VecDeque::new()),
            jobs: Mutex::new(HashMap::new()),
            results: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue what successive `get_job` calls observe. Once the queue is
    /// empty the job keeps its last state.
    pub fn script(&self, steps: impl IntoIterator<Item = Step>) {
        self.steps.lock().unwrap().extend(steps);
    }

    pub fn set_results(&self, records: Vec<ResultRecord>) {
        *self.results.lock().unwrap() = records;
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }

    /// Insert a job the manager never submitted.
    pub fn insert_job(&self, job: RemoteJob) {
        self.jobs.lock().unwrap().insert(job.name.clone(), job);
    }

    fn job(&self, name: &str) -> Result<RemoteJob> {
        self.jobs
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| HarkError::NotFound(format!("batch job {}", name)))
    }

    fn set_state(&self, name: &str, state: BatchState) {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(name) {
            job.state = state;
            job.updated_at = Some(Utc::now());
            if state == BatchState::Succeeded {
                job.results = Some(ResultsHandle::Inlined);
            }
        }
    }
}

/// Successful result record keyed like a real job's.
pub fn ok_record(index: usize, text: &str) -> ResultRecord {
    ResultRecord {
        key: Some(super::target_key(index)),
        text: Some(text.to_string()),
        error: None,
    }
}

#[async_trait]
impl BatchService for FakeBatchService {
    fn limits(&self) -> ServiceLimits {
        self.limits
    }

    async fn stage_input(&self, target: &TargetDescriptor, index: usize) -> Result<StagedInput> {
        self.calls.stage.fetch_add(1, Ordering::SeqCst);
        if self.fail_stage_at == Some(index) {
            return Err(HarkError::RemoteTransient(format!("upload of target {} failed", index)));
        }
        Ok(StagedInput {
            index,
            name: format!("files/input-{}", index),
            uri: format!("https://files.example.com/input-{}", index),
            mime_type: "audio/mpeg".to_string(),
            size_bytes: target.audio_url.len() as u64,
        })
    }

    async fn discard_input(&self, _input: &StagedInput) -> Result<()> {
        self.calls.discard.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_job(
        &self,
        display_name: &str,
        inputs: &[StagedInput],
        prompt: &str,
    ) -> Result<RemoteJob> {
        let n = self.calls.create.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        let job = BatchJobStatus {
            name: format!("batches/fake-{}", n),
            display_name: Some(display_name.to_string()),
            state: BatchState::Pending,
            created_at: Some(Utc::now()),
            updated_at: None,
            request_count: inputs.len(),
            results: None,
            error: None,
        };
        self.insert_job(job.clone());
        Ok(job)
    }

    async fn get_job(&self, name: &str) -> Result<RemoteJob> {
        self.calls.get.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Transient) => Err(HarkError::RemoteTransient("503 from fake".to_string())),
            Some(Step::State(state)) => {
                self.set_state(name, state);
                self.job(name)
            }
            None => self.job(name),
        }
    }

    async fn cancel_job(&self, name: &str) -> Result<()> {
        self.calls.cancel.fetch_add(1, Ordering::SeqCst);
        let job = self.job(name)?;
        if !job.state.is_terminal() {
            self.set_state(name, BatchState::Cancelled);
        }
        Ok(())
    }

    async fn list_jobs(&self, limit: usize) -> Result<Vec<RemoteJob>> {
        let mut jobs: Vec<RemoteJob> = self.jobs.lock().unwrap().values().cloned().collect();
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn fetch_results(&self, _job: &RemoteJob) -> Result<Vec<ResultRecord>> {
        self.calls.fetch.fetch_add(1, Ordering::SeqCst);
        Ok(self.results.lock().unwrap().clone())
    }
}
