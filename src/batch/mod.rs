//! Batch transcription jobs.
//!
//! A batch job transcribes many audio targets in one remote request. The
//! [`BatchJobManager`] submits, polls, cancels and lists jobs; the waiter blocks
//! until a job is terminal; the collector correlates results back to their
//! targets by position and fills the transcript cache.
//!
//! Job states only move forward:
//!
//! ```text
//! PENDING -> RUNNING -> SUCCEEDED | FAILED | CANCELLED | EXPIRED
//! ```

mod collector;
mod gemini;
mod manager;
mod service;
mod waiter;

#[cfg(test)]
pub(crate) mod fake;

pub use collector::{TargetOutcome, TargetResult};
pub use gemini::GeminiBatchService;
pub use manager::BatchJobManager;
pub use service::{BatchService, RemoteJob, ResultRecord, ServiceLimits, StagedInput};
pub use waiter::wait_until_terminal;

use crate::cache::CacheStore;
use crate::config::{Prompts, Settings};
use crate::error::{HarkError, Result};
use crate::gemini::GeminiClient;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Request key for target `index`, used to correlate results.
pub fn target_key(index: usize) -> String {
    format!("target-{}", index)
}

/// Build a manager over the Gemini batch service from settings.
pub fn open_manager(settings: &Settings, store: Arc<dyn CacheStore>) -> Result<BatchJobManager> {
    let client = GeminiClient::new(&settings.gemini)?;
    let service = GeminiBatchService::new(client, settings)?;
    let prompts = Prompts::load(settings.prompts.custom_dir.as_deref())?;
    Ok(BatchJobManager::new(
        Arc::new(service),
        store,
        prompts.transcription,
        settings.batch.max_targets,
    ))
}

/// Lifecycle state of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Expired,
}

impl BatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchState::Pending => "PENDING",
            BatchState::Running => "RUNNING",
            BatchState::Succeeded => "SUCCEEDED",
            BatchState::Failed => "FAILED",
            BatchState::Cancelled => "CANCELLED",
            BatchState::Expired => "EXPIRED",
        }
    }

    /// Terminal states never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchState::Succeeded | BatchState::Failed | BatchState::Cancelled | BatchState::Expired
        )
    }

    fn rank(&self) -> u8 {
        match self {
            BatchState::Pending => 0,
            BatchState::Running => 1,
            _ => 2,
        }
    }

    /// Whether a job observed in `self` may next be observed in `next`.
    pub fn can_transition_to(&self, next: BatchState) -> bool {
        if *self == next {
            return true;
        }
        !self.is_terminal() && next.rank() >= self.rank()
    }
}

impl std::fmt::Display for BatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BatchState {
    type Err = HarkError;

    /// Accepts bare names and the service's `BATCH_STATE_*` / `JOB_STATE_*` forms.
    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        let bare = upper
            .strip_prefix("BATCH_STATE_")
            .or_else(|| upper.strip_prefix("JOB_STATE_"))
            .unwrap_or(&upper);

        match bare {
            "PENDING" | "QUEUED" | "UNSPECIFIED" => Ok(BatchState::Pending),
            "RUNNING" | "PROCESSING" | "CANCELLING" | "PAUSED" | "UPDATING" => Ok(BatchState::Running),
            "SUCCEEDED" | "PARTIALLY_SUCCEEDED" => Ok(BatchState::Succeeded),
            "FAILED" => Ok(BatchState::Failed),
            "CANCELLED" | "CANCELED" => Ok(BatchState::Cancelled),
            "EXPIRED" => Ok(BatchState::Expired),
            _ => Err(HarkError::Remote(format!("Unknown batch job state: {}", s))),
        }
    }
}

/// One audio item to transcribe in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub audio_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl TargetDescriptor {
    pub fn new(audio_url: impl Into<String>) -> Self {
        Self {
            audio_url: audio_url.into(),
            title: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

impl std::str::FromStr for TargetDescriptor {
    type Err = HarkError;

    /// Parses `URL` or `URL::Title`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(HarkError::InvalidInput("Empty batch target".into()));
        }
        Ok(match s.split_once("::") {
            Some((url, title)) if !title.trim().is_empty() => {
                TargetDescriptor::new(url.trim()).with_title(title.trim())
            }
            Some((url, _)) => TargetDescriptor::new(url.trim()),
            None => TargetDescriptor::new(s),
        })
    }
}

fn default_true() -> bool {
    true
}

/// Options applied to every target of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default = "default_true")]
    pub speaker_diarization: bool,
    #[serde(default = "default_true")]
    pub include_timestamps: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            display_name: None,
            speaker_diarization: true,
            include_timestamps: true,
        }
    }
}

/// Locally persisted metadata of a submitted job.
///
/// Kept in the cache store so results can be correlated to targets after a
/// restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJobRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Last observed state.
    pub state: BatchState,
    pub options: BatchOptions,
    /// Targets in submission order.
    pub targets: Vec<TargetDescriptor>,
}

/// Where a finished job's results can be read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultsHandle {
    /// Responses are embedded in the job resource.
    Inlined,
    /// Responses are in a JSONL file.
    File { name: String },
}

/// Observed status of a batch job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJobStatus {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub state: BatchState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub request_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<ResultsHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchJobStatus {
    /// Map a terminal status to success or its error kind.
    pub fn into_success(self) -> Result<BatchJobStatus> {
        match self.state {
            BatchState::Succeeded => Ok(self),
            BatchState::Failed => Err(HarkError::RemoteTerminalFailure {
                message: self
                    .error
                    .unwrap_or_else(|| "the service reported FAILED".to_string()),
                job: self.name,
            }),
            BatchState::Expired => Err(HarkError::Expired { job: self.name }),
            BatchState::Cancelled => Err(HarkError::InvalidState {
                job: self.name,
                state: BatchState::Cancelled.to_string(),
                message: "the job was cancelled".to_string(),
            }),
            state => Err(HarkError::InvalidState {
                job: self.name,
                state: state.to_string(),
                message: "the job has not finished".to_string(),
            }),
        }
    }

    pub fn summary(&self) -> BatchJobSummary {
        BatchJobSummary {
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            state: self.state,
            created_at: self.created_at,
            request_count: self.request_count,
        }
    }
}

/// One row of a job listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJobSummary {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub state: BatchState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub request_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parsing() {
        assert_eq!("BATCH_STATE_PENDING".parse::<BatchState>().unwrap(), BatchState::Pending);
        assert_eq!("JOB_STATE_RUNNING".parse::<BatchState>().unwrap(), BatchState::Running);
        assert_eq!("JOB_STATE_SUCCEEDED".parse::<BatchState>().unwrap(), BatchState::Succeeded);
        assert_eq!("batch_state_expired".parse::<BatchState>().unwrap(), BatchState::Expired);
        assert_eq!("CANCELLED".parse::<BatchState>().unwrap(), BatchState::Cancelled);
        assert!("JOB_STATE_EXPLODED".parse::<BatchState>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!BatchState::Pending.is_terminal());
        assert!(!BatchState::Running.is_terminal());
        assert!(BatchState::Succeeded.is_terminal());
        assert!(BatchState::Failed.is_terminal());
        assert!(BatchState::Cancelled.is_terminal());
        assert!(BatchState::Expired.is_terminal());
    }

    #[test]
    fn test_transitions_are_forward_only() {
        assert!(BatchState::Pending.can_transition_to(BatchState::Running));
        assert!(BatchState::Pending.can_transition_to(BatchState::Succeeded));
        assert!(BatchState::Running.can_transition_to(BatchState::Expired));
        assert!(!BatchState::Running.can_transition_to(BatchState::Pending));
        assert!(!BatchState::Succeeded.can_transition_to(BatchState::Running));
        assert!(!BatchState::Failed.can_transition_to(BatchState::Succeeded));
        assert!(BatchState::Succeeded.can_transition_to(BatchState::Succeeded));
    }

    #[test]
    fn test_state_serde_uppercase() {
        assert_eq!(serde_json::to_string(&BatchState::Succeeded).unwrap(), "\"SUCCEEDED\"");
        let parsed: BatchState = serde_json::from_str("\"RUNNING\"").unwrap();
        assert_eq!(parsed, BatchState::Running);
    }

    #[test]
    fn test_target_parsing() {
        let target: TargetDescriptor = "https://cdn.example.com/ep1.mp3::Episode One".parse().unwrap();
        assert_eq!(target.audio_url, "https://cdn.example.com/ep1.mp3");
        assert_eq!(target.title.as_deref(), Some("Episode One"));

        let target: TargetDescriptor = "https://cdn.example.com/ep2.mp3".parse().unwrap();
        assert_eq!(target.title, None);
        assert!("  ".parse::<TargetDescriptor>().is_err());
    }

    fn status(state: BatchState) -> BatchJobStatus {
        BatchJobStatus {
            name: "batches/1".to_string(),
            display_name: None,
            state,
            created_at: None,
            updated_at: None,
            request_count: 2,
            results: None,
            error: Some("quota".to_string()),
        }
    }

    #[test]
    fn test_into_success() {
        assert!(status(BatchState::Succeeded).into_success().is_ok());
        assert!(matches!(
            status(BatchState::Failed).into_success(),
            Err(HarkError::RemoteTerminalFailure { message, .. }) if message == "quota"
        ));
        assert!(matches!(status(BatchState::Expired).into_success(), Err(HarkError::Expired { .. })));
        assert!(matches!(
            status(BatchState::Cancelled).into_success(),
            Err(HarkError::InvalidState { .. })
        ));
        assert!(matches!(
            status(BatchState::Running).into_success(),
            Err(HarkError::InvalidState { .. })
        ));
    }
}
