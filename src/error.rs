//! Error types for Hark.

use thiserror::Error;

/// Library-level error type for Hark operations.
#[derive(Error, Debug)]
pub enum HarkError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Network failure, 5xx or rate limiting. Safe to retry.
    #[error("Remote service unavailable: {0}")]
    RemoteTransient(String),

    /// The remote service rejected the request outright.
    #[error("Remote service error: {0}")]
    Remote(String),

    #[error("Batch job {job} failed: {message}")]
    RemoteTerminalFailure { job: String, message: String },

    #[error("Batch job {job} expired before completing; resubmit to retry")]
    Expired { job: String },

    #[error("Gave up waiting for batch job {job} after {waited_secs}s (last state: {last_state})")]
    DeadlineExceeded {
        job: String,
        last_state: String,
        waited_secs: u64,
    },

    #[error("Batch job {job} is {state}: {message}")]
    InvalidState {
        job: String,
        state: String,
        message: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Audio download failed: {0}")]
    AudioDownload(String),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("External tool failed: {0}")]
    ToolFailed(String),
}

/// Coarse error classification reported to CLI and MCP callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    RemoteTransient,
    RemoteTerminalFailure,
    Expired,
    DeadlineExceeded,
    InvalidState,
    StorageError,
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::RemoteTransient => "remote_transient",
            ErrorKind::RemoteTerminalFailure => "remote_terminal_failure",
            ErrorKind::Expired => "expired",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::StorageError => "storage_error",
            ErrorKind::Other => "other",
        };
        write!(f, "{}", s)
    }
}

impl HarkError {
    /// Whether the failed operation may succeed if repeated.
    pub fn is_transient(&self) -> bool {
        match self {
            HarkError::RemoteTransient(_) => true,
            HarkError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.status().is_some_and(|s| s.is_server_error() || s.as_u16() == 429)
            }
            _ => false,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            HarkError::NotFound(_) => ErrorKind::NotFound,
            HarkError::InvalidInput(_) => ErrorKind::InvalidInput,
            HarkError::RemoteTerminalFailure { .. } => ErrorKind::RemoteTerminalFailure,
            HarkError::Expired { .. } => ErrorKind::Expired,
            HarkError::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
            HarkError::InvalidState { .. } => ErrorKind::InvalidState,
            HarkError::Storage(_) | HarkError::Database(_) | HarkError::Io(_) => {
                ErrorKind::StorageError
            }
            e if e.is_transient() => ErrorKind::RemoteTransient,
            _ => ErrorKind::Other,
        }
    }

    /// Map a non-success HTTP status to the matching error kind.
    pub fn from_status(status: reqwest::StatusCode, context: &str, body: &str) -> Self {
        let message = format!("{} returned {}: {}", context, status, truncate_body(body));
        if status.is_server_error() || status.as_u16() == 429 {
            HarkError::RemoteTransient(message)
        } else if status.as_u16() == 404 {
            HarkError::NotFound(message)
        } else {
            HarkError::Remote(message)
        }
    }
}

fn truncate_body(body: &str) -> &str {
    match body.char_indices().nth(300) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// Result type alias for Hark operations.
pub type Result<T> = std::result::Result<T, HarkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let err = HarkError::from_status(reqwest::StatusCode::BAD_GATEWAY, "GET batches/1", "");
        assert!(err.is_transient());
        assert_eq!(err.kind(), ErrorKind::RemoteTransient);

        let err = HarkError::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "upload", "slow down");
        assert!(err.is_transient());

        let err = HarkError::from_status(reqwest::StatusCode::NOT_FOUND, "GET batches/1", "");
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = HarkError::from_status(reqwest::StatusCode::BAD_REQUEST, "create", "bad");
        assert!(!err.is_transient());
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[test]
    fn test_storage_kinds() {
        let err = HarkError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(err.kind(), ErrorKind::StorageError);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_deadline_message_carries_context() {
        let err = HarkError::DeadlineExceeded {
            job: "batches/abc".to_string(),
            last_state: "RUNNING".to_string(),
            waited_secs: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("batches/abc"));
        assert!(msg.contains("RUNNING"));
    }
}
