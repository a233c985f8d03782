//! Gemini REST request and response bodies.
//!
//! Only the fields hark reads or writes are modelled; everything else is
//! ignored on deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Processing state of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    #[default]
    StateUnspecified,
    Processing,
    Active,
    Failed,
}

/// `google.rpc.Status`.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct Status {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            write!(f, "status code {}", self.code)
        } else {
            write!(f, "{} (code {})", self.message, self.code)
        }
    }
}

/// A file uploaded through the Files API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResource {
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, deserialize_with = "int64")]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub state: FileState,
    #[serde(default)]
    pub error: Option<Status>,
}

/// Body of the upload-finalize response.
#[derive(Debug, Deserialize)]
pub(crate) struct UploadResponse {
    pub file: FileResource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    /// Base64-encoded bytes.
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub mime_type: String,
    pub file_uri: String,
}

/// One part of a content turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<FileData>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn inline(mime_type: impl Into<String>, base64_data: String) -> Self {
        Self {
            inline_data: Some(Blob {
                mime_type: mime_type.into(),
                data: base64_data,
            }),
            ..Self::default()
        }
    }

    pub fn file(mime_type: impl Into<String>, file_uri: impl Into<String>) -> Self {
        Self {
            file_data: Some(FileData {
                mime_type: mime_type.into(),
                file_uri: file_uri.into(),
            }),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

impl GenerateContentRequest {
    /// A single user turn: the prompt followed by one media part.
    pub fn prompt_with(prompt: &str, media: Part) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::text(prompt), media],
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, parts concatenated.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    /// Why no text came back, if the service said.
    pub fn block_reason(&self) -> Option<String> {
        if let Some(reason) = self.prompt_feedback.as_ref().and_then(|f| f.block_reason.clone()) {
            return Some(reason);
        }
        self.candidates
            .first()
            .and_then(|c| c.finish_reason.clone())
            .filter(|r| r != "STOP")
    }
}

/// Request metadata echoed back in batch responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RequestMetadata {
    #[serde(default)]
    pub key: Option<String>,
}

/// One request of an inlined batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlinedRequest {
    pub request: GenerateContentRequest,
    pub metadata: RequestMetadata,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct InlinedResponse {
    #[serde(default)]
    pub response: Option<GenerateContentResponse>,
    #[serde(default)]
    pub error: Option<Status>,
    #[serde(default)]
    pub metadata: Option<RequestMetadata>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct InlinedResponses {
    #[serde(default)]
    pub inlined_responses: Vec<InlinedResponse>,
}

/// Where a finished batch put its responses.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutput {
    #[serde(default)]
    pub responses_file: Option<String>,
    #[serde(default)]
    pub inlined_responses: Option<InlinedResponses>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    #[serde(default, deserialize_with = "int64")]
    pub request_count: Option<u64>,
    #[serde(default, deserialize_with = "int64")]
    pub successful_request_count: Option<u64>,
    #[serde(default, deserialize_with = "int64")]
    pub failed_request_count: Option<u64>,
}

/// `GenerateContentBatch` as carried in operation metadata.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BatchResource {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub update_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub batch_stats: Option<BatchStats>,
    #[serde(default)]
    pub output: Option<BatchOutput>,
}

/// Long-running operation wrapping a batch.
///
/// Depending on the endpoint the batch fields arrive under `metadata` or at
/// the top level, so both are accepted.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub metadata: Option<BatchResource>,
    #[serde(default)]
    pub response: Option<BatchOutput>,
    #[serde(default)]
    pub error: Option<Status>,
    #[serde(flatten)]
    pub inline: BatchResource,
}

impl Operation {
    /// The batch fields, wherever they were reported.
    pub fn batch(&self) -> &BatchResource {
        self.metadata.as_ref().unwrap_or(&self.inline)
    }

    pub fn output(&self) -> Option<&BatchOutput> {
        self.response
            .as_ref()
            .or(self.batch().output.as_ref())
            .or(self.inline.output.as_ref())
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListBatchesResponse {
    #[serde(default)]
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub batches: Vec<Operation>,
}

/// One line of a JSONL responses file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ResponseLine {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub response: Option<GenerateContentResponse>,
    #[serde(default)]
    pub error: Option<Status>,
}

/// Proto3 JSON encodes int64 as a string; accept either form.
fn int64<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = GenerateContentRequest::prompt_with(
            "Transcribe",
            Part::file("audio/mpeg", "https://files.example.com/f1"),
        );
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "Transcribe");
        assert_eq!(
            json["contents"][0]["parts"][1]["fileData"]["fileUri"],
            "https://files.example.com/f1"
        );
        assert!(json["contents"][0]["parts"][1].get("text").is_none());
    }

    #[test]
    fn test_response_text() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"[00:00] Hi"},{"text":" there"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(response.text(), "[00:00] Hi there");
        assert_eq!(response.block_reason(), None);

        let blocked: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert_eq!(blocked.text(), "");
        assert_eq!(blocked.block_reason().as_deref(), Some("SAFETY"));
    }

    #[test]
    fn test_file_resource() {
        let file: FileResource = serde_json::from_str(
            r#"{"name":"files/abc","uri":"https://x/files/abc","mimeType":"audio/mpeg","sizeBytes":"1048576","state":"PROCESSING"}"#,
        )
        .unwrap();
        assert_eq!(file.state, FileState::Processing);
        assert_eq!(file.size_bytes, Some(1_048_576));
    }

    #[test]
    fn test_operation_with_metadata() {
        let op: Operation = serde_json::from_str(
            r#"{
                "name": "batches/123",
                "metadata": {
                    "@type": "type.googleapis.com/google.ai.generativelanguage.v1main.GenerateContentBatch",
                    "name": "batches/123",
                    "displayName": "nightly",
                    "state": "BATCH_STATE_SUCCEEDED",
                    "createTime": "2025-01-02T03:04:05.678Z",
                    "batchStats": {"requestCount": "2"}
                },
                "done": true,
                "response": {
                    "inlinedResponses": {"inlinedResponses": [
                        {"response": {"candidates": [{"content": {"parts": [{"text": "a"}]}}]}, "metadata": {"key": "target-0"}},
                        {"error": {"code": 3, "message": "bad audio"}, "metadata": {"key": "target-1"}}
                    ]}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(op.batch().display_name.as_deref(), Some("nightly"));
        assert_eq!(op.batch().state.as_deref(), Some("BATCH_STATE_SUCCEEDED"));
        assert_eq!(op.batch().batch_stats.as_ref().unwrap().request_count, Some(2));
        let inlined = &op.output().unwrap().inlined_responses.as_ref().unwrap().inlined_responses;
        assert_eq!(inlined.len(), 2);
        assert_eq!(inlined[1].error.as_ref().unwrap().message, "bad audio");
    }

    #[test]
    fn test_operation_flat() {
        let op: Operation = serde_json::from_str(
            r#"{"name":"batches/9","state":"JOB_STATE_RUNNING","output":{"responsesFile":"files/out"}}"#,
        )
        .unwrap();
        assert_eq!(op.batch().state.as_deref(), Some("JOB_STATE_RUNNING"));
        assert_eq!(op.output().unwrap().responses_file.as_deref(), Some("files/out"));
    }
}
