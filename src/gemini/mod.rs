//! Google Gemini API access.
//!
//! Covers the three REST surfaces hark uses: the Files API for staging large
//! audio, `generateContent` for single transcriptions, and batches.

mod client;
mod types;

pub use client::GeminiClient;
pub use types::{
    BatchOutput, BatchResource, BatchStats, Blob, Candidate, Content, FileData, FileResource,
    FileState, GenerateContentRequest, GenerateContentResponse, InlinedRequest, InlinedResponse,
    InlinedResponses, Operation, Part, RequestMetadata, ResponseLine, Status,
};
