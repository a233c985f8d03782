//! Gemini transcription over `generateContent`.

use super::{AudioInput, Transcriber};
use crate::audio::{download_audio, mime_type_for};
use crate::config::{Settings, TranscriptionPrompts};
use crate::error::{HarkError, Result};
use crate::fingerprint::TranscribeOptions;
use crate::gemini::{GeminiClient, GenerateContentRequest, GenerateContentResponse, Part};
use crate::transcript::{parse_timestamped, Transcript};
use async_trait::async_trait;
use base64::Engine;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Gemini-based transcriber.
///
/// Files up to `inline_limit_bytes` travel inside the request; larger files
/// are uploaded, referenced by URI and deleted afterwards.
pub struct GeminiTranscriber {
    client: GeminiClient,
    http: reqwest::Client,
    prompts: TranscriptionPrompts,
    inline_limit_bytes: u64,
    max_download_bytes: u64,
    temp_dir: PathBuf,
}

impl GeminiTranscriber {
    pub fn new(client: GeminiClient, prompts: TranscriptionPrompts, settings: &Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.gemini.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            http,
            prompts,
            inline_limit_bytes: settings.transcription.inline_limit_bytes,
            max_download_bytes: settings.transcription.max_download_bytes,
            temp_dir: settings.temp_dir(),
        })
    }

    /// Timestamps are always requested so the cached transcript can be
    /// rendered either way later.
    fn prompt(&self, options: &TranscribeOptions) -> &str {
        self.prompts.select(true, options.speaker_diarization)
    }

    #[instrument(skip(self, options), fields(path = %path.display()))]
    async fn transcribe_file(&self, path: &Path, options: &TranscribeOptions) -> Result<Transcript> {
        let size = tokio::fs::metadata(path).await?.len();
        let mime_type = mime_type_for(path);
        let prompt = self.prompt(options);

        let response = if size <= self.inline_limit_bytes {
            debug!("Sending {} bytes inline", size);
            let request = inline_request(prompt, path, mime_type).await?;
            self.client.generate_content(&request).await?
        } else {
            info!("Audio is {} bytes, staging through the Files API", size);
            self.generate_staged(path, mime_type, prompt).await?
        };

        transcript_from_response(&response)
    }

    async fn generate_staged(&self, path: &Path, mime_type: &str, prompt: &str) -> Result<GenerateContentResponse> {
        let display_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio");
        let file = self.client.upload_file(path, mime_type, display_name).await?;
        let file_name = file.name.clone();

        let result = async {
            let file = self.client.wait_until_active(file).await?;
            let request = GenerateContentRequest::prompt_with(prompt, Part::file(mime_type, file.uri));
            self.client.generate_content(&request).await
        }
        .await;

        if let Err(e) = self.client.delete_file(&file_name).await {
            warn!("Failed to delete staged file {}: {}", file_name, e);
        }
        result
    }
}

async fn inline_request(prompt: &str, path: &Path, mime_type: &str) -> Result<GenerateContentRequest> {
    let bytes = tokio::fs::read(path).await?;
    let data = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(GenerateContentRequest::prompt_with(prompt, Part::inline(mime_type, data)))
}

fn transcript_from_response(response: &GenerateContentResponse) -> Result<Transcript> {
    let text = response.text();
    if text.trim().is_empty() {
        let reason = response
            .block_reason()
            .unwrap_or_else(|| "no text in response".to_string());
        return Err(HarkError::Transcription(format!("Gemini returned no transcript: {}", reason)));
    }

    let transcript = parse_timestamped(&text);
    if transcript.is_empty() {
        return Err(HarkError::Transcription("Gemini response contained no transcript lines".to_string()));
    }
    Ok(transcript)
}

#[async_trait]
impl Transcriber for GeminiTranscriber {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn transcribe(&self, input: AudioInput, options: &TranscribeOptions) -> Result<Transcript> {
        match input {
            AudioInput::Path(path) => self.transcribe_file(&path, options).await,
            AudioInput::Url(url) => {
                std::fs::create_dir_all(&self.temp_dir)?;
                let scratch = tempfile::tempdir_in(&self.temp_dir)?;
                let path = download_audio(&self.http, &url, scratch.path(), None, self.max_download_bytes).await?;
                self.transcribe_file(&path, options).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inline_request_encodes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        let request = inline_request("Transcribe.", &path, mime_type_for(&path)).await.unwrap();
        let json = serde_json::to_value(&request).unwrap();
        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "Transcribe.");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "audio/wav");
        assert_eq!(parts[1]["inlineData"]["data"], "UklGRg==");
    }

    #[test]
    fn test_transcript_from_response() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"[00:01] Speaker A: Hello\n[00:05] Speaker B: Hi"}]}}]}"#,
        )
        .unwrap();
        let transcript = transcript_from_response(&response).unwrap();
        assert_eq!(transcript.segments.len(), 2);
        assert_eq!(transcript.segments[1].speaker.as_deref(), Some("Speaker B"));
    }

    #[test]
    fn test_blocked_response_is_an_error() {
        let response: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        let err = transcript_from_response(&response).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }
}
