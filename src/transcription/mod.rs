//! Single-item transcription gateways.
//!
//! A [`Transcriber`] turns one audio file or URL into a canonical
//! [`Transcript`]. Two providers exist:
//!
//! - **Gemini** (default): small files are sent inline, larger ones are staged
//!   through the Files API first.
//! - **Whisper**: OpenAI Whisper with ffmpeg chunking for long audio.

mod gemini;
mod whisper;

pub use gemini::GeminiTranscriber;
pub use whisper::WhisperTranscriber;

use crate::config::{Prompts, Settings, TranscriptionProvider};
use crate::error::Result;
use crate::fingerprint::TranscribeOptions;
use crate::gemini::GeminiClient;
use crate::transcript::Transcript;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Audio handed to a transcriber.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioInput {
    /// A local file.
    Path(PathBuf),
    /// A remote http(s) URL, downloaded before transcription.
    Url(String),
}

impl std::fmt::Display for AudioInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioInput::Path(path) => write!(f, "{}", path.display()),
            AudioInput::Url(url) => write!(f, "{}", url),
        }
    }
}

/// Trait for transcription services.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Short provider name for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Transcribe the audio into a timestamped transcript.
    async fn transcribe(&self, input: AudioInput, options: &TranscribeOptions) -> Result<Transcript>;
}

/// Build the transcriber selected in settings.
pub fn create_transcriber(settings: &Settings) -> Result<Arc<dyn Transcriber>> {
    match settings.transcription.provider {
        TranscriptionProvider::Gemini => {
            let client = GeminiClient::new(&settings.gemini)?;
            let prompts = Prompts::load(settings.prompts.custom_dir.as_deref())?;
            Ok(Arc::new(GeminiTranscriber::new(client, prompts.transcription, settings)?))
        }
        TranscriptionProvider::Whisper => Ok(Arc::new(WhisperTranscriber::from_settings(settings)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_input_display() {
        assert_eq!(AudioInput::Url("https://x.test/a.mp3".into()).to_string(), "https://x.test/a.mp3");
        assert_eq!(AudioInput::Path(PathBuf::from("/tmp/a.mp3")).to_string(), "/tmp/a.mp3");
    }

    #[test]
    fn test_whisper_provider_builds_without_gemini_key() {
        let mut settings = Settings::default();
        settings.transcription.provider = TranscriptionProvider::Whisper;
        settings.gemini.api_key_env = "HARK_TEST_UNSET_GEMINI_KEY".to_string();
        let transcriber = create_transcriber(&settings).unwrap();
        assert_eq!(transcriber.name(), "whisper");
    }

    #[test]
    fn test_gemini_provider_requires_key() {
        let mut settings = Settings::default();
        settings.gemini.api_key_env = "HARK_TEST_UNSET_GEMINI_KEY".to_string();
        assert!(create_transcriber(&settings).is_err());
    }
}
