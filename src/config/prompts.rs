//! Prompt templates for Hark.
//!
//! Prompts can be customized by placing a `transcription.toml` file in the
//! custom prompts directory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub transcription: TranscriptionPrompts,
}

/// Transcription prompts, one per (timestamps, diarization) combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionPrompts {
    pub timestamps_and_speakers: String,
    pub timestamps: String,
    pub speakers: String,
    pub plain: String,
}

impl Default for TranscriptionPrompts {
    fn default() -> Self {
        Self {
            timestamps_and_speakers: r#"Transcribe this audio accurately with speaker diarization.
Include timestamps in [MM:SS] format showing actual time in the recording.
Format: [MM:SS] Speaker A/B/C: <text>

Use Speaker A, Speaker B, etc. to identify different speakers.
Ensure timestamps correspond to actual positions in the audio."#
                .to_string(),

            timestamps: r#"Transcribe this audio accurately with timestamps.
Include timestamps in [MM:SS] format showing actual time in the recording.
Format: [MM:SS] <text>"#
                .to_string(),

            speakers: r#"Please transcribe this audio file with speaker diarization.
Format output with Speaker A, Speaker B, etc. to identify different speakers."#
                .to_string(),

            plain: "Please transcribe this audio file accurately.".to_string(),
        }
    }
}

impl TranscriptionPrompts {
    /// Pick the prompt for the requested options.
    pub fn select(&self, include_timestamps: bool, speaker_diarization: bool) -> &str {
        match (include_timestamps, speaker_diarization) {
            (true, true) => &self.timestamps_and_speakers,
            (true, false) => &self.timestamps,
            (false, true) => &self.speakers,
            (false, false) => &self.plain,
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with an optional custom directory.
    pub fn load(custom_dir: Option<&str>) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let transcription_path = custom_path.join("transcription.toml");
            if transcription_path.exists() {
                let content = std::fs::read_to_string(&transcription_path)?;
                prompts.transcription = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompts() {
        let prompts = Prompts::default();
        assert!(prompts.transcription.select(true, true).contains("Speaker A/B/C"));
        assert!(prompts.transcription.select(true, false).contains("[MM:SS] <text>"));
        assert!(!prompts.transcription.select(false, true).contains("[MM:SS]"));
        assert_eq!(
            prompts.transcription.select(false, false),
            "Please transcribe this audio file accurately."
        );
    }

    #[test]
    fn test_custom_prompts_override() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("transcription.toml"),
            "plain = \"Transcribe verbatim.\"\n",
        )
        .unwrap();

        let prompts = Prompts::load(dir.path().to_str()).unwrap();
        assert_eq!(prompts.transcription.select(false, false), "Transcribe verbatim.");
        // Unset keys keep their defaults
        assert!(prompts.transcription.select(true, true).contains("Speaker A/B/C"));
    }
}
