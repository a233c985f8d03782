//! Content-addressed cache keys for transcription requests.
//!
//! A fingerprint covers the normalized source plus the options that change
//! what a transcript *contains*. Options that only change how it is rendered
//! (timestamps on/off, markdown vs JSON) are left out: the canonical form is
//! stored once and every variant is rendered from it on read.

use crate::error::{HarkError, Result};
use crate::source::{canonical_audio_url, extract_video_id};
use crate::transcript::OutputFormat;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Bumped whenever the canonical key layout changes.
const KEY_VERSION: &str = "v1";

/// Type of media source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Streamed-caption video.
    YouTube,
    /// Downloadable audio.
    Podcast,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::YouTube => "youtube",
            SourceType::Podcast => "podcast",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "youtube" => Ok(SourceType::YouTube),
            "podcast" | "audio" => Ok(SourceType::Podcast),
            _ => Err(format!("Unknown source type: {}", s)),
        }
    }
}

/// Options accepted by a transcription request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscribeOptions {
    /// Render timestamps on read. Not part of the fingerprint.
    pub include_timestamps: bool,
    /// Label speakers. Changes transcript content for audio sources.
    pub speaker_diarization: bool,
    /// Render format on read. Not part of the fingerprint.
    pub format: OutputFormat,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self {
            include_timestamps: true,
            speaker_diarization: true,
            format: OutputFormat::Markdown,
        }
    }
}

/// Deterministic SHA-256 cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint an already-normalized locator.
    pub fn compute(source_type: SourceType, normalized: &str, options: &TranscribeOptions) -> Self {
        // Captions carry no speaker labels, so diarization cannot change them.
        let diarize = match source_type {
            SourceType::YouTube => false,
            SourceType::Podcast => options.speaker_diarization,
        };

        let canonical = format!(
            "{}|{}|{}|diarize={}",
            KEY_VERSION,
            source_type.as_str(),
            normalized,
            diarize
        );

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Normalize a raw video URL/ID and fingerprint it.
    pub fn for_video(input: &str, options: &TranscribeOptions) -> Result<Self> {
        let video_id = extract_video_id(input).ok_or_else(|| {
            HarkError::InvalidInput(format!(
                "Invalid YouTube URL or video ID: '{}'. Provide a video URL or an 11-character ID.",
                input
            ))
        })?;
        Ok(Self::compute(SourceType::YouTube, &video_id, options))
    }

    /// Normalize a raw audio URL and fingerprint it.
    pub fn for_audio(url: &str, options: &TranscribeOptions) -> Result<Self> {
        let canonical = canonical_audio_url(url)?;
        Ok(Self::compute(SourceType::Podcast, &canonical, options))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Fingerprint {
    type Err = HarkError;

    /// Accepts 64-char SHA-256 keys and legacy 32-char MD5 keys.
    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase();
        let valid_len = key.len() == 64 || key.len() == 32;
        if valid_len && key.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(Self(key))
        } else {
            Err(HarkError::InvalidInput(format!(
                "Invalid cache key '{}': expected a 64-character hex fingerprint",
                s
            )))
        }
    }
}
