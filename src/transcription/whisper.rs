//! OpenAI Whisper transcription implementation.

use super::{AudioInput, Transcriber};
use crate::audio::split_audio;
use crate::config::Settings;
use crate::error::{HarkError, Result};
use crate::fingerprint::TranscribeOptions;
use crate::openai::create_client;
use crate::transcript::{Segment, Transcript};
use async_openai::types::{AudioResponseFormat, CreateTranscriptionRequestArgs};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// OpenAI Whisper-based transcriber.
///
/// Whisper does not label speakers, so diarization requests produce
/// unlabelled segments.
pub struct WhisperTranscriber {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    http: reqwest::Client,
    model: String,
    chunk_duration_seconds: u32,
    max_concurrent_chunks: usize,
    temp_dir: PathBuf,
    max_download_bytes: u64,
}

impl WhisperTranscriber {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            http: reqwest::Client::new(),
            model: settings.transcription.whisper_model.clone(),
            chunk_duration_seconds: settings.transcription.whisper_chunk_seconds.max(1),
            max_concurrent_chunks: settings.transcription.max_concurrent_chunks.max(1),
            temp_dir: settings.temp_dir(),
            max_download_bytes: settings.transcription.max_download_bytes,
        })
    }

    /// Transcribe a single audio file (no splitting).
    #[instrument(skip(self), fields(audio_path = %audio_path.display()))]
    async fn transcribe_single(&self, audio_path: &Path) -> Result<(Vec<Segment>, Option<String>)> {
        debug!("Transcribing audio file");

        let file_bytes = tokio::fs::read(audio_path).await?;

        let request = CreateTranscriptionRequestArgs::default()
            .file(async_openai::types::AudioInput::from_vec_u8(
                audio_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("audio.mp3")
                    .to_string(),
                file_bytes,
            ))
            .model(&self.model)
            .response_format(AudioResponseFormat::VerboseJson)
            .build()
            .map_err(|e| HarkError::Transcription(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .audio()
            .transcribe_verbose_json(request)
            .await
            .map_err(|e| HarkError::OpenAI(format!("Whisper API error: {}", e)))?;

        let segments: Vec<Segment> = match response.segments {
            Some(segs) => segs
                .iter()
                .filter(|s| !s.text.trim().is_empty())
                .map(|s| {
                    Segment::new(s.start as f64, s.text.trim())
                        .with_duration((s.end - s.start).max(0.0) as f64)
                })
                .collect(),
            // Fallback: one segment from the full text
            None if !response.text.trim().is_empty() => {
                vec![Segment::new(0.0, response.text.trim()).with_duration(response.duration as f64)]
            }
            None => Vec::new(),
        };

        debug!("Transcribed {} segments", segments.len());
        Ok((segments, Some(response.language)))
    }

    /// Transcribe an audio file, splitting it into chunks if it is long.
    #[instrument(skip(self), fields(audio_path = %audio_path.display()))]
    async fn transcribe_file(&self, audio_path: &Path) -> Result<Transcript> {
        let temp_dir = tempfile::tempdir()?;
        let chunks = split_audio(audio_path, temp_dir.path(), self.chunk_duration_seconds).await?;

        if chunks.len() == 1 {
            let (segments, language) = self.transcribe_single(audio_path).await?;
            return Ok(Transcript { segments, language });
        }

        let chunk_count = chunks.len();
        info!("Processing {} audio chunks with {}", chunk_count, self.model);

        let pb = ProgressBar::new(chunk_count as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("  {spinner:.green} Whisper   [{bar:30.cyan/blue}] {pos}/{len}")
        {
            pb.set_style(style.progress_chars("█▓░"));
        }

        // Bounded concurrency, fail fast on error
        let mut results: Vec<(usize, f64, Vec<Segment>, Option<String>)> = Vec::with_capacity(chunk_count);

        let mut stream = stream::iter(chunks.into_iter().enumerate())
            .map(|(idx, (chunk_path, time_offset))| async move {
                let result = self.transcribe_single(&chunk_path).await;
                (idx, time_offset, result)
            })
            .buffer_unordered(self.max_concurrent_chunks);

        while let Some((idx, time_offset, result)) = stream.next().await {
            pb.inc(1);
            match result {
                Ok((segments, language)) => results.push((idx, time_offset, segments, language)),
                Err(e) => {
                    pb.finish_and_clear();
                    return Err(HarkError::Transcription(format!(
                        "Chunk {} at {:.0}s failed: {}",
                        idx, time_offset, e
                    )));
                }
            }
        }

        pb.finish_and_clear();

        results.sort_by_key(|(idx, _, _, _)| *idx);

        let language = results.iter().find_map(|(_, _, _, lang)| lang.clone());
        let mut transcript = Transcript {
            segments: Vec::new(),
            language,
        };
        for (_, time_offset, segments, _) in results {
            let chunk = Transcript::new(segments).offset(time_offset);
            transcript.segments.extend(chunk.segments);
        }

        Ok(transcript)
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    fn name(&self) -> &'static str {
        "whisper"
    }

    async fn transcribe(&self, input: AudioInput, options: &TranscribeOptions) -> Result<Transcript> {
        if options.speaker_diarization {
            warn!("Whisper does not label speakers; segments will be unlabelled");
        }

        match input {
            AudioInput::Path(path) => self.transcribe_file(&path).await,
            AudioInput::Url(url) => {
                std::fs::create_dir_all(&self.temp_dir)?;
                let scratch = tempfile::tempdir_in(&self.temp_dir)?;
                let path = crate::audio::download_audio(
                    &self.http,
                    &url,
                    scratch.path(),
                    None,
                    self.max_download_bytes,
                )
                .await?;
                self.transcribe_file(&path).await
            }
        }
    }
}
