//! Cache-first single-item transcription flows.
//!
//! Every request is fingerprinted first; a cache hit returns without touching
//! any remote service. Misses fetch captions (video) or run the transcription
//! gateway (audio) and store the canonical transcript.

use crate::cache::{open_store, CacheEntry, CacheStore, CacheSummary, SortKey};
use crate::config::Settings;
use crate::error::{HarkError, Result};
use crate::fingerprint::{Fingerprint, SourceType, TranscribeOptions};
use crate::source::{canonical_audio_url, extract_video_id, title_from_url, CaptionFetcher, YtDlpCaptions};
use crate::transcription::{create_transcriber, AudioInput, Transcriber};
use chrono::Utc;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, instrument};

/// A transcript and whether it came from the cache.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptResult {
    pub entry: CacheEntry,
    pub cached: bool,
}

/// Coordinates the cache, caption source and transcription gateway.
pub struct Orchestrator {
    store: Arc<dyn CacheStore>,
    transcriber: OnceLock<Arc<dyn Transcriber>>,
    captions: Arc<dyn CaptionFetcher>,
    settings: Settings,
}

impl Orchestrator {
    /// Open the configured store. The transcriber is built on first use so
    /// caption-only work needs no API key.
    pub fn new(settings: Settings) -> Result<Self> {
        let store = open_store(&settings)?;
        Ok(Self {
            store,
            transcriber: OnceLock::new(),
            captions: Arc::new(YtDlpCaptions::new()),
            settings,
        })
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(
        store: Arc<dyn CacheStore>,
        transcriber: Arc<dyn Transcriber>,
        captions: Arc<dyn CaptionFetcher>,
        settings: Settings,
    ) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(transcriber);
        Self {
            store,
            transcriber: cell,
            captions,
            settings,
        }
    }

    pub fn store(&self) -> Arc<dyn CacheStore> {
        self.store.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn transcriber(&self) -> Result<Arc<dyn Transcriber>> {
        if let Some(transcriber) = self.transcriber.get() {
            return Ok(transcriber.clone());
        }
        let transcriber = create_transcriber(&self.settings)?;
        Ok(self.transcriber.get_or_init(|| transcriber).clone())
    }

    async fn cached_entry(&self, fingerprint: &Fingerprint, use_cache: bool) -> Result<Option<CacheEntry>> {
        if !use_cache {
            return Ok(None);
        }
        self.store.lookup(fingerprint).await
    }

    /// Transcript of a video from its captions.
    #[instrument(skip(self), fields(input = %input))]
    pub async fn youtube_transcript(&self, input: &str, use_cache: bool) -> Result<TranscriptResult> {
        let video_id = extract_video_id(input).ok_or_else(|| {
            HarkError::InvalidInput(format!(
                "Invalid YouTube URL or video ID: '{}'. Provide a video URL or an 11-character ID.",
                input
            ))
        })?;
        let fingerprint = Fingerprint::compute(SourceType::YouTube, &video_id, &TranscribeOptions::default());

        if let Some(entry) = self.cached_entry(&fingerprint, use_cache).await? {
            info!("Cache hit for video {}", video_id);
            return Ok(TranscriptResult { entry, cached: true });
        }

        let track = self.captions.fetch(&video_id).await?;
        if track.transcript.is_empty() {
            return Err(HarkError::NotFound(format!(
                "No transcript available for video {} (captions are empty)",
                video_id
            )));
        }

        let duration = track
            .duration_seconds
            .or_else(|| Some(track.transcript.duration_seconds()).filter(|d| *d > 0.0));
        let entry = CacheEntry {
            fingerprint,
            source_type: SourceType::YouTube,
            title: Some(track.title.unwrap_or_else(|| format!("YouTube Video {}", video_id))),
            source: video_id,
            duration_seconds: duration,
            created_at: Utc::now(),
            content: track.transcript,
        };

        self.store.put(&entry).await?;
        debug!("Cached {}", entry.fingerprint);
        Ok(TranscriptResult { entry, cached: false })
    }

    /// Transcript of a podcast episode from its audio URL.
    #[instrument(skip(self, options), fields(audio_url = %audio_url))]
    pub async fn podcast_transcript(
        &self,
        audio_url: &str,
        title: Option<&str>,
        options: &TranscribeOptions,
        use_cache: bool,
    ) -> Result<TranscriptResult> {
        let canonical = canonical_audio_url(audio_url)?;
        let fingerprint = Fingerprint::compute(SourceType::Podcast, &canonical, options);

        if let Some(entry) = self.cached_entry(&fingerprint, use_cache).await? {
            info!("Cache hit for {}", canonical);
            return Ok(TranscriptResult { entry, cached: true });
        }

        let transcriber = self.transcriber()?;
        info!("Transcribing {} with {}", canonical, transcriber.name());
        let transcript = transcriber
            .transcribe(AudioInput::Url(canonical.clone()), options)
            .await?;
        if transcript.is_empty() {
            return Err(HarkError::Transcription(format!(
                "Transcription of {} produced no segments",
                canonical
            )));
        }

        let title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .or_else(|| title_from_url(&canonical));
        let duration = Some(transcript.duration_seconds()).filter(|d| *d > 0.0);
        let entry = CacheEntry {
            fingerprint,
            source_type: SourceType::Podcast,
            source: canonical,
            title,
            duration_seconds: duration,
            created_at: Utc::now(),
            content: transcript,
        };

        self.store.put(&entry).await?;
        Ok(TranscriptResult { entry, cached: false })
    }

    /// A cached transcript by fingerprint.
    pub async fn cached(&self, fingerprint: &str) -> Result<CacheEntry> {
        let key: Fingerprint = fingerprint.parse()?;
        self.store
            .lookup(&key)
            .await?
            .ok_or_else(|| HarkError::NotFound(format!("No cached transcript with fingerprint {}", fingerprint)))
    }

    pub async fn list_cached(&self, limit: usize, sort: SortKey) -> Result<Vec<CacheSummary>> {
        self.store.list(limit, sort).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::source::CaptionTrack;
    use crate::transcript::{Segment, Transcript};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingTranscriber {
        calls: AtomicUsize,
        inputs: Mutex<Vec<AudioInput>>,
        empty: bool,
    }

    #[async_trait]
    impl Transcriber for CountingTranscriber {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn transcribe(&self, input: AudioInput, options: &TranscribeOptions) -> Result<Transcript> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inputs.lock().unwrap().push(input);
            if self.empty {
                return Ok(Transcript::default());
            }
            let mut first = Segment::new(0.0, "Welcome to the show.").with_duration(5.0);
            if options.speaker_diarization {
                first = first.with_speaker("Speaker A");
            }
            Ok(Transcript::new(vec![first, Segment::new(5.0, "Thanks.").with_duration(3.0)]))
        }
    }

    #[derive(Default)]
    struct FakeCaptions {
        calls: AtomicUsize,
        empty: bool,
    }

    #[async_trait]
    impl CaptionFetcher for FakeCaptions {
        async fn fetch(&self, video_id: &str) -> Result<CaptionTrack> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let transcript = if self.empty {
                Transcript::default()
            } else {
                Transcript::new(vec![Segment::new(1.5, "never gonna").with_duration(2.0)])
            };
            Ok(CaptionTrack {
                video_id: video_id.to_string(),
                title: None,
                duration_seconds: Some(212.0),
                transcript,
            })
        }
    }

    fn orchestrator(
        transcriber: Arc<CountingTranscriber>,
        captions: Arc<FakeCaptions>,
    ) -> (Orchestrator, Arc<MemoryCacheStore>) {
        let store = Arc::new(MemoryCacheStore::new());
        let orch = Orchestrator::with_components(store.clone(), transcriber, captions, Settings::default());
        (orch, store)
    }

    #[tokio::test]
    async fn test_youtube_miss_then_hit() {
        let captions = Arc::new(FakeCaptions::default());
        let (orch, store) = orchestrator(Arc::new(CountingTranscriber::default()), captions.clone());

        let first = orch
            .youtube_transcript("https://www.youtube.com/watch?v=dQw4w9WgXcQ", true)
            .await
            .unwrap();
        assert!(!first.cached);
        assert_eq!(first.entry.source, "dQw4w9WgXcQ");
        assert_eq!(first.entry.title.as_deref(), Some("YouTube Video dQw4w9WgXcQ"));
        assert_eq!(first.entry.duration_seconds, Some(212.0));

        // Same video, different spelling
        let second = orch.youtube_transcript("https://youtu.be/dQw4w9WgXcQ", true).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.entry.fingerprint, first.entry.fingerprint);
        assert_eq!(captions.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_youtube_rejects_bad_input_and_empty_captions() {
        let captions = Arc::new(FakeCaptions { empty: true, ..FakeCaptions::default() });
        let (orch, store) = orchestrator(Arc::new(CountingTranscriber::default()), captions.clone());

        let err = orch.youtube_transcript("not a video", true).await.unwrap_err();
        assert!(matches!(err, HarkError::InvalidInput(_)));
        assert_eq!(captions.calls.load(Ordering::SeqCst), 0);

        let err = orch.youtube_transcript("dQw4w9WgXcQ", true).await.unwrap_err();
        assert!(matches!(err, HarkError::NotFound(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_podcast_miss_then_hit() {
        let transcriber = Arc::new(CountingTranscriber::default());
        let (orch, _store) = orchestrator(transcriber.clone(), Arc::new(FakeCaptions::default()));
        let options = TranscribeOptions::default();

        let first = orch
            .podcast_transcript("HTTPS://CDN.example.com/shows/great-episode.mp3#t=5", None, &options, true)
            .await
            .unwrap();
        assert!(!first.cached);
        assert_eq!(first.entry.source, "https://cdn.example.com/shows/great-episode.mp3");
        assert_eq!(first.entry.title.as_deref(), Some("great episode"));
        assert_eq!(first.entry.duration_seconds, Some(8.0));
        assert_eq!(
            transcriber.inputs.lock().unwrap()[0],
            AudioInput::Url("https://cdn.example.com/shows/great-episode.mp3".to_string())
        );

        // Render-only options share the cache entry
        let markdown_off = TranscribeOptions {
            include_timestamps: false,
            ..TranscribeOptions::default()
        };
        let second = orch
            .podcast_transcript("https://cdn.example.com/shows/great-episode.mp3", Some("Ignored"), &markdown_off, true)
            .await
            .unwrap();
        assert!(second.cached);
        assert_eq!(transcriber.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_transcription_is_not_cached() {
        let transcriber = Arc::new(CountingTranscriber { empty: true, ..CountingTranscriber::default() });
        let (orch, store) = orchestrator(transcriber.clone(), Arc::new(FakeCaptions::default()));
        let options = TranscribeOptions::default();
        let url = "https://cdn.example.com/silence.mp3";

        let err = orch.podcast_transcript(url, None, &options, true).await.unwrap_err();
        assert!(matches!(err, HarkError::Transcription(_)));
        assert!(store.is_empty());

        // Nothing was cached, so asking again transcribes again
        assert!(orch.podcast_transcript(url, None, &options, true).await.is_err());
        assert_eq!(transcriber.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_diarization_changes_the_key() {
        let transcriber = Arc::new(CountingTranscriber::default());
        let (orch, store) = orchestrator(transcriber.clone(), Arc::new(FakeCaptions::default()));
        let url = "https://cdn.example.com/ep.mp3";

        let with = orch
            .podcast_transcript(url, Some("Ep"), &TranscribeOptions::default(), true)
            .await
            .unwrap();
        let without_opts = TranscribeOptions {
            speaker_diarization: false,
            ..TranscribeOptions::default()
        };
        let without = orch.podcast_transcript(url, Some("Ep"), &without_opts, true).await.unwrap();

        assert!(!without.cached);
        assert_ne!(with.entry.fingerprint, without.entry.fingerprint);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_no_cache_refreshes_entry() {
        let transcriber = Arc::new(CountingTranscriber::default());
        let (orch, store) = orchestrator(transcriber.clone(), Arc::new(FakeCaptions::default()));
        let options = TranscribeOptions::default();
        let url = "https://cdn.example.com/ep.mp3";

        orch.podcast_transcript(url, None, &options, true).await.unwrap();
        let again = orch.podcast_transcript(url, None, &options, false).await.unwrap();
        assert!(!again.cached);
        assert_eq!(transcriber.calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_cached_and_list() {
        let (orch, _store) = orchestrator(Arc::new(CountingTranscriber::default()), Arc::new(FakeCaptions::default()));
        let result = orch
            .podcast_transcript("https://cdn.example.com/a.mp3", Some("A"), &TranscribeOptions::default(), true)
            .await
            .unwrap();

        let fp = result.entry.fingerprint.to_string();
        assert_eq!(orch.cached(&fp).await.unwrap().title.as_deref(), Some("A"));

        let missing = "0".repeat(64);
        assert!(matches!(orch.cached(&missing).await, Err(HarkError::NotFound(_))));

        let listed = orch.list_cached(10, SortKey::CreatedDesc).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].fingerprint, result.entry.fingerprint);
    }
}
