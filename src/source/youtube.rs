//! YouTube caption source.

use crate::error::{HarkError, Result};
use crate::transcript::{Segment, Transcript};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::process::Command;
use tracing::{debug, info, instrument};

fn video_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Matches various YouTube URL formats and bare video IDs
        Regex::new(
            r"(?x)
            (?:
                (?:https?://)?
                (?:www\.|m\.)?
                (?:youtube\.com/watch\?(?:.*&)?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/v/|youtube\.com/shorts/|youtube\.com/live/)
                ([a-zA-Z0-9_-]{11})
            )
            |
            ^([a-zA-Z0-9_-]{11})$
        ",
        )
        .expect("video id pattern is valid")
    })
}

/// Extract an 11-character video ID from a YouTube URL or bare ID.
pub fn extract_video_id(input: &str) -> Option<String> {
    let caps = video_id_regex().captures(input.trim())?;

    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

/// Captions fetched for one video.
#[derive(Debug, Clone)]
pub struct CaptionTrack {
    pub video_id: String,
    pub title: Option<String>,
    pub duration_seconds: Option<f64>,
    pub transcript: Transcript,
}

/// Fetches caption tracks for a video.
#[async_trait]
pub trait CaptionFetcher: Send + Sync {
    async fn fetch(&self, video_id: &str) -> Result<CaptionTrack>;
}

/// Caption fetcher backed by yt-dlp's json3 subtitle output.
pub struct YtDlpCaptions {
    languages: String,
}

impl YtDlpCaptions {
    pub fn new() -> Self {
        Self::with_languages("en.*,en")
    }

    pub fn with_languages(languages: &str) -> Self {
        Self {
            languages: languages.to_string(),
        }
    }
}

impl Default for YtDlpCaptions {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptionFetcher for YtDlpCaptions {
    #[instrument(skip(self))]
    async fn fetch(&self, video_id: &str) -> Result<CaptionTrack> {
        let url = format!("https://www.youtube.com/watch?v={}", video_id);
        let temp_dir = tempfile::tempdir()?;
        let template = temp_dir.path().join("%(id)s.%(ext)s");

        info!("Fetching captions for {}", video_id);

        let result = Command::new("yt-dlp")
            .arg("--skip-download")
            .arg("--no-simulate")
            .arg("--dump-json")
            .arg("--write-subs")
            .arg("--write-auto-subs")
            .arg("--sub-format").arg("json3")
            .arg("--sub-langs").arg(&self.languages)
            .arg("--no-warnings")
            .arg("--no-playlist")
            .arg("--output").arg(template.to_string_lossy().as_ref())
            .arg(&url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        let output = match result {
            Ok(o) => o,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HarkError::ToolNotFound("yt-dlp".into()));
            }
            Err(e) => return Err(HarkError::ToolFailed(format!("yt-dlp execution failed: {e}"))),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("Video unavailable") || stderr.contains("Private video") {
                return Err(HarkError::NotFound(format!(
                    "Video {} not found. Check the video ID/URL is correct and the video exists.",
                    video_id
                )));
            }
            return Err(HarkError::ToolFailed(format!("yt-dlp failed: {stderr}")));
        }

        let info: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap_or_default();
        let title = info["title"].as_str().map(|s| s.to_string());
        let duration_seconds = info["duration"].as_f64();

        let subtitle_path = find_subtitle_file(temp_dir.path())?.ok_or_else(|| {
            HarkError::NotFound(format!(
                "No transcript available for video {} (captions may be disabled)",
                video_id
            ))
        })?;

        let raw = tokio::fs::read_to_string(&subtitle_path).await?;
        let mut transcript = parse_json3(&raw)?;
        transcript.language = subtitle_path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.rsplit_once('.'))
            .map(|(_, lang)| lang.to_string());

        debug!("Parsed {} caption segments", transcript.segments.len());

        Ok(CaptionTrack {
            video_id: video_id.to_string(),
            title,
            duration_seconds,
            transcript,
        })
    }
}

fn find_subtitle_file(dir: &Path) -> Result<Option<std::path::PathBuf>> {
    let mut candidates: Vec<_> = std::fs::read_dir(dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json3"))
        .collect();
    candidates.sort();
    Ok(candidates.into_iter().next())
}

#[derive(Debug, Deserialize)]
struct Json3 {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Json3Event {
    #[serde(default)]
    t_start_ms: u64,
    #[serde(default)]
    d_duration_ms: Option<u64>,
    #[serde(default)]
    segs: Option<Vec<Json3Seg>>,
}

#[derive(Debug, Deserialize)]
struct Json3Seg {
    #[serde(default)]
    utf8: String,
}

/// Parse yt-dlp's json3 caption format into a transcript.
pub fn parse_json3(raw: &str) -> Result<Transcript> {
    let parsed: Json3 = serde_json::from_str(raw)?;

    let segments = parsed
        .events
        .into_iter()
        .filter_map(|event| {
            let text: String = event.segs?.iter().map(|s| s.utf8.as_str()).collect();
            let text = text.replace('\n', " ");
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            Some(Segment {
                start_seconds: event.t_start_ms as f64 / 1000.0,
                duration_seconds: event.d_duration_ms.map(|d| d as f64 / 1000.0),
                speaker: None,
                text: text.to_string(),
            })
        })
        .collect();

    Ok(Transcript::new(segments))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_video_id() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_video_id("https://youtu.be/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_video_id("https://youtube.com/embed/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/shorts/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(extract_video_id(" dQw4w9WgXcQ "), Some("dQw4w9WgXcQ".to_string()));

        assert_eq!(extract_video_id("not-a-video-id"), None);
        assert_eq!(extract_video_id(""), None);
    }

    #[test]
    fn test_parse_json3() {
        let raw = r#"{
            "events": [
                {"tStartMs": 0, "dDurationMs": 61000},
                {"tStartMs": 1200, "dDurationMs": 2000, "segs": [{"utf8": "Hello"}, {"utf8": " world"}]},
                {"tStartMs": 3200, "segs": [{"utf8": "\n"}]},
                {"tStartMs": 65500, "dDurationMs": 1500, "segs": [{"utf8": "second\nline"}]}
            ]
        }"#;

        let transcript = parse_json3(raw).unwrap();
        assert_eq!(transcript.segments.len(), 2);
        assert_eq!(transcript.segments[0].text, "Hello world");
        assert_eq!(transcript.segments[0].start_seconds, 1.2);
        assert_eq!(transcript.segments[1].text, "second line");
        assert_eq!(transcript.duration_seconds(), 67.0);
    }
}
