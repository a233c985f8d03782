//! Canonical transcript model.
//!
//! Every source (captions, Gemini, Whisper, batch results) is normalized into
//! a [`Transcript`] before it is cached. Output formats are rendered from it on
//! read, see [`render`].

mod format;
mod parse;

pub use format::{render, OutputFormat, RenderOptions};
pub use parse::parse_timestamped;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A complete transcript with segments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Individual segments in playback order.
    pub segments: Vec<Segment>,
    /// Language code, when the source reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Transcript {
    /// Create a new transcript from segments.
    pub fn new(segments: Vec<Segment>) -> Self {
        Self {
            segments,
            language: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Total duration in seconds: the furthest point any segment reaches.
    pub fn duration_seconds(&self) -> f64 {
        self.segments
            .iter()
            .map(|s| s.end_seconds().unwrap_or(s.start_seconds))
            .fold(0.0, f64::max)
    }

    /// Segment texts joined with newlines, without timestamps or speakers.
    pub fn plain_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Speaker label to number of segments attributed to it.
    pub fn speakers(&self) -> BTreeMap<String, usize> {
        let mut map = BTreeMap::new();
        for speaker in self.segments.iter().filter_map(|s| s.speaker.as_deref()) {
            *map.entry(speaker.to_string()).or_insert(0) += 1;
        }
        map
    }

    /// Shift every segment by `offset` seconds.
    pub fn offset(mut self, offset: f64) -> Self {
        for segment in &mut self.segments {
            segment.start_seconds += offset;
        }
        self
    }
}

/// A single segment of a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start time in seconds.
    pub start_seconds: f64,
    /// Length in seconds, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    pub text: String,
}

impl Segment {
    pub fn new(start_seconds: f64, text: impl Into<String>) -> Self {
        Self {
            start_seconds,
            duration_seconds: None,
            speaker: None,
            text: text.into(),
        }
    }

    pub fn with_duration(mut self, duration_seconds: f64) -> Self {
        self.duration_seconds = Some(duration_seconds);
        self
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }

    pub fn end_seconds(&self) -> Option<f64> {
        self.duration_seconds.map(|d| self.start_seconds + d)
    }
}

/// Format seconds as MM:SS or HH:MM:SS.
pub fn format_timestamp(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0) as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

/// Format a duration as M:SS with unbounded minutes.
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0) as u64;
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_creation() {
        let transcript = Transcript::new(vec![
            Segment::new(0.0, "Hello world").with_duration(5.0),
            Segment::new(5.0, "This is a test").with_duration(5.0),
        ]);

        assert_eq!(transcript.plain_text(), "Hello world\nThis is a test");
        assert_eq!(transcript.duration_seconds(), 10.0);
    }

    #[test]
    fn test_duration_without_segment_lengths() {
        let transcript = Transcript::new(vec![Segment::new(0.0, "a"), Segment::new(42.0, "b")]);
        assert_eq!(transcript.duration_seconds(), 42.0);
        assert_eq!(Transcript::default().duration_seconds(), 0.0);
    }

    #[test]
    fn test_speakers() {
        let transcript = Transcript::new(vec![
            Segment::new(0.0, "Hi").with_speaker("Speaker A"),
            Segment::new(3.0, "Hello").with_speaker("Speaker B"),
            Segment::new(6.0, "How are you").with_speaker("Speaker A"),
            Segment::new(9.0, "music"),
        ]);

        let speakers = transcript.speakers();
        assert_eq!(speakers.len(), 2);
        assert_eq!(speakers["Speaker A"], 2);
        assert_eq!(speakers["Speaker B"], 1);
    }

    #[test]
    fn test_offset() {
        let transcript = Transcript::new(vec![Segment::new(1.0, "a")]).offset(600.0);
        assert_eq!(transcript.segments[0].start_seconds, 601.0);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(65.0), "01:05");
        assert_eq!(format_timestamp(3665.0), "01:01:05");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "0:00");
        assert_eq!(format_duration(3725.9), "62:05");
    }
}
