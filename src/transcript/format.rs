//! Transcript output formatting (Markdown, JSON, text, SRT, VTT).
//!
//! Renderers are stateless: the cache stores one canonical transcript and
//! every format/timestamp variant is produced here on read.

use super::{format_duration, Segment, Transcript};
use crate::cache::CacheEntry;
use crate::fingerprint::SourceType;
use serde::{Deserialize, Serialize};

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
    Text,
    Srt,
    Vtt,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "markdown",
            OutputFormat::Json => "json",
            OutputFormat::Text => "text",
            OutputFormat::Srt => "srt",
            OutputFormat::Vtt => "vtt",
        }
    }

    /// Conventional file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Json => "json",
            OutputFormat::Text => "txt",
            OutputFormat::Srt => "srt",
            OutputFormat::Vtt => "vtt",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "json" => Ok(OutputFormat::Json),
            "text" | "txt" => Ok(OutputFormat::Text),
            "srt" => Ok(OutputFormat::Srt),
            "vtt" | "webvtt" => Ok(OutputFormat::Vtt),
            _ => Err(format!(
                "Unknown format: {}. Use markdown, json, text, srt, or vtt.",
                s
            )),
        }
    }
}

/// How to render a cached transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub format: OutputFormat,
    pub include_timestamps: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Markdown,
            include_timestamps: true,
        }
    }
}

impl From<&crate::fingerprint::TranscribeOptions> for RenderOptions {
    fn from(options: &crate::fingerprint::TranscribeOptions) -> Self {
        Self {
            format: options.format,
            include_timestamps: options.include_timestamps,
        }
    }
}

/// Render a cache entry in the requested format.
pub fn render(entry: &CacheEntry, options: &RenderOptions) -> String {
    match options.format {
        OutputFormat::Markdown => format_markdown(entry, options.include_timestamps),
        OutputFormat::Json => format_json(entry),
        OutputFormat::Text => format_text(&entry.content, options.include_timestamps),
        OutputFormat::Srt => format_srt(&entry.content),
        OutputFormat::Vtt => format_vtt(&entry.content),
    }
}

/// `[MM:SS]` with unbounded minutes.
fn short_stamp(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("[{:02}:{:02}]", total / 60, total % 60)
}

fn speaker_prefix(segment: &Segment) -> String {
    match &segment.speaker {
        Some(speaker) => format!("{}: ", speaker),
        None => String::new(),
    }
}

fn format_markdown(entry: &CacheEntry, include_timestamps: bool) -> String {
    let transcript = &entry.content;
    let heading = match entry.source_type {
        SourceType::YouTube => "# YouTube Transcript",
        SourceType::Podcast => "# Podcast Transcript",
    };
    let source_label = match entry.source_type {
        SourceType::YouTube => "Video ID",
        SourceType::Podcast => "Source",
    };

    let mut lines = vec![
        heading.to_string(),
        String::new(),
        format!("**{}**: {}", source_label, entry.source),
    ];

    if transcript.is_empty() {
        lines.push(String::new());
        lines.push("No transcript data available.".to_string());
        return lines.join("\n");
    }

    if let Some(title) = &entry.title {
        lines.push(format!("**Title**: {}", title));
    }
    let duration = entry.duration_seconds.unwrap_or_else(|| transcript.duration_seconds());
    lines.push(format!("**Total Entries**: {}", transcript.segments.len()));
    lines.push(format!("**Duration**: {}", format_duration(duration)));

    let speakers = transcript.speakers();
    if !speakers.is_empty() {
        let names: Vec<&str> = speakers.keys().map(String::as_str).collect();
        lines.push(format!("**Speakers**: {}", names.join(", ")));
    }
    lines.push(format!("**Cache Key**: {}", entry.fingerprint));
    lines.push(String::new());
    lines.push("## Transcript".to_string());
    lines.push(String::new());

    for segment in &transcript.segments {
        if include_timestamps {
            lines.push(format!(
                "**{}** {}{}",
                short_stamp(segment.start_seconds),
                speaker_prefix(segment),
                segment.text
            ));
        } else {
            lines.push(format!("{}{}", speaker_prefix(segment), segment.text));
        }
    }

    lines.join("\n")
}

/// JSON-serializable transcript for export.
#[derive(Debug, Serialize)]
struct TranscriptExport<'a> {
    fingerprint: &'a str,
    source_type: SourceType,
    source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    duration_seconds: f64,
    total_entries: usize,
    created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
    transcript: Vec<SegmentExport<'a>>,
}

#[derive(Debug, Serialize)]
struct SegmentExport<'a> {
    text: &'a str,
    start: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speaker: Option<&'a str>,
}

fn format_json(entry: &CacheEntry) -> String {
    let transcript = &entry.content;
    let export = TranscriptExport {
        fingerprint: entry.fingerprint.as_str(),
        source_type: entry.source_type,
        source: &entry.source,
        title: entry.title.as_deref(),
        duration_seconds: entry.duration_seconds.unwrap_or_else(|| transcript.duration_seconds()),
        total_entries: transcript.segments.len(),
        created_at: entry.created_at.to_rfc3339(),
        language: transcript.language.as_deref(),
        transcript: transcript
            .segments
            .iter()
            .map(|s| SegmentExport {
                text: &s.text,
                start: s.start_seconds,
                duration: s.duration_seconds,
                speaker: s.speaker.as_deref(),
            })
            .collect(),
    };
    serde_json::to_string_pretty(&export).unwrap_or_else(|_| "{}".to_string())
}

fn format_text(transcript: &Transcript, include_timestamps: bool) -> String {
    transcript
        .segments
        .iter()
        .map(|s| {
            if include_timestamps {
                format!("{} {}{}", short_stamp(s.start_seconds), speaker_prefix(s), s.text)
            } else {
                format!("{}{}", speaker_prefix(s), s.text)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cue end: the segment's own end, else the next segment's start, else 5s on.
fn cue_end(transcript: &Transcript, index: usize) -> f64 {
    let segment = &transcript.segments[index];
    segment
        .end_seconds()
        .or_else(|| transcript.segments.get(index + 1).map(|n| n.start_seconds))
        .filter(|end| *end > segment.start_seconds)
        .unwrap_or(segment.start_seconds + 5.0)
}

/// Format as SRT (SubRip).
fn format_srt(transcript: &Transcript) -> String {
    let mut output = String::new();

    for (i, segment) in transcript.segments.iter().enumerate() {
        // Sequence number (1-indexed)
        output.push_str(&format!("{}\n", i + 1));

        output.push_str(&format!(
            "{} --> {}\n",
            format_srt_timestamp(segment.start_seconds),
            format_srt_timestamp(cue_end(transcript, i))
        ));

        output.push_str(&speaker_prefix(segment));
        output.push_str(&segment.text);
        output.push_str("\n\n");
    }

    output
}

/// Format as WebVTT.
fn format_vtt(transcript: &Transcript) -> String {
    let mut output = String::from("WEBVTT\n\n");

    for (i, segment) in transcript.segments.iter().enumerate() {
        output.push_str(&format!("{}\n", i + 1));

        output.push_str(&format!(
            "{} --> {}\n",
            format_vtt_timestamp(segment.start_seconds),
            format_vtt_timestamp(cue_end(transcript, i))
        ));

        if let Some(speaker) = &segment.speaker {
            output.push_str(&format!("<v {}>", speaker));
        }
        output.push_str(&segment.text);
        output.push_str("\n\n");
    }

    output
}

fn split_ms(seconds: f64) -> (u64, u64, u64, u64) {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    (
        total_ms / 3_600_000,
        (total_ms % 3_600_000) / 60_000,
        (total_ms % 60_000) / 1000,
        total_ms % 1000,
    )
}

/// Format timestamp for SRT (00:00:00,000).
fn format_srt_timestamp(seconds: f64) -> String {
    let (h, m, s, ms) = split_ms(seconds);
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

/// Format timestamp for VTT (00:00:00.000).
fn format_vtt_timestamp(seconds: f64) -> String {
    let (h, m, s, ms) = split_ms(seconds);
    format!("{:02}:{:02}:{:02}.{:03}", h, m, s, ms)
}
