//! Parser for timestamped model output.
//!
//! Accepts the line shapes transcription models produce when asked for
//! `[MM:SS] Speaker A: text`: bracketed `MM:SS` or `HH:MM:SS` stamps, optional
//! markdown bold around the stamp, optional speaker label. Lines without a
//! stamp continue the previous segment.

use super::{Segment, Transcript};
use regex::Regex;
use std::sync::OnceLock;

fn line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:\*\*)?\[(?:(\d{1,2}):)?(\d{1,3}):(\d{2})(?:\.\d+)?\](?:\*\*)?\s*(?:(?:\*\*)?(Speaker\s+[A-Za-z0-9]+)(?:\*\*)?:(?:\*\*)?\s+)?(.*)$",
        )
        .expect("timestamp line pattern is valid")
    })
}

fn speaker_only_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:\*\*)?(Speaker\s+[A-Za-z0-9]+)(?:\*\*)?:(?:\*\*)?\s+(.*)$")
            .expect("speaker line pattern is valid")
    })
}

/// Parse timestamped transcript text into segments.
///
/// Segment durations are filled from the gap to the next stamp; the last
/// segment's duration stays unknown.
pub fn parse_timestamped(text: &str) -> Transcript {
    let mut segments: Vec<Segment> = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(caps) = line_regex().captures(line) {
            let hours: f64 = caps.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(0.0);
            let minutes: f64 = caps[2].parse().unwrap_or(0.0);
            let seconds: f64 = caps[3].parse().unwrap_or(0.0);
            let start = hours * 3600.0 + minutes * 60.0 + seconds;

            let mut segment = Segment::new(start, caps[5].trim());
            if let Some(speaker) = caps.get(4) {
                segment = segment.with_speaker(speaker.as_str().trim());
            }
            segments.push(segment);
            continue;
        }

        // Untimed speaker turns start a new segment at the previous start.
        if let Some(caps) = speaker_only_regex().captures(line) {
            let start = segments.last().map(|s| s.start_seconds).unwrap_or(0.0);
            segments.push(Segment::new(start, caps[2].trim()).with_speaker(caps[1].trim()));
            continue;
        }

        match segments.last_mut() {
            Some(last) if !last.text.is_empty() => {
                last.text.push(' ');
                last.text.push_str(line);
            }
            Some(last) => last.text.push_str(line),
            None => segments.push(Segment::new(0.0, line)),
        }
    }

    segments.retain(|s| !s.text.is_empty());

    let starts: Vec<f64> = segments.iter().map(|s| s.start_seconds).collect();
    for (segment, next_start) in segments.iter_mut().zip(starts.iter().skip(1)) {
        if *next_start > segment.start_seconds {
            segment.duration_seconds = Some(next_start - segment.start_seconds);
        }
    }

    Transcript::new(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_speaker_lines() {
        let text = "[00:00] Speaker A: Welcome to the show.\n\
                    [00:04] Speaker B: Thanks for having me.\n\
                    It's great to be here.\n\
                    [01:02:03] Speaker A: Let's wrap up.";

        let transcript = parse_timestamped(text);
        assert_eq!(transcript.segments.len(), 3);

        let first = &transcript.segments[0];
        assert_eq!(first.start_seconds, 0.0);
        assert_eq!(first.speaker.as_deref(), Some("Speaker A"));
        assert_eq!(first.text, "Welcome to the show.");
        assert_eq!(first.duration_seconds, Some(4.0));

        let second = &transcript.segments[1];
        assert_eq!(second.text, "Thanks for having me. It's great to be here.");

        let third = &transcript.segments[2];
        assert_eq!(third.start_seconds, 3723.0);
        assert_eq!(third.duration_seconds, None);
    }

    #[test]
    fn test_parse_bold_stamps_without_speakers() {
        let text = "**[00:05]** First line\n**[00:10]** Second line";
        let transcript = parse_timestamped(text);

        assert_eq!(transcript.segments.len(), 2);
        assert_eq!(transcript.segments[0].start_seconds, 5.0);
        assert_eq!(transcript.segments[0].speaker, None);
        assert_eq!(transcript.segments[1].text, "Second line");
    }

    #[test]
    fn test_parse_untimed_text() {
        let transcript = parse_timestamped("Just some words.\nAnd some more.");
        assert_eq!(transcript.segments.len(), 1);
        assert_eq!(transcript.segments[0].start_seconds, 0.0);
        assert_eq!(transcript.segments[0].text, "Just some words. And some more.");
    }

    #[test]
    fn test_parse_untimed_speakers() {
        let transcript = parse_timestamped("Speaker A: Hi.\nSpeaker B: Hello.");
        assert_eq!(transcript.segments.len(), 2);
        assert_eq!(transcript.speakers().len(), 2);
    }

    #[test]
    fn test_parse_long_minutes() {
        let transcript = parse_timestamped("[75:30] Still going");
        assert_eq!(transcript.segments[0].start_seconds, 4530.0);
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_timestamped("").is_empty());
        assert!(parse_timestamped("\n\n  \n").is_empty());
    }
}
