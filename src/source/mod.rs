//! Media sources: streamed-caption video and downloadable audio.
//!
//! Turns user input (URLs, IDs) into the normalized locators fingerprints are
//! computed from, and fetches captions for video sources.

mod podcast;
mod youtube;

pub use podcast::{canonical_audio_url, title_from_url};
pub use youtube::{extract_video_id, parse_json3, CaptionFetcher, CaptionTrack, YtDlpCaptions};
