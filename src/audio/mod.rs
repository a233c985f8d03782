//! Audio download and processing.

mod downloader;

pub use downloader::{download_audio, mime_type_for, probe_duration, split_audio};
