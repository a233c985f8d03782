//! Hark - cached transcripts for YouTube videos and podcasts
//!
//! Hark fetches the transcript of a YouTube video from its captions, or
//! transcribes a podcast episode from its audio, and keeps every result in a
//! content-addressed cache so the same request never pays twice.
//!
//! # Overview
//!
//! - Transcripts of single videos and episodes, cache first
//! - Batch jobs that transcribe many episodes in one asynchronous request
//! - RSS feed discovery by podcast name
//! - A CLI and an MCP server exposing the same operations
//!
//! # Architecture
//!
//! - `fingerprint` - Deterministic cache keys
//! - `cache` - Transcript and batch-job storage (SQLite, files, memory)
//! - `source` - YouTube captions and podcast URL handling
//! - `transcript` - Segment model, parsing and rendering
//! - `transcription` - Single-item transcription gateway (Gemini, Whisper)
//! - `batch` - Batch job submission, polling, waiting and collection
//! - `discovery` - Podcast feed lookup
//! - `orchestrator` - Cache-first single-item flows
//!
//! # Example
//!
//! ```rust,no_run
//! use hark::config::Settings;
//! use hark::orchestrator::Orchestrator;
//! use hark::transcript::{render, RenderOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!
//!     let result = orchestrator.youtube_transcript("dQw4w9WgXcQ", true).await?;
//!     println!("{}", render(&result.entry, &RenderOptions::default()));
//!
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod backoff;
pub mod batch;
pub mod cache;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod fingerprint;
pub mod gemini;
pub mod mcp;
pub mod openai;
pub mod orchestrator;
pub mod source;
pub mod transcript;
pub mod transcription;

pub use error::{HarkError, Result};
