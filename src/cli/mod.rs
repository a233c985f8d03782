//! CLI module for Hark.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use crate::cache::SortKey;
use crate::transcript::OutputFormat;
use clap::{Args, Parser, Subcommand};

/// Hark - cached transcripts for YouTube videos and podcasts
///
/// Transcribes one item at a time or many at once through batch jobs. Every
/// transcript is cached by fingerprint, so asking twice never pays twice.
#[derive(Parser, Debug)]
#[command(name = "hark")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags controlling how a transcript is printed.
#[derive(Args, Debug, Clone)]
pub struct RenderArgs {
    /// Output format (markdown, json, text, srt, vtt)
    #[arg(long, default_value = "markdown")]
    pub format: OutputFormat,

    /// Omit timestamps from markdown and text output
    #[arg(long)]
    pub no_timestamps: bool,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check system requirements and configuration
    Doctor,

    /// Get the transcript of a YouTube video from its captions
    Youtube {
        /// YouTube URL or 11-character video ID
        input: String,

        #[command(flatten)]
        render: RenderArgs,

        /// Ignore any cached transcript and fetch again
        #[arg(long)]
        no_cache: bool,
    },

    /// Find podcast feeds and transcribe episodes
    Podcast {
        #[command(subcommand)]
        action: PodcastAction,
    },

    /// Read the transcript cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Transcribe many episodes in one batch job
    Batch {
        #[command(subcommand)]
        action: BatchAction,
    },

    /// Start MCP server for AI assistant integration
    Mcp,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum PodcastAction {
    /// Find the RSS feed of a podcast by name
    Find {
        /// Podcast name
        name: String,
    },

    /// Transcribe one episode from its audio URL
    Transcribe {
        /// Direct audio URL (mp3, m4a, ...)
        audio_url: String,

        /// Episode title
        #[arg(long)]
        title: Option<String>,

        /// Do not label speakers
        #[arg(long)]
        no_diarization: bool,

        #[command(flatten)]
        render: RenderArgs,

        /// Ignore any cached transcript and transcribe again
        #[arg(long)]
        no_cache: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Print a cached transcript by fingerprint
    Get {
        /// Fingerprint shown by `cache list`
        fingerprint: String,

        #[command(flatten)]
        render: RenderArgs,
    },

    /// List cached transcripts
    List {
        /// Maximum number of entries
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Sort order (created, title, duration)
        #[arg(short, long, default_value = "created")]
        sort: SortKey,
    },
}

/// Flags for waiting on a batch job.
#[derive(Args, Debug, Clone)]
pub struct WaitArgs {
    /// Seconds between polls (defaults to the configured interval)
    #[arg(long)]
    pub interval: Option<u64>,

    /// Give up after this many seconds (defaults to the configured maximum)
    #[arg(long)]
    pub max_wait: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum BatchAction {
    /// Submit a batch job
    Submit {
        /// Audio URL, optionally followed by `::Title` (repeatable)
        #[arg(short, long = "url")]
        urls: Vec<String>,

        /// JSON array of targets or a text file with one `URL[::Title]` per line
        #[arg(short, long)]
        file: Option<String>,

        /// Display name for the job
        #[arg(short, long)]
        name: Option<String>,

        /// Do not label speakers
        #[arg(long)]
        no_diarization: bool,

        /// Wait for the job and collect its results
        #[arg(short, long)]
        wait: bool,

        #[command(flatten)]
        wait_args: WaitArgs,
    },

    /// Show the state of a batch job
    Status {
        /// Job name, e.g. batches/abc123
        job: String,
    },

    /// Wait until a batch job finishes
    Wait {
        /// Job name
        job: String,

        #[command(flatten)]
        wait_args: WaitArgs,
    },

    /// Store the results of a finished job in the cache
    Collect {
        /// Job name
        job: String,
    },

    /// Cancel a running batch job
    Cancel {
        /// Job name
        job: String,
    },

    /// List recent batch jobs
    List {
        /// Maximum number of jobs
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}
