//! Pre-flight checks before expensive operations.
//!
//! Validates that required tools and credentials are available before
//! starting operations that would otherwise fail midway.

use crate::config::{Settings, TranscriptionProvider};
use crate::error::{HarkError, Result};
use std::process::Command;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Captions need yt-dlp.
    Captions,
    /// Single-item transcription needs the provider's key (and ffmpeg for Whisper).
    Transcribe,
    /// Batch jobs need the Gemini key.
    Batch,
    /// Reading the cache needs nothing external.
    CacheRead,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Captions => check_tool("yt-dlp")?,
        Operation::Transcribe => match settings.transcription.provider {
            TranscriptionProvider::Gemini => check_gemini_key(settings)?,
            TranscriptionProvider::Whisper => {
                check_openai_key()?;
                check_tool("ffmpeg")?;
                check_tool("ffprobe")?;
            }
        },
        Operation::Batch => check_gemini_key(settings)?,
        Operation::CacheRead => {}
    }
    Ok(())
}

fn check_gemini_key(settings: &Settings) -> Result<()> {
    if settings.gemini.is_api_key_configured() {
        Ok(())
    } else {
        Err(HarkError::Config(format!(
            "{} not set. Set it with: export {}='...'",
            settings.gemini.api_key_env, settings.gemini.api_key_env
        )))
    }
}

fn check_openai_key() -> Result<()> {
    if crate::openai::is_api_key_configured() {
        Ok(())
    } else {
        Err(HarkError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        ))
    }
}

/// Check if an external tool is available.
fn check_tool(name: &str) -> Result<()> {
    // ffmpeg/ffprobe use -version (single dash), others use --version
    let version_arg = match name {
        "ffmpeg" | "ffprobe" => "-version",
        _ => "--version",
    };
    match Command::new(name).arg(version_arg).output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(HarkError::ToolNotFound(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(HarkError::ToolNotFound(name.to_string())),
        Err(e) => Err(HarkError::ToolNotFound(format!("{}: {}", name, e))),
    }
}
