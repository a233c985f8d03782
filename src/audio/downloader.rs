//! Audio download and processing utilities.
//!
//! Downloads episode audio over HTTP and splits long files with ffmpeg.

use crate::error::{HarkError, Result};
use futures::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "wav", "ogg", "opus", "flac", "aac"];

/// MIME type for an audio file, from its extension.
pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("wav") => "audio/wav",
        Some("ogg") | Some("opus") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("aac") => "audio/aac",
        _ => "audio/mpeg",
    }
}

/// File extension guessed from an audio URL, defaulting to mp3.
fn extension_from_url(url: &str) -> &'static str {
    let path = url::Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_default();

    AUDIO_EXTENSIONS
        .iter()
        .find(|ext| path.ends_with(&format!(".{}", ext)))
        .copied()
        .unwrap_or("mp3")
}

/// Filesystem-safe stem from an episode title.
fn safe_file_stem(title: Option<&str>) -> String {
    let stem: String = title
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .take(100)
        .collect();
    let stem = stem.trim();

    if stem.is_empty() {
        format!("audio_{}", uuid::Uuid::new_v4().simple())
    } else {
        stem.replace(' ', "_")
    }
}

/// Downloads audio from a URL into `output_dir`.
///
/// The body is streamed to a temporary file in the same directory and renamed
/// into place once complete. Downloads larger than `max_bytes` are rejected.
#[instrument(skip(client, output_dir))]
pub async fn download_audio(
    client: &reqwest::Client,
    url: &str,
    output_dir: &Path,
    title: Option<&str>,
    max_bytes: u64,
) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let target_path = output_dir.join(format!(
        "{}.{}",
        safe_file_stem(title),
        extension_from_url(url)
    ));

    info!("Downloading audio from {}", url);

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(HarkError::from_status(status, &format!("GET {}", url), &body));
    }

    if let Some(length) = response.content_length() {
        if length > max_bytes {
            return Err(HarkError::InvalidInput(format!(
                "Audio at {} is {} bytes, larger than the {} byte limit",
                url, length, max_bytes
            )));
        }
    }

    let mut temp = tempfile::NamedTempFile::new_in(output_dir)?;
    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        written += chunk.len() as u64;
        if written > max_bytes {
            return Err(HarkError::InvalidInput(format!(
                "Audio at {} exceeds the {} byte limit",
                url, max_bytes
            )));
        }
        temp.write_all(&chunk)?;
    }
    temp.flush()?;

    if written == 0 {
        return Err(HarkError::AudioDownload(format!("Empty response body from {}", url)));
    }

    temp.persist(&target_path).map_err(|e| HarkError::Io(e.error))?;
    debug!("Downloaded {} bytes to {:?}", written, target_path);

    Ok(target_path)
}

/// Segments a long audio file into smaller chunks for processing.
///
/// Each chunk will be approximately `chunk_seconds` long. Returns tuples of
/// (chunk_path, offset_seconds) for each segment.
#[instrument(skip_all)]
pub async fn split_audio(
    source: &Path,
    output_dir: &Path,
    chunk_seconds: u32,
) -> Result<Vec<(PathBuf, f64)>> {
    std::fs::create_dir_all(output_dir)?;

    let total_duration = probe_duration(source).await?;
    info!("Total audio duration: {:.1}s", total_duration);

    let chunk_len = chunk_seconds.max(1) as f64;

    // Short audio doesn't need splitting
    if total_duration <= chunk_len {
        return Ok(vec![(source.to_path_buf(), 0.0)]);
    }

    let base_name = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("audio");
    let extension = source
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("mp3");

    let mut segments = Vec::new();
    let mut offset = 0.0;
    let mut idx = 0u32;

    while offset < total_duration {
        let segment_path = output_dir.join(format!("{}_{:04}.{}", base_name, idx, extension));
        let segment_len = chunk_len.min(total_duration - offset);

        extract_segment(source, &segment_path, offset, segment_len).await?;

        debug!("Created segment {} at offset {:.1}s", idx, offset);
        segments.push((segment_path, offset));

        offset += chunk_len;
        idx += 1;
    }

    info!("Created {} audio segments", segments.len());
    Ok(segments)
}

/// Extracts a time segment from an audio file.
async fn extract_segment(source: &Path, dest: &Path, start: f64, length: f64) -> Result<()> {
    // First attempt: stream copy (fast, no quality loss)
    let copy_result = Command::new("ffmpeg")
        .arg("-ss").arg(format!("{:.3}", start))
        .arg("-i").arg(source)
        .arg("-t").arg(format!("{:.3}", length))
        .arg("-c").arg("copy")
        .arg("-y")
        .arg("-loglevel").arg("warning")
        .arg(dest)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    if let Ok(status) = copy_result {
        if status.success() && dest.exists() {
            return Ok(());
        }
    }

    warn!("Stream copy failed, re-encoding segment");

    let mp3_dest = dest.with_extension("mp3");
    let encode_result = Command::new("ffmpeg")
        .arg("-ss").arg(format!("{:.3}", start))
        .arg("-i").arg(source)
        .arg("-t").arg(format!("{:.3}", length))
        .arg("-codec:a").arg("libmp3lame")
        .arg("-qscale:a").arg("2")
        .arg("-y")
        .arg("-loglevel").arg("error")
        .arg(&mp3_dest)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await;

    match encode_result {
        Ok(out) if out.status.success() => {
            if mp3_dest != dest {
                std::fs::rename(&mp3_dest, dest)?;
            }
            Ok(())
        }
        Ok(out) => {
            let err = String::from_utf8_lossy(&out.stderr);
            Err(HarkError::ToolFailed(format!("Segment extraction failed: {err}")))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(HarkError::ToolNotFound("ffmpeg".into()))
        }
        Err(e) => Err(HarkError::ToolFailed(format!("ffmpeg error: {e}"))),
    }
}

/// Queries the duration of an audio file using ffprobe with JSON output.
pub async fn probe_duration(path: &Path) -> Result<f64> {
    let result = Command::new("ffprobe")
        .arg("-v").arg("quiet")
        .arg("-print_format").arg("json")
        .arg("-show_format")
        .arg(path)
        .output()
        .await;

    let output = match result {
        Ok(o) => o,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(HarkError::ToolNotFound("ffprobe".into()));
        }
        Err(e) => {
            return Err(HarkError::ToolFailed(format!("ffprobe failed: {e}")));
        }
    };

    if !output.status.success() {
        return Err(HarkError::ToolFailed("ffprobe returned error".into()));
    }

    let json_str = String::from_utf8_lossy(&output.stdout);
    let parsed: serde_json::Value = serde_json::from_str(&json_str)
        .map_err(|_| HarkError::ToolFailed("Invalid ffprobe output".into()))?;

    parsed["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| HarkError::ToolFailed("Could not determine audio duration".into()))
}
