//! Podcast audio locators.

use crate::error::{HarkError, Result};
use url::Url;

/// Canonicalize an audio URL so equivalent spellings share a cache key.
///
/// Lowercases scheme and host, drops default ports and fragments, keeps the
/// path and query untouched (signed CDN URLs depend on them).
pub fn canonical_audio_url(input: &str) -> Result<String> {
    let trimmed = input.trim();
    let mut url = Url::parse(trimmed)
        .map_err(|e| HarkError::InvalidInput(format!("Invalid audio URL '{}': {}", trimmed, e)))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(HarkError::InvalidInput(format!(
                "Unsupported audio URL scheme '{}' in '{}': use http or https",
                other, trimmed
            )))
        }
    }

    if url.host_str().map_or(true, |h| h.is_empty()) {
        return Err(HarkError::InvalidInput(format!("Audio URL has no host: '{}'", trimmed)));
    }

    url.set_fragment(None);
    Ok(url.to_string())
}

/// Best-effort human title from the last path segment of a URL.
pub fn title_from_url(input: &str) -> Option<String> {
    let url = Url::parse(input.trim()).ok()?;
    let last = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let stem = last.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(last);
    let title = stem.replace(['-', '_'], " ");
    let title = title.trim();
    (!title.is_empty()).then(|| title.to_string())
}
