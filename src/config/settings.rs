//! Configuration settings for Hark.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub cache: CacheSettings,
    pub transcription: TranscriptionSettings,
    pub gemini: GeminiSettings,
    pub batch: BatchSettings,
    pub discovery: DiscoverySettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Directory for temporary files.
    pub temp_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.cache/hark".to_string(),
            temp_dir: "/tmp/hark".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Cache backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum CacheProvider {
    /// Single SQLite database (default).
    #[default]
    Sqlite,
    /// One JSON file per transcript.
    File,
}

impl std::str::FromStr for CacheProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(CacheProvider::Sqlite),
            "file" | "json" => Ok(CacheProvider::File),
            _ => Err(format!("Unknown cache provider: {}", s)),
        }
    }
}

impl std::fmt::Display for CacheProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheProvider::Sqlite => write!(f, "sqlite"),
            CacheProvider::File => write!(f, "file"),
        }
    }
}

/// Transcript cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Cache provider (sqlite, file).
    pub provider: CacheProvider,
    /// Path to SQLite database (for sqlite provider).
    pub sqlite_path: String,
    /// Directory of JSON records (for file provider).
    pub dir: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            provider: CacheProvider::Sqlite,
            sqlite_path: "~/.cache/hark/transcripts.db".to_string(),
            dir: "~/.cache/hark/transcripts".to_string(),
        }
    }
}

/// Transcription provider type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionProvider {
    /// Google Gemini (default; inline or staged upload).
    #[default]
    Gemini,
    /// OpenAI Whisper with ffmpeg chunking.
    Whisper,
}

impl std::str::FromStr for TranscriptionProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(TranscriptionProvider::Gemini),
            "whisper" | "openai" => Ok(TranscriptionProvider::Whisper),
            _ => Err(format!("Unknown transcription provider: {}", s)),
        }
    }
}

impl std::fmt::Display for TranscriptionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscriptionProvider::Gemini => write!(f, "gemini"),
            TranscriptionProvider::Whisper => write!(f, "whisper"),
        }
    }
}

/// Transcription service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    /// Transcription provider (gemini, whisper).
    pub provider: TranscriptionProvider,
    /// Render timestamps by default.
    pub include_timestamps: bool,
    /// Label speakers by default.
    pub speaker_diarization: bool,
    /// Largest file sent inline; bigger files go through the upload path.
    pub inline_limit_bytes: u64,
    /// Whisper model (whisper provider).
    pub whisper_model: String,
    /// Duration in seconds for splitting long audio files (whisper provider).
    pub whisper_chunk_seconds: u32,
    /// Maximum concurrent chunk processing.
    pub max_concurrent_chunks: usize,
    /// Largest audio download accepted.
    pub max_download_bytes: u64,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            provider: TranscriptionProvider::Gemini,
            include_timestamps: true,
            speaker_diarization: true,
            inline_limit_bytes: 20 * 1024 * 1024,
            whisper_model: "whisper-1".to_string(),
            whisper_chunk_seconds: 600,
            max_concurrent_chunks: 3,
            max_download_bytes: 2 * 1024 * 1024 * 1024,
        }
    }
}

/// Gemini API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiSettings {
    pub model: String,
    pub api_base: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub request_timeout_secs: u64,
    /// Interval between checks while an uploaded file is processing.
    pub file_poll_interval_secs: u64,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".to_string(),
            api_base: "https://generativelanguage.googleapis.com".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            request_timeout_secs: 300,
            file_poll_interval_secs: 2,
        }
    }
}

impl GeminiSettings {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> crate::error::Result<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                crate::error::HarkError::Config(format!(
                    "Google API key is required. Please set the {} environment variable.",
                    self.api_key_env
                ))
            })
    }

    pub fn is_api_key_configured(&self) -> bool {
        self.api_key().is_ok()
    }
}

/// Exponential backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackoffSettings {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    /// Total attempts including the first one.
    pub max_attempts: u32,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            max_attempts: 3,
        }
    }
}

/// Batch transcription settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Most targets accepted in one job.
    pub max_targets: usize,
    /// Largest single input accepted.
    pub max_input_bytes: u64,
    pub poll_interval_secs: u64,
    pub max_wait_secs: u64,
    /// Hours after submission when the service expires an unfinished job.
    pub expiry_hours: u64,
    /// Backoff for transient errors while waiting.
    pub transient_retry: BackoffSettings,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_targets: 100,
            max_input_bytes: 2 * 1024 * 1024 * 1024,
            poll_interval_secs: 60,
            max_wait_secs: 24 * 60 * 60,
            expiry_hours: 48,
            transient_retry: BackoffSettings {
                base_delay_ms: 5_000,
                multiplier: 2.0,
                max_delay_ms: 120_000,
                max_attempts: 5,
            },
        }
    }
}

/// Feed discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Providers in the order they are tried (podcastindex, apple, hosts).
    pub providers: Vec<String>,
    pub backoff: BackoffSettings,
    pub request_timeout_secs: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            providers: vec![
                "podcastindex".to_string(),
                "apple".to_string(),
                "hosts".to_string(),
            ],
            backoff: BackoffSettings::default(),
            request_timeout_secs: 10,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::HarkError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hark")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded temp directory path.
    pub fn temp_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.temp_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.cache.sqlite_path)
    }

    /// Get the expanded file cache directory.
    pub fn cache_dir(&self) -> PathBuf {
        Self::expand_path(&self.cache.dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.cache.provider, CacheProvider::Sqlite);
        assert_eq!(settings.transcription.provider, TranscriptionProvider::Gemini);
        assert_eq!(settings.transcription.inline_limit_bytes, 20 * 1024 * 1024);
        assert_eq!(settings.gemini.model, "gemini-1.5-flash");
        assert_eq!(settings.batch.poll_interval_secs, 60);
        assert_eq!(settings.discovery.providers.len(), 3);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [cache]
            provider = "file"

            [batch]
            max_targets = 10

            [batch.transient_retry]
            max_attempts = 2
            "#,
        )
        .unwrap();

        assert_eq!(settings.cache.provider, CacheProvider::File);
        assert_eq!(settings.cache.sqlite_path, "~/.cache/hark/transcripts.db");
        assert_eq!(settings.batch.max_targets, 10);
        assert_eq!(settings.batch.transient_retry.max_attempts, 2);
        assert_eq!(settings.batch.transient_retry.multiplier, 2.0);
        assert_eq!(settings.batch.expiry_hours, 48);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut settings = Settings::default();
        settings.transcription.provider = TranscriptionProvider::Whisper;
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.transcription.provider, TranscriptionProvider::Whisper);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = PathBuf::from("/nonexistent/hark/config.toml");
        let settings = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(settings.general.temp_dir, "/tmp/hark");
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!("json".parse::<CacheProvider>().unwrap(), CacheProvider::File);
        assert_eq!("openai".parse::<TranscriptionProvider>().unwrap(), TranscriptionProvider::Whisper);
        assert!("redis".parse::<CacheProvider>().is_err());
    }
}
