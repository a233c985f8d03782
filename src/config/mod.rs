//! Configuration module for Hark.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{Prompts, TranscriptionPrompts};
pub use settings::{
    BackoffSettings, BatchSettings, CacheProvider, CacheSettings, DiscoverySettings,
    GeminiSettings, GeneralSettings, PromptSettings, Settings, TranscriptionProvider,
    TranscriptionSettings,
};

/// Load `.env` files without overriding variables already set.
///
/// Looks in the working directory and then the data directory. Placeholder
/// values left over from templates are ignored.
pub fn load_env(settings: &Settings) {
    let candidates = [
        std::path::PathBuf::from(".env"),
        settings.data_dir().join(".env"),
    ];

    for path in candidates.iter().filter(|p| p.exists()) {
        let Ok(iter) = dotenv::from_path_iter(path) else {
            continue;
        };
        for (key, value) in iter.flatten() {
            if value.is_empty() || value == "your-api-key-here" {
                continue;
            }
            if std::env::var_os(&key).is_none() {
                std::env::set_var(key, value);
            }
        }
    }
}
