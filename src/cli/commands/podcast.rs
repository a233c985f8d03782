//! Podcast command implementation.

use super::emit;
use crate::cli::preflight::{self, Operation};
use crate::cli::{Output, PodcastAction};
use crate::config::Settings;
use crate::discovery::FeedFinder;
use crate::fingerprint::TranscribeOptions;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run a podcast subcommand.
pub async fn run_podcast(action: &PodcastAction, settings: Settings) -> Result<()> {
    match action {
        PodcastAction::Find { name } => {
            let finder = FeedFinder::from_settings(&settings.discovery)?;
            let spinner = Output::spinner(&format!("Searching for '{}'", name));
            let found = finder.find_feed(name).await;
            spinner.finish_and_clear();

            let feed = found?;
            Output::header(&feed.title);
            Output::kv("Feed", &feed.feed_url);
            Output::kv("Found via", &feed.provider);
            if !feed.description.is_empty() {
                Output::kv("About", &feed.description);
            }
        }

        PodcastAction::Transcribe {
            audio_url,
            title,
            no_diarization,
            render,
            no_cache,
        } => {
            let options = TranscribeOptions {
                include_timestamps: !render.no_timestamps,
                speaker_diarization: !no_diarization,
                format: render.format,
            };
            let orchestrator = Orchestrator::new(settings)?;

            let spinner = Output::spinner(&format!("Transcribing {}", audio_url));
            let result = orchestrator
                .podcast_transcript(audio_url, title.as_deref(), &options, !no_cache)
                .await;
            spinner.finish_and_clear();

            let result = match result {
                Ok(result) => result,
                Err(e) => {
                    if let Err(missing) = preflight::check(Operation::Transcribe, orchestrator.settings()) {
                        Output::error(&missing.to_string());
                        Output::info("Run 'hark doctor' for detailed diagnostics.");
                    }
                    return Err(e.into());
                }
            };

            let label = result.entry.title.as_deref().unwrap_or(&result.entry.source);
            if result.cached {
                Output::info(&format!("'{}' served from cache", label));
            } else {
                Output::success(&format!("Transcribed '{}' ({} segments)", label, result.entry.content.segments.len()));
            }
            emit(&result.entry, render)?;
        }
    }

    Ok(())
}
