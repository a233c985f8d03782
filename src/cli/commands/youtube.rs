//! Youtube command implementation.

use super::emit;
use crate::cli::preflight::{self, Operation};
use crate::cli::{Output, RenderArgs};
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run the youtube command.
pub async fn run_youtube(input: &str, render: &RenderArgs, no_cache: bool, settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;

    let spinner = Output::spinner(&format!("Fetching captions for {}", input));
    let result = match orchestrator.youtube_transcript(input, !no_cache).await {
        Ok(result) => result,
        Err(e) => {
            spinner.finish_and_clear();
            if preflight::check(Operation::Captions, orchestrator.settings()).is_err() {
                Output::info("Run 'hark doctor' for detailed diagnostics.");
            }
            return Err(e.into());
        }
    };
    spinner.finish_and_clear();

    let title = result.entry.title.as_deref().unwrap_or(&result.entry.source);
    if result.cached {
        Output::info(&format!("'{}' served from cache", title));
    } else {
        Output::success(&format!("Fetched '{}' ({} segments)", title, result.entry.content.segments.len()));
    }

    emit(&result.entry, render)
}
