//! Cache command implementation.

use super::emit;
use crate::cli::{CacheAction, Output};
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run a cache subcommand.
pub async fn run_cache(action: &CacheAction, settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;

    match action {
        CacheAction::Get { fingerprint, render } => {
            let entry = orchestrator.cached(fingerprint).await?;
            emit(&entry, render)?;
        }

        CacheAction::List { limit, sort } => {
            let entries = orchestrator.list_cached(*limit, *sort).await?;
            if entries.is_empty() {
                Output::info("Cache is empty. Use 'hark youtube' or 'hark podcast transcribe' to add transcripts.");
                return Ok(());
            }

            Output::header(&format!("Cached Transcripts ({})", entries.len()));
            println!();
            for summary in &entries {
                Output::cache_summary(summary);
            }
        }
    }

    Ok(())
}
