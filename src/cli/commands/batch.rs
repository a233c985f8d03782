//! Batch command implementation.

use crate::backoff::Backoff;
use crate::batch::{
    open_manager, wait_until_terminal, BatchJobManager, BatchJobStatus, BatchOptions, TargetDescriptor,
};
use crate::cache::open_store;
use crate::cli::preflight::{self, Operation};
use crate::cli::{BatchAction, Output, WaitArgs};
use crate::config::Settings;
use crate::error::HarkError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Run a batch subcommand.
pub async fn run_batch(action: &BatchAction, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Batch, &settings) {
        Output::error(&e.to_string());
        Output::info("Run 'hark doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let store = open_store(&settings)?;
    let manager = open_manager(&settings, store)?;

    match action {
        BatchAction::Submit {
            urls,
            file,
            name,
            no_diarization,
            wait,
            wait_args,
        } => {
            let mut targets = urls
                .iter()
                .map(|u| u.parse::<TargetDescriptor>())
                .collect::<std::result::Result<Vec<_>, _>>()?;
            if let Some(path) = file {
                targets.extend(load_targets(Path::new(path))?);
            }

            let options = BatchOptions {
                display_name: name.clone(),
                speaker_diarization: !no_diarization,
                include_timestamps: true,
            };

            let spinner = Output::spinner(&format!("Uploading {} episode(s)", targets.len()));
            let submitted = manager.submit(targets, options).await;
            spinner.finish_and_clear();
            let status = submitted?;

            Output::success(&format!("Submitted batch job {}", status.name));
            Output::batch_status(&status);

            if *wait {
                let status = wait_for(&manager, &status.name, wait_args, &settings).await?;
                collect(&manager, &status.name).await?;
            } else {
                Output::info(&format!("Check progress with: hark batch status {}", status.name));
            }
        }

        BatchAction::Status { job } => {
            let status = manager.poll(job).await?;
            Output::batch_status(&status);
        }

        BatchAction::Wait { job, wait_args } => {
            let status = wait_for(&manager, job, wait_args, &settings).await?;
            Output::batch_status(&status);
            status.into_success()?;
            Output::info(&format!("Store the results with: hark batch collect {}", job));
        }

        BatchAction::Collect { job } => collect(&manager, job).await?,

        BatchAction::Cancel { job } => {
            let before = manager.poll(job).await?;
            let status = manager.cancel(job).await?;
            if before.state.is_terminal() {
                Output::warning(&format!("Job {} already finished as {}", job, status.state));
            } else {
                Output::success(&format!("Cancellation requested for {}", job));
            }
            Output::batch_status(&status);
        }

        BatchAction::List { limit } => {
            let jobs = manager.list(*limit).await?;
            if jobs.is_empty() {
                Output::info("No batch jobs found.");
                return Ok(());
            }
            Output::header(&format!("Batch Jobs ({})", jobs.len()));
            println!();
            for job in &jobs {
                Output::batch_summary(job);
            }
        }
    }

    Ok(())
}

async fn wait_for(
    manager: &BatchJobManager,
    job: &str,
    wait_args: &WaitArgs,
    settings: &Settings,
) -> Result<BatchJobStatus> {
    let interval = Duration::from_secs(wait_args.interval.unwrap_or(settings.batch.poll_interval_secs).max(1));
    let max_wait = Duration::from_secs(wait_args.max_wait.unwrap_or(settings.batch.max_wait_secs));
    let backoff = Backoff::from(&settings.batch.transient_retry);

    let spinner = Output::spinner(&format!("Waiting for {}", job));
    let result = wait_until_terminal(manager, job, interval, max_wait, &backoff).await;
    spinner.finish_and_clear();

    match result {
        Ok(status) => Ok(status),
        Err(e @ HarkError::DeadlineExceeded { .. }) => {
            Output::warning("The job is still running remotely; wait again later.");
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn collect(manager: &BatchJobManager, job: &str) -> Result<()> {
    let status = manager.poll(job).await?;
    status.into_success()?;

    let outcomes = manager.collect(job).await?;
    let stored = outcomes.iter().filter(|o| o.is_success()).count();

    Output::header(&format!("Results for {}", job));
    for outcome in &outcomes {
        Output::target_outcome(outcome);
    }
    println!();
    if stored == outcomes.len() {
        Output::success(&format!("Cached {} transcript(s)", stored));
    } else {
        Output::warning(&format!("Cached {} of {} transcript(s)", stored, outcomes.len()));
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TargetSpec {
    Line(String),
    Full(TargetDescriptor),
}

/// Targets from a JSON array (strings or objects) or a text file with one
/// `URL[::Title]` per line. Blank lines and `#` comments are skipped.
fn load_targets(path: &Path) -> Result<Vec<TargetDescriptor>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;

    if content.trim_start().starts_with('[') {
        let specs: Vec<TargetSpec> =
            serde_json::from_str(&content).with_context(|| format!("Invalid target list in {}", path.display()))?;
        return specs
            .into_iter()
            .map(|spec| match spec {
                TargetSpec::Line(line) => line.parse::<TargetDescriptor>().map_err(anyhow::Error::from),
                TargetSpec::Full(target) => Ok(target),
            })
            .collect();
    }

    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.parse::<TargetDescriptor>().map_err(anyhow::Error::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_text_targets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.txt");
        std::fs::write(
            &path,
            "# weekly\nhttps://cdn.test/a.mp3::Episode A\n\n  https://cdn.test/b.mp3  \n",
        )
        .unwrap();

        let targets = load_targets(&path).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].title.as_deref(), Some("Episode A"));
        assert_eq!(targets[1].audio_url, "https://cdn.test/b.mp3");
        assert!(targets[1].title.is_none());
    }

    #[test]
    fn test_load_json_targets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.json");
        std::fs::write(
            &path,
            r#"["https://cdn.test/a.mp3", {"audio_url": "https://cdn.test/b.mp3", "title": "B", "metadata": {"show": "x"}}]"#,
        )
        .unwrap();

        let targets = load_targets(&path).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[1].title.as_deref(), Some("B"));
        assert_eq!(targets[1].metadata.get("show").map(String::as_str), Some("x"));
    }

    #[test]
    fn test_load_targets_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(load_targets(&path).is_err());
    }
}
