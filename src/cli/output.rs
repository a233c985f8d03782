//! CLI output formatting utilities.

use crate::batch::{BatchJobStatus, BatchJobSummary, BatchState, TargetOutcome, TargetResult};
use crate::cache::CacheSummary;
use crate::transcript::format_duration;
use console::{style, StyledObject};
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        eprintln!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        eprintln!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print one cached transcript.
    pub fn cache_summary(summary: &CacheSummary) {
        let title = summary.title.as_deref().unwrap_or(&summary.source);
        let duration = summary
            .duration_seconds
            .map(format_duration)
            .unwrap_or_else(|| "?".to_string());
        println!(
            "  {} {} ({}, {}, {} chars)",
            style("*").cyan(),
            style(title).bold(),
            summary.source_type,
            duration,
            summary.content_length
        );
        println!(
            "    {} {}",
            style(summary.fingerprint.as_str()).dim(),
            style(summary.created_at.format("%Y-%m-%d %H:%M")).dim()
        );
    }

    /// Print the full status of a batch job.
    pub fn batch_status(status: &BatchJobStatus) {
        Output::kv("Job", &status.name);
        if let Some(name) = &status.display_name {
            Output::kv("Name", name);
        }
        Output::kv("State", &state_style(status.state).to_string());
        Output::kv("Requests", &status.request_count.to_string());
        if let Some(created) = status.created_at {
            Output::kv("Created", &created.format("%Y-%m-%d %H:%M:%S UTC").to_string());
        }
        if let Some(updated) = status.updated_at {
            Output::kv("Updated", &updated.format("%Y-%m-%d %H:%M:%S UTC").to_string());
        }
        if let Some(error) = &status.error {
            Output::kv("Error", error);
        }
    }

    /// Print one row of a job listing.
    pub fn batch_summary(summary: &BatchJobSummary) {
        let created = summary
            .created_at
            .map(|c| c.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "?".to_string());
        println!(
            "  {} {} [{}] {} requests, {}",
            style("*").cyan(),
            style(&summary.name).bold(),
            state_style(summary.state),
            summary.request_count,
            style(created).dim()
        );
        if let Some(name) = &summary.display_name {
            println!("    {}", style(name).dim());
        }
    }

    /// Print the per-target outcome of a collected job.
    pub fn target_outcome(outcome: &TargetOutcome) {
        let label = outcome
            .target
            .title
            .as_deref()
            .unwrap_or(&outcome.target.audio_url);
        match &outcome.result {
            TargetResult::Transcribed(summary) => println!(
                "  {} [{}] {} {}",
                style("✓").green(),
                outcome.index,
                style(label).bold(),
                style(summary.fingerprint.as_str()).dim()
            ),
            TargetResult::Failed(reason) => println!(
                "  {} [{}] {} {}",
                style("✗").red(),
                outcome.index,
                style(label).bold(),
                reason
            ),
        }
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

fn state_style(state: BatchState) -> StyledObject<&'static str> {
    let s = style(state.as_str());
    match state {
        BatchState::Succeeded => s.green(),
        BatchState::Failed | BatchState::Expired => s.red(),
        BatchState::Cancelled => s.yellow(),
        BatchState::Pending | BatchState::Running => s.cyan(),
    }
}
