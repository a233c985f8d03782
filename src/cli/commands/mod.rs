//! CLI command implementations.

mod batch;
mod cache;
mod config;
mod doctor;
mod mcp;
mod podcast;
mod youtube;

pub use batch::run_batch;
pub use cache::run_cache;
pub use config::run_config;
pub use doctor::run_doctor;
pub use mcp::run_mcp;
pub use podcast::run_podcast;
pub use youtube::run_youtube;

use crate::cache::CacheEntry;
use crate::cli::{Output, RenderArgs};
use crate::transcript::{render, RenderOptions};
use anyhow::Result;

impl RenderArgs {
    pub fn options(&self) -> RenderOptions {
        RenderOptions {
            format: self.format,
            include_timestamps: !self.no_timestamps,
        }
    }
}

/// Render an entry to stdout or to the `--output` file.
fn emit(entry: &CacheEntry, render_args: &RenderArgs) -> Result<()> {
    let text = render(entry, &render_args.options());
    match &render_args.output {
        Some(path) => {
            std::fs::write(path, &text)?;
            Output::success(&format!("Transcript written to {}", path));
        }
        None => println!("{}", text),
    }
    Ok(())
}
