//! MCP server implementation.

use super::protocol::*;
use super::tools::get_tools;
use crate::backoff::Backoff;
use crate::batch::{
    open_manager, wait_until_terminal, BatchJobManager, BatchJobStatus, BatchOptions, TargetDescriptor,
};
use crate::cache::SortKey;
use crate::config::Settings;
use crate::discovery::FeedFinder;
use crate::error::{HarkError, Result};
use crate::fingerprint::TranscribeOptions;
use crate::orchestrator::Orchestrator;
use crate::transcript::{render, OutputFormat, RenderOptions};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "hark";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

fn default_true() -> bool {
    true
}

fn default_cache_limit() -> usize {
    20
}

fn default_job_limit() -> usize {
    10
}

#[derive(Debug, Deserialize)]
struct GetTranscriptArgs {
    video_url_or_id: String,
    #[serde(default = "default_true")]
    include_timestamps: bool,
    #[serde(default = "default_true")]
    use_cache: bool,
    #[serde(default)]
    format: OutputFormat,
}

#[derive(Debug, Deserialize)]
struct FindRssArgs {
    podcast_name: String,
}

#[derive(Debug, Deserialize)]
struct TranscribeEpisodeArgs {
    audio_url: String,
    #[serde(default)]
    episode_title: Option<String>,
    #[serde(default = "default_true")]
    include_timestamps: bool,
    #[serde(default = "default_true")]
    speaker_diarization: bool,
    #[serde(default = "default_true")]
    use_cache: bool,
    #[serde(default)]
    format: OutputFormat,
}

#[derive(Debug, Deserialize)]
struct GetCachedArgs {
    cache_key: String,
    #[serde(default = "default_true")]
    include_timestamps: bool,
    #[serde(default)]
    format: OutputFormat,
}

#[derive(Debug, Deserialize)]
struct ListCacheArgs {
    #[serde(default = "default_cache_limit")]
    limit: usize,
    #[serde(default)]
    sort: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Episode {
    audio_url: String,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateBatchArgs {
    episodes: Vec<Episode>,
    #[serde(default)]
    batch_name: Option<String>,
    #[serde(default = "default_true")]
    speaker_diarization: bool,
    #[serde(default)]
    wait_for_completion: bool,
}

#[derive(Debug, Deserialize)]
struct JobArgs {
    job_name: String,
}

#[derive(Debug, Deserialize)]
struct WaitArgs {
    job_name: String,
    #[serde(default)]
    poll_interval: Option<u64>,
    #[serde(default)]
    max_wait: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ListJobsArgs {
    #[serde(default = "default_job_limit")]
    limit: usize,
}

fn parse_args<T: DeserializeOwned>(args: Option<Value>) -> Result<T> {
    let args = args.unwrap_or_else(|| json!({}));
    serde_json::from_value(args).map_err(|e| HarkError::InvalidInput(format!("Invalid arguments: {}", e)))
}

/// MCP Server for Hark.
pub struct McpServer {
    settings: Settings,
    orchestrator: Option<Orchestrator>,
    finder: OnceLock<Arc<FeedFinder>>,
    batches: OnceLock<Arc<BatchJobManager>>,
}

impl McpServer {
    /// Create a new MCP server. Components are built on `initialize`.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            orchestrator: None,
            finder: OnceLock::new(),
            batches: OnceLock::new(),
        }
    }

    /// Create a server around ready-made components.
    pub fn with_components(
        orchestrator: Orchestrator,
        finder: FeedFinder,
        batches: BatchJobManager,
    ) -> Self {
        let settings = orchestrator.settings().clone();
        let server = Self::new(settings);
        let _ = server.finder.set(Arc::new(finder));
        let _ = server.batches.set(Arc::new(batches));
        Self {
            orchestrator: Some(orchestrator),
            ..server
        }
    }

    /// Run the MCP server (reads from stdin, writes to stdout).
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();

        // stdout carries JSON-RPC only; logs go to stderr.
        info!("Hark MCP server starting");

        for line in stdin.lock().lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(&line) {
                Ok(req) => req,
                Err(e) => {
                    warn!("Failed to parse request: {}", e);
                    let response = JsonRpcResponse::error(None, PARSE_ERROR, "Parse error");
                    writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
                    stdout.flush()?;
                    continue;
                }
            };

            // Notifications get no reply.
            if request.id.is_none() && request.method.starts_with("notifications/") {
                debug!("Notification {}", request.method);
                continue;
            }

            let response = self.handle_request(request).await;
            writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
            stdout.flush()?;
        }

        info!("Hark MCP server stopped");
        Ok(())
    }

    /// Handle a single JSON-RPC request.
    async fn handle_request(&mut self, request: JsonRpcRequest) -> JsonRpcResponse {
        match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id, request.params),
            "initialized" | "notifications/initialized" => JsonRpcResponse::success(request.id, json!({})),
            "ping" => JsonRpcResponse::success(request.id, json!({})),
            "tools/list" => self.handle_tools_list(request.id),
            "tools/call" => self.handle_tools_call(request.id, request.params).await,
            _ => JsonRpcResponse::error(
                request.id,
                METHOD_NOT_FOUND,
                &format!("Method not found: {}", request.method),
            ),
        }
    }

    /// Handle initialize request.
    fn handle_initialize(&mut self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: InitializeParams = params
            .and_then(|p| serde_json::from_value(p).ok())
            .unwrap_or_default();
        if let Some(client) = &params.client_info {
            info!(
                "Client {} {} connected (protocol {})",
                client.name,
                client.version.as_deref().unwrap_or("?"),
                params.protocol_version.as_deref().unwrap_or("?")
            );
        }

        if self.orchestrator.is_none() {
            match Orchestrator::new(self.settings.clone()) {
                Ok(orch) => {
                    self.orchestrator = Some(orch);
                    info!("Orchestrator initialized");
                }
                Err(e) => {
                    warn!("Failed to initialize orchestrator: {}", e);
                    return JsonRpcResponse::error(id, -32000, &format!("Init failed: {}", e));
                }
            }
        }

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability { list_changed: false },
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
        };

        respond(id, &result)
    }

    /// Handle tools/list request.
    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        respond(id, &ToolsListResult { tools: get_tools() })
    }

    /// Handle tools/call request.
    async fn handle_tools_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(params) => params,
                Err(e) => return JsonRpcResponse::error(id, INVALID_PARAMS, &format!("Invalid params: {}", e)),
            },
            None => return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing params"),
        };

        let args = params.arguments;
        let outcome = match params.name.as_str() {
            "get_transcript" => self.tool_get_transcript(args).await,
            "find_rss" => self.tool_find_rss(args).await,
            "transcribe_episode" => self.tool_transcribe_episode(args).await,
            "get_cached" => self.tool_get_cached(args).await,
            "list_cache" => self.tool_list_cache(args).await,
            "create_batch_transcription" => self.tool_create_batch(args).await,
            "check_batch_status" => self.tool_check_batch_status(args).await,
            "wait_for_batch" => self.tool_wait_for_batch(args).await,
            "get_batch_results" => self.tool_get_batch_results(args).await,
            "cancel_batch" => self.tool_cancel_batch(args).await,
            "list_batch_jobs" => self.tool_list_batch_jobs(args).await,
            _ => Err(HarkError::InvalidInput(format!("Unknown tool: {}", params.name))),
        };

        let result = outcome.unwrap_or_else(|e| {
            warn!("Tool {} failed: {}", params.name, e);
            ToolCallResult::failure(&e)
        });
        respond(id, &result)
    }

    fn orchestrator(&self) -> Result<&Orchestrator> {
        self.orchestrator
            .as_ref()
            .ok_or_else(|| HarkError::InvalidState {
                job: "server".to_string(),
                state: "uninitialized".to_string(),
                message: "call initialize first".to_string(),
            })
    }

    fn finder(&self) -> Result<Arc<FeedFinder>> {
        if let Some(finder) = self.finder.get() {
            return Ok(finder.clone());
        }
        let finder = Arc::new(FeedFinder::from_settings(&self.settings.discovery)?);
        Ok(self.finder.get_or_init(|| finder).clone())
    }

    /// Batch tools need the Gemini key; other tools work without it.
    fn batches(&self) -> Result<Arc<BatchJobManager>> {
        if let Some(manager) = self.batches.get() {
            return Ok(manager.clone());
        }
        let store = self.orchestrator()?.store();
        let manager = Arc::new(open_manager(&self.settings, store)?);
        Ok(self.batches.get_or_init(|| manager).clone())
    }

    async fn tool_get_transcript(&self, args: Option<Value>) -> Result<ToolCallResult> {
        let args: GetTranscriptArgs = parse_args(args)?;
        let result = self
            .orchestrator()?
            .youtube_transcript(&args.video_url_or_id, args.use_cache)
            .await?;

        let options = RenderOptions {
            format: args.format,
            include_timestamps: args.include_timestamps,
        };
        Ok(ToolCallResult::text(render(&result.entry, &options)))
    }

    async fn tool_find_rss(&self, args: Option<Value>) -> Result<ToolCallResult> {
        let args: FindRssArgs = parse_args(args)?;
        let feed = self.finder()?.find_feed(&args.podcast_name).await?;
        Ok(ToolCallResult::json(&feed))
    }

    async fn tool_transcribe_episode(&self, args: Option<Value>) -> Result<ToolCallResult> {
        let args: TranscribeEpisodeArgs = parse_args(args)?;
        let options = TranscribeOptions {
            include_timestamps: args.include_timestamps,
            speaker_diarization: args.speaker_diarization,
            format: args.format,
        };
        let result = self
            .orchestrator()?
            .podcast_transcript(&args.audio_url, args.episode_title.as_deref(), &options, args.use_cache)
            .await?;

        let render_options = RenderOptions {
            format: args.format,
            include_timestamps: args.include_timestamps,
        };
        Ok(ToolCallResult::text(render(&result.entry, &render_options)))
    }

    async fn tool_get_cached(&self, args: Option<Value>) -> Result<ToolCallResult> {
        let args: GetCachedArgs = parse_args(args)?;
        let entry = self.orchestrator()?.cached(args.cache_key.trim()).await?;
        let options = RenderOptions {
            format: args.format,
            include_timestamps: args.include_timestamps,
        };
        Ok(ToolCallResult::text(render(&entry, &options)))
    }

    async fn tool_list_cache(&self, args: Option<Value>) -> Result<ToolCallResult> {
        let args: ListCacheArgs = parse_args(args)?;
        let sort = match args.sort.as_deref() {
            Some(s) => s.parse::<SortKey>().map_err(HarkError::InvalidInput)?,
            None => SortKey::default(),
        };
        let limit = args.limit.clamp(1, 100);
        let entries = self.orchestrator()?.list_cached(limit, sort).await?;
        Ok(ToolCallResult::json(&json!({
            "count": entries.len(),
            "entries": entries,
        })))
    }

    async fn tool_create_batch(&self, args: Option<Value>) -> Result<ToolCallResult> {
        let args: CreateBatchArgs = parse_args(args)?;
        let targets = args
            .episodes
            .into_iter()
            .map(|e| {
                let target = TargetDescriptor::new(e.audio_url);
                match e.title {
                    Some(title) => target.with_title(title),
                    None => target,
                }
            })
            .collect();
        let options = BatchOptions {
            display_name: args.batch_name,
            speaker_diarization: args.speaker_diarization,
            include_timestamps: true,
        };

        let manager = self.batches()?;
        let status = manager.submit(targets, options).await?;
        if !args.wait_for_completion {
            return Ok(ToolCallResult::json(&status));
        }

        let status = self.wait(&manager, &status.name, None, None).await?.into_success()?;
        let outcomes = manager.collect(&status.name).await?;
        Ok(ToolCallResult::json(&json!({
            "job": status,
            "outcomes": outcomes,
        })))
    }

    async fn tool_check_batch_status(&self, args: Option<Value>) -> Result<ToolCallResult> {
        let args: JobArgs = parse_args(args)?;
        let status = self.batches()?.poll(&args.job_name).await?;
        Ok(ToolCallResult::json(&status))
    }

    async fn tool_wait_for_batch(&self, args: Option<Value>) -> Result<ToolCallResult> {
        let args: WaitArgs = parse_args(args)?;
        let manager = self.batches()?;
        let status = self
            .wait(&manager, &args.job_name, args.poll_interval, args.max_wait)
            .await?
            .into_success()?;
        Ok(ToolCallResult::json(&status))
    }

    async fn tool_get_batch_results(&self, args: Option<Value>) -> Result<ToolCallResult> {
        let args: JobArgs = parse_args(args)?;
        let manager = self.batches()?;
        let status = manager.poll(&args.job_name).await?.into_success()?;
        let outcomes = manager.collect(&status.name).await?;
        let transcribed = outcomes.iter().filter(|o| o.is_success()).count();
        Ok(ToolCallResult::json(&json!({
            "job": status.name,
            "transcribed": transcribed,
            "failed": outcomes.len() - transcribed,
            "outcomes": outcomes,
        })))
    }

    async fn tool_cancel_batch(&self, args: Option<Value>) -> Result<ToolCallResult> {
        let args: JobArgs = parse_args(args)?;
        let status = self.batches()?.cancel(&args.job_name).await?;
        Ok(ToolCallResult::json(&status))
    }

    async fn tool_list_batch_jobs(&self, args: Option<Value>) -> Result<ToolCallResult> {
        let args: ListJobsArgs = parse_args(args)?;
        let jobs = self.batches()?.list(args.limit.clamp(1, 100)).await?;
        Ok(ToolCallResult::json(&json!({
            "count": jobs.len(),
            "jobs": jobs,
        })))
    }

    async fn wait(
        &self,
        manager: &BatchJobManager,
        job: &str,
        poll_interval: Option<u64>,
        max_wait: Option<u64>,
    ) -> Result<BatchJobStatus> {
        let batch = &self.settings.batch;
        let interval = Duration::from_secs(poll_interval.unwrap_or(batch.poll_interval_secs).max(1));
        let max_wait = Duration::from_secs(max_wait.unwrap_or(batch.max_wait_secs));
        let backoff = Backoff::from(&batch.transient_retry);
        wait_until_terminal(manager, job, interval, max_wait, &backoff).await
    }
}

fn respond<T: serde::Serialize>(id: Option<Value>, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, -32603, &format!("Internal error: {}", e)),
    }
}
