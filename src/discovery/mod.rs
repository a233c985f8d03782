//! Podcast feed discovery.
//!
//! A [`FeedFinder`] asks an ordered list of [`FeedProvider`]s for a podcast's
//! RSS feed and returns the first hit. Transient provider failures are
//! retried with the configured [`Backoff`]; anything else moves on to the
//! next provider.

mod providers;

pub use providers::{ApplePodcastsProvider, HostProbeProvider, PodcastIndexProvider};

use crate::backoff::Backoff;
use crate::config::DiscoverySettings;
use crate::error::{HarkError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// A discovered podcast feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedInfo {
    pub feed_url: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Name of the provider that found it.
    pub provider: String,
}

/// One way of finding a feed by podcast name.
#[async_trait]
pub trait FeedProvider: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` when this provider has nothing for `podcast`.
    async fn find(&self, podcast: &str) -> Result<Option<FeedInfo>>;
}

/// Tries providers in order until one finds the feed.
pub struct FeedFinder {
    providers: Vec<Arc<dyn FeedProvider>>,
    backoff: Backoff,
}

impl FeedFinder {
    pub fn new(providers: Vec<Arc<dyn FeedProvider>>, backoff: Backoff) -> Self {
        Self { providers, backoff }
    }

    /// Build the providers named in settings, in their configured order.
    pub fn from_settings(settings: &DiscoverySettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs.max(1)))
            .user_agent(providers::USER_AGENT)
            .build()?;

        let mut list: Vec<Arc<dyn FeedProvider>> = Vec::with_capacity(settings.providers.len());
        for name in &settings.providers {
            let provider: Arc<dyn FeedProvider> = match name.to_ascii_lowercase().as_str() {
                "podcastindex" => Arc::new(PodcastIndexProvider::new(http.clone())),
                "apple" | "itunes" => Arc::new(ApplePodcastsProvider::new(http.clone())),
                "hosts" => Arc::new(HostProbeProvider::new(http.clone())),
                other => {
                    return Err(HarkError::Config(format!("Unknown discovery provider: {}", other)));
                }
            };
            list.push(provider);
        }

        Ok(Self::new(list, Backoff::from(&settings.backoff)))
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    #[instrument(skip(self))]
    pub async fn find_feed(&self, podcast: &str) -> Result<FeedInfo> {
        let podcast = podcast.trim();
        if podcast.is_empty() {
            return Err(HarkError::InvalidInput("Podcast name is empty".to_string()));
        }

        let mut last_error: Option<String> = None;
        for provider in &self.providers {
            let op_name = format!("{} lookup", provider.name());
            match self.backoff.retry(&op_name, || provider.find(podcast)).await {
                Ok(Some(feed)) => {
                    info!("Found feed for '{}' via {}", podcast, provider.name());
                    return Ok(feed);
                }
                Ok(None) => debug!("{} has no feed for '{}'", provider.name(), podcast),
                Err(e) => {
                    warn!("{} lookup failed: {}", provider.name(), e);
                    last_error = Some(format!("{}: {}", provider.name(), e));
                }
            }
        }

        let tried = self.provider_names().join(", ");
        let message = match last_error {
            Some(err) => format!("No RSS feed found for '{}' (tried {}; last error {})", podcast, tried, err),
            None => format!("No RSS feed found for '{}' (tried {})", podcast, tried),
        };
        Err(HarkError::NotFound(message))
    }
}
