//! Feed providers: Podcastindex search, iTunes search and hosting-platform probes.

use super::{FeedInfo, FeedProvider};
use crate::error::{HarkError, Result};
use async_trait::async_trait;
use reqwest::Response;
use serde::Deserialize;
use tracing::debug;

pub(super) const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

const DESCRIPTION_CHARS: usize = 200;

/// `Ok(None)` for a plain miss, an error for 5xx and 429.
async fn check(response: Response, context: &str) -> Result<Option<Response>> {
    let status = response.status();
    if status.is_success() {
        return Ok(Some(response));
    }
    if status.is_server_error() || status.as_u16() == 429 {
        let body = response.text().await.unwrap_or_default();
        return Err(HarkError::from_status(status, context, &body));
    }
    debug!("{} returned {}", context, status);
    Ok(None)
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Podcastindex `search/byterm`.
pub struct PodcastIndexProvider {
    http: reqwest::Client,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct PodcastIndexSearch {
    #[serde(default)]
    feeds: Vec<PodcastIndexFeed>,
}

#[derive(Debug, Deserialize)]
struct PodcastIndexFeed {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
}

impl PodcastIndexProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            api_base: "https://api.podcastindex.org/api/1.0".to_string(),
        }
    }
}

#[async_trait]
impl FeedProvider for PodcastIndexProvider {
    fn name(&self) -> &str {
        "podcastindex"
    }

    async fn find(&self, podcast: &str) -> Result<Option<FeedInfo>> {
        let request = self
            .http
            .get(format!("{}/search/byterm", self.api_base))
            .query(&[("q", podcast), ("type", "podcast")]);
        let Some(response) = check(request.send().await?, "Podcastindex search").await? else {
            return Ok(None);
        };

        let search: PodcastIndexSearch = response.json().await?;
        Ok(search.feeds.into_iter().next().and_then(|feed| {
            let url = feed.url.filter(|u| !u.is_empty())?;
            Some(FeedInfo {
                feed_url: url,
                title: feed.title,
                description: truncate_chars(&feed.description, DESCRIPTION_CHARS),
                provider: self.name().to_string(),
            })
        }))
    }
}

/// iTunes Search API, which exposes a `feedUrl` per podcast.
pub struct ApplePodcastsProvider {
    http: reqwest::Client,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct ItunesSearch {
    #[serde(default)]
    results: Vec<ItunesResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItunesResult {
    #[serde(default)]
    feed_url: Option<String>,
    #[serde(default)]
    collection_name: String,
    #[serde(default)]
    description: Option<String>,
}

impl ApplePodcastsProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            api_base: "https://itunes.apple.com".to_string(),
        }
    }
}

#[async_trait]
impl FeedProvider for ApplePodcastsProvider {
    fn name(&self) -> &str {
        "apple"
    }

    async fn find(&self, podcast: &str) -> Result<Option<FeedInfo>> {
        let request = self
            .http
            .get(format!("{}/search", self.api_base))
            .query(&[("term", podcast), ("media", "podcast"), ("limit", "1")]);
        let Some(response) = check(request.send().await?, "iTunes search").await? else {
            return Ok(None);
        };

        let search: ItunesSearch = response.json().await?;
        Ok(search.results.into_iter().next().and_then(|result| {
            let url = result.feed_url.filter(|u| !u.is_empty())?;
            Some(FeedInfo {
                feed_url: url,
                title: result.collection_name,
                description: truncate_chars(result.description.as_deref().unwrap_or_default(), DESCRIPTION_CHARS),
                provider: self.name().to_string(),
            })
        }))
    }
}

/// Guesses feed URLs on common hosting platforms and checks them with HEAD.
pub struct HostProbeProvider {
    http: reqwest::Client,
}

impl HostProbeProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

/// Candidate (host, feed URL) pairs for a podcast name.
pub(crate) fn host_candidates(podcast: &str) -> Vec<(&'static str, String)> {
    let lower = podcast.trim().to_lowercase();
    let joined = lower.replace(' ', "");
    let hyphenated = lower.replace(' ', "-");

    vec![
        ("Megaphone", format!("https://feeds.megaphone.fm/{}", joined)),
        ("Anchor", format!("https://anchor.fm/s/{}/podcast/rss", hyphenated)),
        ("Podbean", format!("https://{}.podbean.com/feed.xml", joined)),
    ]
}

#[async_trait]
impl FeedProvider for HostProbeProvider {
    fn name(&self) -> &str {
        "hosts"
    }

    async fn find(&self, podcast: &str) -> Result<Option<FeedInfo>> {
        let mut transient: Option<HarkError> = None;

        for (host, url) in host_candidates(podcast) {
            let response = match self.http.head(&url).send().await {
                Ok(response) => response,
                // Unresolvable guessed hosts are ordinary misses.
                Err(e) if e.is_connect() || e.is_builder() => {
                    debug!("{} probe failed: {}", host, e);
                    continue;
                }
                Err(e) => {
                    transient = Some(e.into());
                    continue;
                }
            };

            match check(response, host).await {
                Ok(Some(_)) => {
                    return Ok(Some(FeedInfo {
                        feed_url: url,
                        title: podcast.to_string(),
                        description: format!("Found on {}", host),
                        provider: self.name().to_string(),
                    }));
                }
                Ok(None) => {}
                Err(e) => transient = Some(e),
            }
        }

        match transient {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}
