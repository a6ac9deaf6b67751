//! Bounded breadth-first site crawler.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::extract::Extractor;
use crate::normalize::normalize_url;

/// Client identifier sent with every crawl fetch.
pub const USER_AGENT: &str = "sitechat/0.1 (+support-bot crawler)";

/// Per-page fetch timeout.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// One crawled page. Immutable once recorded; one per unique normalized URL
/// within a crawl run.
#[derive(Debug, Clone)]
pub struct PageRecord {
    /// Normalized page URL.
    pub url: String,
    /// Extracted title.
    pub title: String,
    /// Cleaned page text.
    pub content: String,
    /// BFS depth at which the page was reached (start page is 0).
    pub depth: usize,
}

/// Tunable crawl bounds. All knobs are caller-overridable.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Maximum link depth to follow from the start page.
    pub max_depth: usize,
    /// Maximum number of pages to collect before abandoning the queue.
    pub max_pages: usize,
    /// When set, only links whose host exactly matches the start URL's host
    /// are followed (subdomains do not match).
    pub same_domain_only: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_pages: 200,
            same_domain_only: true,
        }
    }
}

/// Errors that abort a crawl before it starts. Per-page failures never abort
/// a running crawl; they are logged and skipped.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The start URL could not be parsed.
    #[error("invalid start URL {url:?}: {source}")]
    InvalidStartUrl {
        /// The offending input.
        url: String,
        /// Parser diagnostic.
        #[source]
        source: url::ParseError,
    },
}

/// Errors surfaced by a page fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Building the underlying HTTP client failed.
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    /// The transport failed before a response arrived.
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    /// The request exceeded the fetch timeout.
    #[error("request timed out")]
    Timeout,
    /// The server answered with a non-success status.
    #[error("server responded with status {0}")]
    Status(u16),
}

/// A successful fetch: status code plus decoded body.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// HTTP status code (always 2xx for fetcher implementations that reject
    /// non-success responses).
    pub status: u16,
    /// Response body.
    pub body: String,
}

/// Transport seam the crawler depends on; implementations fetch one URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `url` and returns the response body for success responses.
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError>;
}

/// Reqwest-backed fetcher with a bounded timeout and descriptive client
/// identifier.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Builds a fetcher that validates TLS certificates.
    pub fn new() -> Result<Self, FetchError> {
        Self::build(false)
    }

    /// Builds a fetcher that accepts invalid TLS certificates.
    ///
    /// Only for crawling the one known deployment target that serves a
    /// self-signed certificate. Never use this for arbitrary hosts.
    pub fn accepting_invalid_certs() -> Result<Self, FetchError> {
        Self::build(true)
    }

    fn build(danger_accept_invalid_certs: bool) -> Result<Self, FetchError> {
        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(Policy::limited(5))
            .timeout(FETCH_TIMEOUT);
        if danger_accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder.build().map_err(FetchError::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError> {
        let response = self.client.get(url).send().await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(classify)?;
        Ok(FetchedDocument {
            status: status.as_u16(),
            body,
        })
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(err)
    }
}

/// Breadth-first crawler over a single site.
///
/// The visited set and work queue are owned by each `crawl` invocation, so
/// concurrent crawls with the same `Crawler` never share traversal state.
pub struct Crawler<F> {
    fetcher: F,
    extractor: Extractor,
}

impl<F: PageFetcher> Crawler<F> {
    /// Builds a crawler over the given fetcher.
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            extractor: Extractor::new(),
        }
    }

    /// Returns the underlying fetcher.
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Crawls breadth-first from `start_url`, returning one record per unique
    /// normalized URL.
    ///
    /// URLs are marked visited on dequeue, before the fetch, so duplicates
    /// queued from different pages are discarded exactly once. Fetch and
    /// parse failures skip the page and the crawl continues; running out of
    /// queue or hitting `max_pages` are both normal termination.
    pub async fn crawl(
        &self,
        start_url: &str,
        options: &CrawlOptions,
    ) -> Result<Vec<PageRecord>, CrawlError> {
        let start = normalize_url(start_url);
        let parsed_start = Url::parse(&start).map_err(|source| CrawlError::InvalidStartUrl {
            url: start_url.to_string(),
            source,
        })?;
        let start_host = parsed_start.host_str().map(str::to_owned);

        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        queue.push_back((start, 0));
        let mut pages: Vec<PageRecord> = Vec::new();

        while pages.len() < options.max_pages {
            let Some((url, depth)) = queue.pop_front() else {
                break;
            };
            if depth > options.max_depth || !visited.insert(url.clone()) {
                continue;
            }

            debug!(%url, depth, "fetching page");
            let document = match self.fetcher.fetch(&url).await {
                Ok(document) => document,
                Err(err) => {
                    warn!(%url, error = %err, "fetch failed; skipping page");
                    continue;
                }
            };

            let base = match Url::parse(&url) {
                Ok(base) => base,
                Err(err) => {
                    warn!(%url, error = %err, "unparseable page URL; skipping page");
                    continue;
                }
            };
            let extracted = self.extractor.extract(&document.body, &base);

            pages.push(PageRecord {
                url: url.clone(),
                title: extracted.title,
                content: extracted.content,
                depth,
            });

            if depth < options.max_depth {
                for link in extracted.links {
                    let normalized = normalize_url(&link);
                    if visited.contains(&normalized) {
                        continue;
                    }
                    if options.same_domain_only {
                        let Ok(candidate) = Url::parse(&normalized) else {
                            continue;
                        };
                        if candidate.host_str() != start_host.as_deref() {
                            continue;
                        }
                    }
                    queue.push_back((normalized, depth + 1));
                }
            }
        }

        info!(pages = pages.len(), "crawl complete");
        Ok(pages)
    }
}
