use crate::models::proxy::Proxy;
use crate::transport::{self, TransportError};
use chrono::{DateTime, Utc};
use feed_rs::parser;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

const MAX_FETCH_RETRIES: u32 = 3;
const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(2);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);
const ERROR_SNIPPET_BYTES: usize = 1024;

const ACCEPT_FEEDS: &str = "application/rss+xml, application/rdf+xml, application/atom+xml, \
     application/feed+json, application/xml;q=0.9, text/xml;q=0.8";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch canceled")]
    Canceled,

    #[error("fetch deadline exceeded")]
    DeadlineExceeded,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("permanent HTTP status {status}: {snippet}")]
    Permanent { status: u16, snippet: String },

    #[error("transient HTTP status {status}")]
    Transient { status: u16 },

    #[error("feed parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Proxy(#[from] TransportError),
}

impl FetchError {
    /// Transient statuses and transport faults are worth another attempt;
    /// everything else fails the run immediately.
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Transient { .. } | FetchError::Transport(_) | FetchError::Parse(_)
        )
    }
}

/// Uniform item model produced from RSS 1/2, Atom, and JSON feeds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedItem {
    pub guid: String,
    pub link: String,
    pub title: String,
    pub content: String,
    pub description: String,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub enclosures: Vec<Enclosure>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Enclosure {
    pub url: String,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedFeed {
    pub title: String,
    pub items: Vec<FetchedItem>,
}

/// `feed` is `None` exactly when the server answered 304; the echoed cache
/// values are then the ones that were sent.
#[derive(Debug)]
pub struct FetchOutcome {
    pub feed: Option<FetchedFeed>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

pub struct FeedFetcher {
    user_agent: String,
}

impl Default for FeedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedFetcher {
    pub fn new() -> FeedFetcher {
        FeedFetcher {
            user_agent: format!(
                "{}/{} (+https://github.com/feedgram/feedgram)",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ),
        }
    }

    /// Conditional GET with retry. At most [`MAX_FETCH_RETRIES`] retries
    /// (four attempts total); backoff starts at 2s and doubles to a 30s cap.
    /// A malformed body gets exactly one retry; permanent statuses and
    /// timeouts none.
    pub async fn fetch(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
        proxy: Option<&Proxy>,
    ) -> Result<FetchOutcome, FetchError> {
        let client = transport::client_for(proxy)?;

        let mut delay = INITIAL_RETRY_DELAY;
        let mut parse_retried = false;
        let mut last_err = None;

        for attempt in 0..=MAX_FETCH_RETRIES {
            if attempt > 0 {
                log::warn!("Retrying fetch of {url} (attempt {attempt}) after {delay:?}");
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, MAX_RETRY_DELAY);
            }

            match self.attempt(&client, url, etag, last_modified).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_retryable() => {
                    if matches!(err, FetchError::Parse(_)) {
                        if parse_retried {
                            return Err(err);
                        }
                        parse_retried = true;
                    }
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err.unwrap_or(FetchError::Transport("no attempts made".into())))
    }

    async fn attempt(
        &self,
        client: &reqwest::Client,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<FetchOutcome, FetchError> {
        let mut request = client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .header("Accept", ACCEPT_FEEDS);
        if let Some(etag) = etag.filter(|v| !v.is_empty()) {
            request = request.header(IF_NONE_MATCH, etag);
        }
        if let Some(lm) = last_modified.filter(|v| !v.is_empty()) {
            request = request.header(IF_MODIFIED_SINCE, lm);
        }

        let response = request.send().await.map_err(classify_reqwest_error)?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            log::debug!("Feed not modified (304): {url}");
            return Ok(FetchOutcome {
                feed: None,
                etag: etag.map(str::to_string),
                last_modified: last_modified.map(str::to_string),
            });
        }

        if !status.is_success() {
            let code = status.as_u16();
            // 408 and 429 are transient despite being 4xx.
            if status.is_client_error() && code != 408 && code != 429 {
                let body = response.bytes().await.unwrap_or_default();
                let snippet = String::from_utf8_lossy(&body[..body.len().min(ERROR_SNIPPET_BYTES)])
                    .into_owned();
                return Err(FetchError::Permanent {
                    status: code,
                    snippet,
                });
            }
            return Err(FetchError::Transient { status: code });
        }

        let new_etag = header_value(&response, ETAG);
        let new_last_modified = header_value(&response, LAST_MODIFIED);

        let body = response.bytes().await.map_err(classify_reqwest_error)?;
        let parsed =
            parser::parse(body.as_ref()).map_err(|e| FetchError::Parse(format!("{e:?}")))?;

        Ok(FetchOutcome {
            feed: Some(parsed.into()),
            etag: new_etag,
            last_modified: new_last_modified,
        })
    }
}

fn header_value(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn classify_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::DeadlineExceeded
    } else {
        FetchError::Transport(err.to_string())
    }
}

impl From<feed_rs::model::Feed> for FetchedFeed {
    fn from(feed: feed_rs::model::Feed) -> Self {
        let items = feed
            .entries
            .into_iter()
            .map(|entry| {
                let enclosures = entry
                    .media
                    .iter()
                    .flat_map(|media| media.content.iter())
                    .filter_map(|content| {
                        content.url.as_ref().map(|u| Enclosure {
                            url: u.to_string(),
                            mime_type: content.content_type.as_ref().map(|m| m.to_string()),
                        })
                    })
                    .collect();

                let author = entry
                    .authors
                    .iter()
                    .map(|person| person.name.trim())
                    .find(|name| !name.is_empty())
                    .map(str::to_string);

                FetchedItem {
                    guid: entry.id,
                    link: entry
                        .links
                        .first()
                        .map(|l| l.href.clone())
                        .unwrap_or_default(),
                    title: entry.title.map(|t| t.content).unwrap_or_default(),
                    content: entry.content.and_then(|c| c.body).unwrap_or_default(),
                    description: entry.summary.map(|s| s.content).unwrap_or_default(),
                    author,
                    published_at: entry.published,
                    updated_at: entry.updated,
                    enclosures,
                }
            })
            .collect();

        FetchedFeed {
            title: feed.title.map(|t| t.content).unwrap_or_default(),
            items,
        }
    }
}
