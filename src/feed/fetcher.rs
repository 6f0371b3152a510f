use crate::feed::item::{ExtractionResult, Item};
use crate::feed::parser::parse_feed;
use crate::feed::scrape::{self, ScrapeRules};
use crate::util::{resolve_redirect, validate_source, Source, SourceError};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, LOCATION};
use reqwest::StatusCode;
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};
use thiserror::Error;
use url::Url;

/// Default bound on one complete fetch, redirects and body included.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const MAX_REDIRECTS: usize = 5;

/// Errors that can occur while fetching a feed.
///
/// Every variant is a transport-class failure: the engine backs the feed off
/// and tries again later.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with an unexpected status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Server answered 410; the feed is gone for good
    #[error("Feed gone (HTTP 410)")]
    Gone,
    /// The whole fetch exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Body could not be parsed as a feed
    #[error("Parse error: {0}")]
    Parse(String),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// The configured source is not fetchable
    #[error("Invalid source: {0}")]
    InvalidSource(#[from] SourceError),
    /// Redirect without a usable `Location`
    #[error("Invalid redirect: {0}")]
    InvalidRedirect(String),
    #[error("Too many redirects")]
    TooManyRedirects,
    /// Local file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How items are pulled out of a fetched document.
#[derive(Debug, Clone)]
pub enum ExtractionMode {
    /// RSS / Atom / JSON Feed.
    Structured,
    /// HTML page evaluated with declarative selector rules.
    Scraped(ScrapeRules),
}

/// Everything a fetcher needs to know about one poll.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    pub mode: &'a ExtractionMode,
    pub etag: Option<&'a str>,
    pub last_modified: Option<&'a str>,
}

/// Non-failure results of a fetch.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Fresh content. A permanent redirect seen on the way is in `redirect`.
    Fetched(ExtractionResult),
    /// Validators matched; nothing to do.
    NotModified,
    /// Permanently moved, with no content to process this time.
    Redirected { url: String },
}

/// Source of feed snapshots.
///
/// The engine only talks to this trait, so tests and alternative transports
/// can stand in for [`HttpFetchClient`].
#[async_trait]
pub trait FetchClient: Send + Sync {
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<FetchOutcome, FetchError>;
}

/// reqwest-backed fetcher for HTTP(S) feeds and local files.
///
/// Redirects are followed by hand so that a permanent move can be reported
/// back to the feed; temporary redirects are followed silently.
#[derive(Debug, Clone)]
pub struct HttpFetchClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetchClient {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("feedwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            timeout: FETCH_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn fetch_http(
        &self,
        url: Url,
        request: FetchRequest<'_>,
    ) -> Result<FetchOutcome, FetchError> {
        let mut current = url;
        let mut moved: Option<Url> = None;
        let mut permanent_chain = true;

        for _ in 0..=MAX_REDIRECTS {
            let mut builder = self.client.get(current.clone());
            if let Some(etag) = request.etag {
                builder = builder.header(IF_NONE_MATCH, etag);
            }
            if let Some(modified) = request.last_modified {
                builder = builder.header(IF_MODIFIED_SINCE, modified);
            }
            let response = builder.send().await?;
            let status = response.status();

            if status.is_redirection() && status != StatusCode::NOT_MODIFIED {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        FetchError::InvalidRedirect(format!("status {} without Location", status))
                    })?;
                let next = resolve_redirect(&current, location)
                    .map_err(|e| FetchError::InvalidRedirect(e.to_string()))?;

                // Only an unbroken chain of permanent moves relocates the feed
                let permanent = matches!(
                    status,
                    StatusCode::MOVED_PERMANENTLY | StatusCode::PERMANENT_REDIRECT
                );
                permanent_chain &= permanent;
                if permanent_chain {
                    moved = Some(next.clone());
                }
                tracing::debug!(from = %current, to = %next, status = %status, "Following redirect");
                current = next;
                continue;
            }

            if status == StatusCode::NOT_MODIFIED {
                return Ok(match moved {
                    Some(url) => FetchOutcome::Redirected {
                        url: url.to_string(),
                    },
                    None => FetchOutcome::NotModified,
                });
            }
            if status == StatusCode::GONE {
                return Err(FetchError::Gone);
            }
            if !status.is_success() {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }

            let etag = header_string(&response, ETAG);
            let last_modified = header_string(&response, LAST_MODIFIED);
            let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
            let items = extract_items(&bytes, Some(&current), request.mode)?;

            return Ok(FetchOutcome::Fetched(ExtractionResult {
                items,
                etag,
                last_modified,
                redirect: moved.map(|u| u.to_string()),
                status: status.as_u16(),
            }));
        }

        Err(FetchError::TooManyRedirects)
    }
}

#[async_trait]
impl FetchClient for HttpFetchClient {
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<FetchOutcome, FetchError> {
        let source = validate_source(request.url)?;
        tokio::time::timeout(self.timeout, async {
            match source {
                Source::File(path) => fetch_file(&path, request).await,
                Source::Http(url) => self.fetch_http(url, request).await,
            }
        })
        .await
        .map_err(|_| FetchError::Timeout)?
    }
}

fn header_string(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

/// Reads a local feed file. Its mtime, in seconds, is the `last_modified` validator.
async fn fetch_file(path: &Path, request: FetchRequest<'_>) -> Result<FetchOutcome, FetchError> {
    let meta = tokio::fs::metadata(path).await?;
    let mtime = meta
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);

    let previous = request.last_modified.and_then(|m| m.parse::<f64>().ok());
    if previous.is_some_and(|prev| prev >= mtime) {
        return Ok(FetchOutcome::NotModified);
    }
    if meta.len() > MAX_FEED_SIZE as u64 {
        return Err(FetchError::ResponseTooLarge);
    }

    let bytes = tokio::fs::read(path).await?;
    let base = std::path::absolute(path)
        .ok()
        .and_then(|p| Url::from_file_path(p).ok());
    let items = extract_items(&bytes, base.as_ref(), request.mode)?;

    Ok(FetchOutcome::Fetched(ExtractionResult {
        items,
        etag: None,
        last_modified: Some(mtime.to_string()),
        redirect: None,
        status: 200,
    }))
}

fn extract_items(
    bytes: &[u8],
    base: Option<&Url>,
    mode: &ExtractionMode,
) -> Result<Vec<Item>, FetchError> {
    match mode {
        ExtractionMode::Structured => {
            parse_feed(bytes).map_err(|e| FetchError::Parse(e.to_string()))
        }
        ExtractionMode::Scraped(rules) => {
            let html = String::from_utf8_lossy(bytes);
            Ok(scrape::extract(&html, base, rules))
        }
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
