use crate::config::ScraperConfig;
use anyhow::{Context, Result};
use reqwest::header::{self, HeaderMap, HeaderValue};
use std::error::Error as StdError;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::RetryIf;
use tracing::{debug, warn};

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out fetching {url}: {message}")]
    Timeout { url: String, message: String },

    #[error("could not resolve host for {url}: {message}")]
    Dns { url: String, message: String },

    #[error("network error fetching {url}: {message}")]
    Io { url: String, message: String },
}

impl FetchError {
    /// Only timeouts and name-resolution failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Timeout { .. } | FetchError::Dns { .. })
    }

    fn classify(url: &str, err: &reqwest::Error) -> Self {
        let url = url.to_string();
        let message = error_chain(err);

        if err.is_timeout() || has_io_kind(err, io::ErrorKind::TimedOut) {
            FetchError::Timeout { url, message }
        } else if looks_like_dns_failure(&message) {
            FetchError::Dns { url, message }
        } else {
            FetchError::Io { url, message }
        }
    }
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

fn has_io_kind(err: &(dyn StdError + 'static), kind: io::ErrorKind) -> bool {
    let mut source = Some(err);
    while let Some(cause) = source {
        if cause.downcast_ref::<io::Error>().is_some_and(|e| e.kind() == kind) {
            return true;
        }
        source = cause.source();
    }
    false
}

// hyper reports resolver failures as connect errors; only the message tells them apart.
fn looks_like_dns_failure(message: &str) -> bool {
    let message = message.to_lowercase();
    ["dns error", "failed to lookup address", "name or service not known", "no such host"]
        .iter()
        .any(|needle| message.contains(needle))
}

/// Sleep before each retry: 500ms, 1500ms, 2500ms, ...
pub fn backoff_schedule(max_retries: u32) -> impl Iterator<Item = Duration> {
    (0..u64::from(max_retries)).map(|attempt| Duration::from_millis(500 + attempt * 1000))
}

// ── Client ────────────────────────────────────────────────────────────────────

pub struct HttpClient {
    inner: reqwest::Client,
    max_retries: u32,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language).context("Invalid accept_language")?,
        );
        headers.insert(
            header::REFERER,
            HeaderValue::from_str(&config.referrer).context("Invalid referrer")?,
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(Duration::from_millis(config.timeout_ms))
            .gzip(true)
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            max_retries: config.max_retries,
        })
    }

    /// Fetch a URL as text, retrying timeouts and DNS failures.
    ///
    /// Non-2xx responses are returned like any other page; the caller decides
    /// whether the body holds anything useful.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let attempts = self.max_retries + 1;
        let attempt = AtomicU32::new(0);

        RetryIf::start(
            backoff_schedule(self.max_retries),
            || {
                let n = attempt.fetch_add(1, Ordering::Relaxed) + 1;
                async move {
                    debug!("GET {} (attempt {}/{})", url, n, attempts);
                    self.get_once(url).await
                }
            },
            |e: &FetchError| {
                warn!("Fetch failed: {}", e);
                e.is_transient()
            },
        )
        .await
    }

    async fn get_once(&self, url: &str) -> Result<String, FetchError> {
        let resp = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::classify(url, &e))?;

        let status = resp.status();
        if !status.is_success() {
            warn!("{} answered HTTP {}, parsing the body anyway", url, status);
        }

        resp.text().await.map_err(|e| FetchError::classify(url, &e))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
