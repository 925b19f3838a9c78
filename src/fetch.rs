use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL};

use crate::config::CrawlConfig;

// ── Constants ────────────────────────────────────────────────────────────────

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const MAX_REDIRECTS: usize = 10;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("{0}")]
    Request(String),
    #[error("upstream returned status {0}")]
    Upstream(u16),
    #[error("output write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot encode chapter list: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for CrawlError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CrawlError::Request(format!("TimeoutError: {}", e))
        } else if e.is_connect() {
            CrawlError::Request(format!("ConnectError: {}", e))
        } else {
            CrawlError::Request(format!("RequestError: {}", e))
        }
    }
}

// ── Client ───────────────────────────────────────────────────────────────────

/// Long-lived clients for page fetches and existence probes.
///
/// Browser-like headers plus a shared cookie jar let a verification cookie
/// handed out by the site be replayed on every later request. Probes never
/// follow redirects: a missing image redirected to a placeholder must not
/// count as found.
#[derive(Debug, Clone)]
pub struct SiteClient {
    client: reqwest::Client,
    probe_client: reqwest::Client,
    fetch_timeout: Duration,
    probe_timeout: Duration,
}

impl SiteClient {
    pub fn new(config: &CrawlConfig) -> Result<Self, CrawlError> {
        let jar = Arc::new(Jar::default());
        let client = base_builder(config, &jar)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        let probe_client = base_builder(config, &jar)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            probe_client,
            fetch_timeout: config.fetch_timeout,
            probe_timeout: config.probe_timeout,
        })
    }

    /// GET a page and return its body. Non-success statuses are errors.
    pub async fn get_text(&self, url: &str) -> Result<String, CrawlError> {
        tracing::info!(url, "requesting");
        let response = self
            .client
            .get(url)
            .timeout(self.fetch_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CrawlError::Upstream(response.status().as_u16()));
        }

        Ok(response.text().await?)
    }

    /// HEAD a URL without downloading the body. `Ok` means the resource exists.
    pub async fn probe(&self, url: &str) -> Result<(), CrawlError> {
        let response = self
            .probe_client
            .head(url)
            .timeout(self.probe_timeout)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CrawlError::Upstream(response.status().as_u16()))
        }
    }
}

fn base_builder(config: &CrawlConfig, jar: &Arc<Jar>) -> reqwest::ClientBuilder {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));

    reqwest::ClientBuilder::new()
        .connect_timeout(config.probe_timeout.min(config.fetch_timeout))
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .cookie_provider(Arc::clone(jar))
        .gzip(true)
        .brotli(true)
        .deflate(true)
}
