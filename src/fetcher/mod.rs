//! The HTTP fetch pipeline.
//!
//! A single `fetch` call covers retries with jittered exponential
//! backoff, Retry-After handling, conditional requests, redirect policy,
//! response-size guards, and charset-aware decoding. When a request asks
//! for a rendered DOM the fetcher delegates to the [`Renderer`] port
//! instead of issuing a plain GET.

pub mod charset;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use log::{debug, warn};
use rand::Rng;
use reqwest::header::{HeaderMap, IF_MODIFIED_SINCE, IF_NONE_MATCH, RETRY_AFTER};
use reqwest::redirect;

use crate::config::CrawlConfig;
use crate::errors::CrawlError;
use crate::renderer::{RenderOptions, Renderer};
use crate::store::Validators;
use crate::urlnorm::{CanonicalUrl, Normalizer};

/// Redirect chain limit
const MAX_REDIRECTS: usize = 10;
/// Backoff cap per attempt, pre-jitter
const MAX_BACKOFF: Duration = Duration::from_secs(32);
/// Retry-After values beyond this are clamped
const MAX_RETRY_AFTER: Duration = Duration::from_secs(120);

/// A single fetch to perform.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: CanonicalUrl,
    pub method: reqwest::Method,
    /// Conditional validators to send (If-None-Match / If-Modified-Since)
    pub validators: Validators,
    /// Extra headers beyond the client defaults
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub max_response_bytes: Option<u64>,
    pub use_rendered_dom: bool,
    pub render_options: Option<RenderOptions>,
}

impl FetchRequest {
    #[must_use]
    pub fn new(url: CanonicalUrl) -> Self {
        Self {
            url,
            method: reqwest::Method::GET,
            validators: Validators::default(),
            headers: Vec::new(),
            timeout: None,
            max_retries: None,
            max_response_bytes: None,
            use_rendered_dom: false,
            render_options: None,
        }
    }

    #[must_use]
    pub fn with_validators(mut self, validators: Validators) -> Self {
        self.validators = validators;
        self
    }
}

/// Decoded response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Text(String),
    Bytes(Vec<u8>),
    /// 304 responses carry no body
    Empty,
}

impl Body {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(t) => t.len(),
            Self::Bytes(b) => b.len(),
            Self::Empty => 0,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes to hash for content deduplication
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(t) => t.as_bytes(),
            Self::Bytes(b) => b,
            Self::Empty => &[],
        }
    }
}

/// Outcome of a successful fetch (including 304s).
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Final URL after redirects
    pub url: CanonicalUrl,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Body,
    pub charset: Option<String>,
    /// Media type before `;` parameters, lower-cased
    pub content_type: Option<String>,
    pub elapsed: Duration,
    /// True for a 304 validated against stored state
    pub from_cache: bool,
    pub fetched_at: DateTime<Utc>,
    pub attempts: u32,
    /// Populated when the DOM came from the renderer port
    pub rendered: bool,
}

impl FetchResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[must_use]
    pub fn etag(&self) -> Option<&str> {
        self.headers.get(reqwest::header::ETAG)?.to_str().ok()
    }

    #[must_use]
    pub fn last_modified(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::LAST_MODIFIED)?
            .to_str()
            .ok()
    }
}

/// Terminal fetch failure, with the context the scheduler needs for
/// politeness accounting and the emitted artifact.
#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub error: CrawlError,
    pub attempts: u32,
    pub status: Option<u16>,
    pub retry_after: Option<Duration>,
}

/// Issues HTTP requests on a shared client.
pub struct Fetcher {
    client: reqwest::Client,
    renderer: Option<Arc<dyn Renderer>>,
    normalizer: Normalizer,
    default_timeout: Duration,
    default_max_retries: u32,
    default_max_response_bytes: Option<u64>,
}

impl Fetcher {
    /// Build the fetcher and its HTTP client from the config.
    ///
    /// The redirect policy caps chains at ten hops and refuses an
    /// https→http downgrade unless the config explicitly allows it.
    pub fn new(config: &CrawlConfig, renderer: Option<Arc<dyn Renderer>>) -> Result<Self> {
        let allow_downgrade = config.allow_insecure_downgrade();
        let policy = redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() > MAX_REDIRECTS {
                return attempt.error("too many redirects");
            }
            let downgrade = attempt
                .previous()
                .first()
                .is_some_and(|first| first.scheme() == "https")
                && attempt.url().scheme() == "http";
            if downgrade && !allow_downgrade {
                return attempt.stop();
            }
            attempt.follow()
        });

        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent().to_string())
            .redirect(policy)
            .connect_timeout(config.timeout())
            .pool_max_idle_per_host(10)
            .danger_accept_invalid_certs(!config.verify_tls());

        if let Some(proxy_url) = config.proxy() {
            let proxy = reqwest::Proxy::all(proxy_url)
                .with_context(|| format!("invalid proxy url '{proxy_url}'"))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().context("failed to build http client")?;

        Ok(Self {
            client,
            renderer,
            normalizer: Normalizer::default(),
            default_timeout: config.timeout(),
            default_max_retries: config.max_retries(),
            default_max_response_bytes: config.max_response_bytes(),
        })
    }

    /// The underlying client, shared with sitemap seeding.
    #[must_use]
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Perform one fetch with the full retry policy.
    ///
    /// Total attempts are capped at `1 + max_retries`; only transient
    /// transport failures, 5xx, and 429 are retried.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, FetchFailure> {
        let max_retries = request.max_retries.unwrap_or(self.default_max_retries);
        let max_attempts = max_retries + 1;
        let started = Instant::now();

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            debug!("fetching {} (attempt {attempt}/{max_attempts})", request.url);

            let outcome = if request.use_rendered_dom {
                self.render_attempt(request, started, attempt).await
            } else {
                self.http_attempt(request, started, attempt).await
            };

            match outcome {
                Ok(result) => return Ok(result),
                Err((error, status, retry_after)) => {
                    if !error.is_retryable() || attempt >= max_attempts {
                        if attempt >= max_attempts && error.is_retryable() {
                            warn!(
                                "retries exhausted for {} after {attempt} attempts: {error}",
                                request.url
                            );
                        }
                        return Err(FetchFailure {
                            error,
                            attempts: attempt,
                            status,
                            retry_after,
                        });
                    }

                    let wait = match retry_after {
                        Some(ra) => ra.min(MAX_RETRY_AFTER),
                        None => backoff_delay(attempt),
                    };
                    debug!(
                        "retrying {} in {wait:?} after {error} (attempt {attempt}/{max_attempts})",
                        request.url
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    async fn http_attempt(
        &self,
        request: &FetchRequest,
        started: Instant,
        attempt: u32,
    ) -> Result<FetchResult, (CrawlError, Option<u16>, Option<Duration>)> {
        let timeout = request.timeout.unwrap_or(self.default_timeout);

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.as_str())
            .timeout(timeout);

        if let Some(etag) = &request.validators.etag {
            builder = builder.header(IF_NONE_MATCH, etag.as_str());
        }
        if let Some(last_modified) = &request.validators.last_modified {
            builder = builder.header(IF_MODIFIED_SINCE, last_modified.as_str());
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| (CrawlError::from_transport(&e, timeout), None, None))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let final_url = self
            .normalizer
            .normalize(response.url().as_str(), None)
            .unwrap_or_else(|_| request.url.clone());

        if status == 304 {
            return Ok(FetchResult {
                url: final_url,
                status,
                headers,
                body: Body::Empty,
                charset: None,
                content_type: None,
                elapsed: started.elapsed(),
                from_cache: true,
                fetched_at: Utc::now(),
                attempts: attempt,
                rendered: false,
            });
        }

        if !(200..300).contains(&status) {
            let retry_after = parse_retry_after(&headers);
            return Err((CrawlError::Http(status), Some(status), retry_after));
        }

        let limit = request
            .max_response_bytes
            .or(self.default_max_response_bytes);

        // Declared-length guard: refuse without reading the body
        if let (Some(limit), Some(declared)) = (limit, response.content_length())
            && declared > limit
        {
            return Err((CrawlError::ResponseTooLarge { limit }, Some(status), None));
        }

        let raw = read_body(response, limit, timeout).await.map_err(|e| {
            let status_hint = match &e {
                CrawlError::ResponseTooLarge { .. } => Some(status),
                _ => None,
            };
            (e, status_hint, None)
        })?;

        let content_type_header = headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html");
        let media_type = charset::media_type(content_type_header);

        let (body, used_charset) = if charset::is_textual(&media_type) {
            let header_charset = charset::charset_from_content_type(content_type_header);
            let (text, used) = charset::decode(&raw, header_charset.as_deref());
            (Body::Text(text), Some(used))
        } else {
            (Body::Bytes(raw), None)
        };

        Ok(FetchResult {
            url: final_url,
            status,
            headers,
            body,
            charset: used_charset,
            content_type: Some(media_type),
            elapsed: started.elapsed(),
            from_cache: false,
            fetched_at: Utc::now(),
            attempts: attempt,
            rendered: false,
        })
    }

    async fn render_attempt(
        &self,
        request: &FetchRequest,
        started: Instant,
        attempt: u32,
    ) -> Result<FetchResult, (CrawlError, Option<u16>, Option<Duration>)> {
        let Some(renderer) = &self.renderer else {
            return Err((
                CrawlError::Renderer("no renderer configured".to_string()),
                None,
                None,
            ));
        };

        let options = request.render_options.clone().unwrap_or_default();
        let page = renderer
            .render(request.url.as_str(), &options)
            .await
            .map_err(|e| (CrawlError::Renderer(format!("{e:#}")), None, None))?;

        if !(200..300).contains(&page.status) {
            return Err((CrawlError::Http(page.status), Some(page.status), None));
        }

        let final_url = self
            .normalizer
            .normalize(&page.final_url, None)
            .unwrap_or_else(|_| request.url.clone());

        let mut headers = HeaderMap::new();
        for (name, value) in &page.headers {
            if let (Ok(n), Ok(v)) = (
                reqwest::header::HeaderName::from_bytes(name.as_bytes()),
                reqwest::header::HeaderValue::from_str(value),
            ) {
                headers.insert(n, v);
            }
        }

        Ok(FetchResult {
            url: final_url,
            status: page.status,
            headers,
            body: Body::Text(page.html),
            charset: Some("utf-8".to_string()),
            content_type: Some("text/html".to_string()),
            elapsed: started.elapsed(),
            from_cache: false,
            fetched_at: Utc::now(),
            attempts: attempt,
            rendered: true,
        })
    }
}

/// Stream the body, aborting once the running total passes the limit.
async fn read_body(
    response: reqwest::Response,
    limit: Option<u64>,
    timeout: Duration,
) -> Result<Vec<u8>, CrawlError> {
    let mut stream = response.bytes_stream();
    let mut buf: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| CrawlError::from_transport(&e, timeout))?;
        if let Some(limit) = limit
            && (buf.len() as u64 + chunk.len() as u64) > limit
        {
            return Err(CrawlError::ResponseTooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(buf)
}

/// Exponential backoff with full jitter: `min(2^attempt, 32) s` scaled by
/// a uniform factor in [0.5, 1.0].
fn backoff_delay(attempt: u32) -> Duration {
    let base = Duration::from_secs(1u64 << attempt.min(5)).min(MAX_BACKOFF);
    let factor = rand::rng().random_range(0.5..=1.0);
    base.mul_f64(factor)
}

/// Parse a Retry-After header as delta-seconds or an HTTP-date.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        let delta = date.with_timezone(&Utc) - Utc::now();
        return Some(delta.to_std().unwrap_or(Duration::ZERO));
    }
    None
}
