//! Error taxonomy for crawl operations.
//!
//! Every terminal failure surfaced on an artifact carries one of these
//! kinds; the fetcher consults [`CrawlError::is_retryable`] to decide
//! whether another attempt is worth making.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for crawl operations
pub type CrawlResult<T> = Result<T, CrawlError>;

/// Errors produced by the crawl pipeline
#[derive(Debug, Clone, Error)]
pub enum CrawlError {
    /// DNS failure, connection refused/reset, or other transport error
    #[error("network error: {0}")]
    Network(String),

    /// Connect, read, or total deadline exceeded
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// TLS handshake or certificate verification failure
    #[error("tls error: {0}")]
    Tls(String),

    /// Non-success HTTP status that survived the retry policy
    #[error("http error: status {0}")]
    Http(u16),

    /// Redirect chain exceeded the configured limit
    #[error("too many redirects")]
    TooManyRedirects,

    /// Body exceeded `max_response_bytes` (declared or streamed)
    #[error("response larger than {limit} bytes")]
    ResponseTooLarge { limit: u64 },

    /// Body could not be decoded with any detected charset
    #[error("decoding error: {0}")]
    Decoding(String),

    /// The rendered-DOM port failed
    #[error("renderer error: {0}")]
    Renderer(String),

    /// robots.txt disallows this URL for our user agent
    #[error("disallowed by robots.txt")]
    RobotsDisallowed,

    /// URL rejected by the scope predicate
    #[error("outside crawl scope")]
    ScopeRejected,

    /// A configured budget cap was reached
    #[error("crawl budget exceeded")]
    BudgetExceeded,

    /// Frontier at capacity; push was dropped
    #[error("frontier queue full")]
    QueueFull,

    /// Run-wide cancellation was observed
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid configuration detected at startup
    #[error("configuration error: {0}")]
    Config(String),
}

/// Wire/summary-friendly name for each error class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Timeout,
    Tls,
    Http,
    TooManyRedirects,
    ResponseTooLarge,
    Decoding,
    Renderer,
    RobotsDisallowed,
    ScopeRejected,
    BudgetExceeded,
    QueueFull,
    Cancelled,
    Config,
}

impl CrawlError {
    /// Kind tag used in summaries and serialized artifacts
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Tls(_) => ErrorKind::Tls,
            Self::Http(_) => ErrorKind::Http,
            Self::TooManyRedirects => ErrorKind::TooManyRedirects,
            Self::ResponseTooLarge { .. } => ErrorKind::ResponseTooLarge,
            Self::Decoding(_) => ErrorKind::Decoding,
            Self::Renderer(_) => ErrorKind::Renderer,
            Self::RobotsDisallowed => ErrorKind::RobotsDisallowed,
            Self::ScopeRejected => ErrorKind::ScopeRejected,
            Self::BudgetExceeded => ErrorKind::BudgetExceeded,
            Self::QueueFull => ErrorKind::QueueFull,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether the fetcher should attempt this request again.
    ///
    /// Only transient transport failures, 5xx, and 429 qualify. 4xx
    /// responses, redirect loops, and size/decode failures are terminal.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Http(status) => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    /// Map a reqwest transport error into the taxonomy.
    ///
    /// Status-bearing responses are classified separately by the fetcher;
    /// this only sees errors raised before a response line was read (or
    /// mid-body).
    pub fn from_transport(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_redirect() {
            Self::TooManyRedirects
        } else if err.is_connect() || err.is_request() || err.is_body() || err.is_decode() {
            // reqwest folds TLS failures into connect errors; keep the
            // distinction when the source chain names it
            let msg = err.to_string();
            if msg.contains("tls") || msg.contains("certificate") {
                Self::Tls(msg)
            } else {
                Self::Network(msg)
            }
        } else {
            Self::Network(err.to_string())
        }
    }
}
