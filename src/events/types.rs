//! Event type definitions for the crawl event system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ErrorKind;

/// Reason the event stream ended
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ShutdownReason {
    Completed,
    BudgetExceeded,
    Cancelled,
    Error(String),
}

/// Events emitted over the course of a crawl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CrawlEvent {
    /// A crawl session started
    CrawlStarted {
        start_url: String,
        max_depth: usize,
        timestamp: DateTime<Utc>,
    },
    /// A page was fetched and processed
    PageCrawled {
        url: String,
        status: u16,
        depth: usize,
        content_hash: Option<String>,
        /// Body matched a previously recorded hash or validators
        unchanged: bool,
        timestamp: DateTime<Utc>,
    },
    /// A page failed terminally
    PageFailed {
        url: String,
        kind: ErrorKind,
        message: String,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },
    /// The crawl finished
    CrawlCompleted {
        pages_crawled: u64,
        bytes_fetched: u64,
        duration_secs: f64,
        timestamp: DateTime<Utc>,
    },
    /// Subscribers should exit their event loops on receipt
    Shutdown {
        reason: ShutdownReason,
        timestamp: DateTime<Utc>,
    },
}

impl CrawlEvent {
    #[must_use]
    pub fn crawl_started(start_url: String, max_depth: usize) -> Self {
        Self::CrawlStarted {
            start_url,
            max_depth,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn page_crawled(
        url: String,
        status: u16,
        depth: usize,
        content_hash: Option<String>,
        unchanged: bool,
    ) -> Self {
        Self::PageCrawled {
            url,
            status,
            depth,
            content_hash,
            unchanged,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn page_failed(url: String, kind: ErrorKind, message: String, attempts: u32) -> Self {
        Self::PageFailed {
            url,
            kind,
            message,
            attempts,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn crawl_completed(pages_crawled: u64, bytes_fetched: u64, duration_secs: f64) -> Self {
        Self::CrawlCompleted {
            pages_crawled,
            bytes_fetched,
            duration_secs,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn shutdown(reason: ShutdownReason) -> Self {
        Self::Shutdown {
            reason,
            timestamp: Utc::now(),
        }
    }
}
