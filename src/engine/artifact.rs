//! Artifacts emitted by the crawl and the end-of-run summary.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ErrorKind;
use crate::urlnorm::CanonicalUrl;

/// Terminal error attached to a failed artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactError {
    pub kind: ErrorKind,
    pub message: String,
    pub attempts: u32,
}

/// One fetched (or terminally failed) page.
///
/// This is the contract consumed by downstream sinks; the engine never
/// looks at an artifact again after emitting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageArtifact {
    pub url: CanonicalUrl,
    /// Where redirects actually landed; equals `url` when none occurred
    pub final_url: Option<CanonicalUrl>,
    pub http_status: Option<u16>,
    /// Response headers, names lower-cased
    pub headers: BTreeMap<String, String>,
    pub content_type: Option<String>,
    pub content_hash_hex: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub depth: usize,
    /// Body identical to one seen before (content hash or validators)
    pub unchanged: bool,
    /// Decoded text body; binary bodies and 304s carry none
    pub body: Option<String>,
    /// True when the body came from the rendered-DOM port
    pub rendered: bool,
    /// In-scope links discovered on this page (canonical form)
    pub discovered: Vec<CanonicalUrl>,
    pub error: Option<ArtifactError>,
}

impl PageArtifact {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
            && self
                .http_status
                .is_some_and(|s| (200..300).contains(&s))
    }
}

/// What ended the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCause {
    /// Frontier drained with all workers idle
    FrontierExhausted,
    BudgetExceeded,
    Cancelled,
}

/// Final accounting for a crawl run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub pages_crawled: u64,
    pub bytes_fetched: u64,
    pub errors_by_kind: HashMap<ErrorKind, u64>,
    pub skipped_by_robots: u64,
    pub skipped_by_scope: u64,
    /// Known-fresh URLs skipped by the incremental store
    pub skipped_fresh: u64,
    /// Pushes dropped because the bounded frontier was full
    pub queue_full_drops: u64,
    pub duration_seconds: f64,
    pub stopped_by: StopCause,
}
