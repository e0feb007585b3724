//! robots.txt acquisition, caching, and evaluation.
//!
//! One record is kept per origin with a TTL. Fetch failures are never
//! fatal: the origin gets a permissive record flagged `fetch_failed` and
//! is retried once the TTL lapses. Concurrent first requests to the same
//! origin are single-flighted — one fetch runs, the rest await it.

mod parser;

pub use parser::RobotsRules;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dashmap::DashMap;
use log::{debug, warn};
use reqwest::redirect;
use tokio::sync::Mutex;
use url::Url;

use crate::urlnorm::CanonicalUrl;

/// Robots bodies beyond this size are truncated before parsing
const MAX_ROBOTS_BYTES: usize = 512 * 1024;

/// Cached evaluation state for one origin
#[derive(Debug, Clone)]
pub struct RobotsRecord {
    pub fetched_at: Instant,
    pub fetch_failed: bool,
    rules: Arc<RobotsRules>,
}

impl RobotsRecord {
    fn permissive(fetch_failed: bool) -> Self {
        Self {
            fetched_at: Instant::now(),
            fetch_failed,
            rules: Arc::new(RobotsRules::default()),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() > ttl
    }
}

/// How often expired records are swept from the cache
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Per-origin robots.txt registry.
pub struct RobotsRegistry {
    cache: DashMap<String, Arc<Mutex<Option<RobotsRecord>>>>,
    client: reqwest::Client,
    user_agent: String,
    ttl: Duration,
    last_prune: parking_lot::Mutex<Instant>,
}

impl RobotsRegistry {
    /// Build a registry with its own HTTP client.
    ///
    /// robots.txt redirects are followed only within the same host; a
    /// cross-host redirect surfaces as the 3xx itself and is treated as
    /// unfetchable per the politeness contract.
    pub fn new(user_agent: &str, timeout: Duration, ttl: Duration) -> Result<Self> {
        let policy = redirect::Policy::custom(|attempt| {
            if attempt.previous().len() > 5 {
                return attempt.stop();
            }
            let original_host = attempt
                .previous()
                .first()
                .and_then(Url::host_str)
                .map(str::to_ascii_lowercase);
            let next_host = attempt.url().host_str().map(str::to_ascii_lowercase);
            if original_host.is_some() && original_host == next_host {
                attempt.follow()
            } else {
                attempt.stop()
            }
        });

        let client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .timeout(timeout)
            .redirect(policy)
            .build()
            .context("failed to build robots.txt client")?;

        Ok(Self {
            cache: DashMap::new(),
            client,
            user_agent: user_agent.to_string(),
            ttl,
            last_prune: parking_lot::Mutex::new(Instant::now()),
        })
    }

    /// Whether our user agent may fetch `url`.
    pub async fn allowed(&self, url: &CanonicalUrl) -> bool {
        let record = self.record_for(url).await;
        let path = match url.as_url().query() {
            Some(q) => format!("{}?{q}", url.path()),
            None => url.path().to_string(),
        };
        record.rules.allowed(&self.user_agent, &path)
    }

    /// The `Crawl-Delay` declared for our user agent on this origin.
    pub async fn crawl_delay(&self, url: &CanonicalUrl) -> Option<Duration> {
        let record = self.record_for(url).await;
        record.rules.crawl_delay(&self.user_agent)
    }

    /// Sitemap URLs declared by this origin's robots.txt.
    pub async fn sitemaps(&self, url: &CanonicalUrl) -> Vec<Url> {
        let record = self.record_for(url).await;
        record
            .rules
            .sitemaps()
            .iter()
            .filter_map(|s| Url::parse(s).ok())
            .collect()
    }

    async fn record_for(&self, url: &CanonicalUrl) -> RobotsRecord {
        self.maybe_prune();
        let origin = url.as_url().origin().ascii_serialization();

        let slot = self
            .cache
            .entry(origin.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        // Holding the per-origin lock across the fetch single-flights
        // concurrent lookups for the same origin.
        let mut guard = slot.lock().await;
        if let Some(record) = guard.as_ref()
            && !record.is_expired(self.ttl)
        {
            return record.clone();
        }

        let record = self.fetch(&origin).await;
        *guard = Some(record.clone());
        record
    }

    async fn fetch(&self, origin: &str) -> RobotsRecord {
        let robots_url = format!("{origin}/robots.txt");
        debug!("fetching {robots_url}");

        let response = match self.client.get(&robots_url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("robots.txt fetch failed for {origin}: {e}; proceeding permissively");
                return RobotsRecord::permissive(true);
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            // No robots.txt is an explicit "everything allowed"
            return RobotsRecord::permissive(false);
        }
        if !status.is_success() {
            warn!(
                "robots.txt for {origin} returned {status}; proceeding permissively until TTL"
            );
            return RobotsRecord::permissive(true);
        }

        let body = match response.text().await {
            Ok(mut b) => {
                if b.len() > MAX_ROBOTS_BYTES {
                    b.truncate(MAX_ROBOTS_BYTES);
                }
                b
            }
            Err(e) => {
                warn!("robots.txt body read failed for {origin}: {e}");
                return RobotsRecord::permissive(true);
            }
        };

        RobotsRecord {
            fetched_at: Instant::now(),
            fetch_failed: false,
            rules: Arc::new(RobotsRules::parse(&body)),
        }
    }

    /// Drop expired records every so often to bound the cache on long
    /// crawls.
    fn maybe_prune(&self) {
        {
            let mut last = self.last_prune.lock();
            if last.elapsed() < PRUNE_INTERVAL {
                return;
            }
            *last = Instant::now();
        }

        self.cache.retain(|_, slot| {
            match slot.try_lock() {
                Ok(guard) => match guard.as_ref() {
                    Some(record) => !record.is_expired(self.ttl),
                    None => true,
                },
                // A fetch is in flight; keep the slot
                Err(_) => true,
            }
        });
    }
}
