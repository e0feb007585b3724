//! Per-URL incremental crawl state.
//!
//! Tracks ETags, Last-Modified values, content hashes, and crawl
//! timestamps so a later run can skip fresh pages and issue conditional
//! requests for stale ones.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::urlnorm::CanonicalUrl;

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS pages (
    url           TEXT PRIMARY KEY,
    etag          TEXT,
    last_modified TEXT,
    content_hash  TEXT,
    last_crawled  INTEGER NOT NULL,
    crawl_count   INTEGER NOT NULL DEFAULT 0
);
";

/// Why `should_crawl` decided the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlReason {
    /// URL has never been seen
    New,
    /// Crawled within the freshness window; skip
    Fresh,
    /// Known but outside the freshness window
    Stale,
    /// Freshness checks bypassed by configuration
    Forced,
}

/// Conditional-request validators known for a URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Validators {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// sqlite-backed map of canonical URL → crawl state.
#[derive(Clone)]
pub struct IncrementalStore {
    pool: SqlitePool,
}

impl IncrementalStore {
    /// Open (or create) the store under `state_dir`; `None` = in-memory.
    pub async fn open(state_dir: Option<&Path>) -> Result<Self> {
        let pool = super::open_pool(state_dir, "incremental.sqlite").await?;
        sqlx::query(SCHEMA_SQL)
            .execute(&pool)
            .await
            .context("failed to initialize incremental schema")?;
        Ok(Self { pool })
    }

    /// Decide whether `url` needs crawling.
    ///
    /// `force` bypasses every check. An unknown URL is `New`; a known one
    /// is `Fresh` inside the `max_age` window and `Stale` outside it (or
    /// always stale when no window is configured).
    pub async fn should_crawl(
        &self,
        url: &CanonicalUrl,
        max_age: Option<Duration>,
        force: bool,
    ) -> Result<(bool, CrawlReason)> {
        if force {
            return Ok((true, CrawlReason::Forced));
        }

        let row = sqlx::query("SELECT last_crawled FROM pages WHERE url = ?")
            .bind(url.as_str())
            .fetch_optional(&self.pool)
            .await
            .context("failed to query crawl state")?;

        let Some(row) = row else {
            return Ok((true, CrawlReason::New));
        };

        if let Some(max_age) = max_age {
            let last_crawled: i64 = row.get("last_crawled");
            let age = Utc::now().timestamp().saturating_sub(last_crawled);
            if age >= 0 && (age as u64) < max_age.as_secs() {
                return Ok((false, CrawlReason::Fresh));
            }
        }

        Ok((true, CrawlReason::Stale))
    }

    /// Validators for a conditional request, empty when unknown.
    pub async fn conditional_headers(&self, url: &CanonicalUrl) -> Result<Validators> {
        let row = sqlx::query("SELECT etag, last_modified FROM pages WHERE url = ?")
            .bind(url.as_str())
            .fetch_optional(&self.pool)
            .await
            .context("failed to query validators")?;

        Ok(match row {
            Some(row) => Validators {
                etag: row.get("etag"),
                last_modified: row.get("last_modified"),
            },
            None => Validators::default(),
        })
    }

    /// Record a fetch outcome.
    ///
    /// A 200 replaces the stored validators and hash; a 304 only bumps
    /// `last_crawled` (the stored validators are still correct). Other
    /// statuses are not recorded.
    pub async fn record(
        &self,
        url: &CanonicalUrl,
        status: u16,
        etag: Option<&str>,
        last_modified: Option<&str>,
        content_hash: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().timestamp();

        match status {
            200..=299 => {
                sqlx::query(
                    r"
                    INSERT INTO pages (url, etag, last_modified, content_hash, last_crawled, crawl_count)
                    VALUES (?, ?, ?, ?, ?, 1)
                    ON CONFLICT(url) DO UPDATE SET
                        etag = excluded.etag,
                        last_modified = excluded.last_modified,
                        content_hash = excluded.content_hash,
                        last_crawled = excluded.last_crawled,
                        crawl_count = crawl_count + 1
                    ",
                )
                .bind(url.as_str())
                .bind(etag)
                .bind(last_modified)
                .bind(content_hash)
                .bind(now)
                .execute(&self.pool)
                .await
                .context("failed to upsert crawl state")?;
            }
            304 => {
                sqlx::query(
                    r"
                    INSERT INTO pages (url, last_crawled, crawl_count)
                    VALUES (?, ?, 1)
                    ON CONFLICT(url) DO UPDATE SET
                        last_crawled = excluded.last_crawled,
                        crawl_count = crawl_count + 1
                    ",
                )
                .bind(url.as_str())
                .bind(now)
                .execute(&self.pool)
                .await
                .context("failed to touch crawl state")?;
            }
            _ => {}
        }

        Ok(())
    }

    /// The stored content hash for a URL, if any.
    pub async fn content_hash(&self, url: &CanonicalUrl) -> Result<Option<String>> {
        let row = sqlx::query("SELECT content_hash FROM pages WHERE url = ?")
            .bind(url.as_str())
            .fetch_optional(&self.pool)
            .await
            .context("failed to query content hash")?;
        Ok(row.and_then(|r| r.get("content_hash")))
    }
}
