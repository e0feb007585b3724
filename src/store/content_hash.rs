//! Cross-run ledger of content hashes.
//!
//! Every decoded body is keyed by its SHA-256 digest together with the
//! URL that first produced it. Recording is first-writer-wins: the row
//! for a digest never changes once written, and the insert is a single
//! conflict-ignoring statement so concurrent writers cannot race.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS content_hashes (
    sha256         TEXT PRIMARY KEY,
    first_seen_url TEXT NOT NULL,
    blob_path      TEXT,
    first_seen_at  TEXT NOT NULL,
    run_id         TEXT
);
CREATE INDEX IF NOT EXISTS idx_content_hashes_url ON content_hashes (first_seen_url);
CREATE INDEX IF NOT EXISTS idx_content_hashes_run ON content_hashes (run_id);
";

/// sqlite-backed ledger of bodies seen across runs.
#[derive(Clone)]
pub struct ContentHashStore {
    pool: SqlitePool,
}

impl ContentHashStore {
    /// Open (or create) the store under `state_dir`; `None` = in-memory.
    pub async fn open(state_dir: Option<&Path>) -> Result<Self> {
        let pool = super::open_pool(state_dir, "content_hashes.sqlite").await?;
        sqlx::query(SCHEMA_SQL)
            .execute(&pool)
            .await
            .context("failed to initialize content hash schema")?;
        Ok(Self { pool })
    }

    /// SHA-256 hex digest of a body.
    #[must_use]
    pub fn hash(body: &[u8]) -> String {
        hex::encode(Sha256::digest(body))
    }

    /// Record a digest with its origin URL.
    ///
    /// Returns `(digest, is_new)`. The first writer for a digest wins;
    /// later calls leave the row unchanged and report `is_new = false`.
    pub async fn record(
        &self,
        sha256_hex: &str,
        url: &str,
        blob_path: Option<&str>,
        run_id: Option<&str>,
    ) -> Result<(String, bool)> {
        let result = sqlx::query(
            r"
            INSERT INTO content_hashes (sha256, first_seen_url, blob_path, first_seen_at, run_id)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(sha256) DO NOTHING
            ",
        )
        .bind(sha256_hex)
        .bind(url)
        .bind(blob_path)
        .bind(Utc::now().to_rfc3339())
        .bind(run_id)
        .execute(&self.pool)
        .await
        .context("failed to record content hash")?;

        Ok((sha256_hex.to_string(), result.rows_affected() > 0))
    }

    /// The blob path stored with a digest, if any.
    pub async fn lookup_blob_path(&self, sha256_hex: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT blob_path FROM content_hashes WHERE sha256 = ?")
            .bind(sha256_hex)
            .fetch_optional(&self.pool)
            .await
            .context("failed to query blob path")?;
        Ok(row.and_then(|r| r.get("blob_path")))
    }

    /// The URL that first produced a digest, if known.
    pub async fn first_seen_url(&self, sha256_hex: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT first_seen_url FROM content_hashes WHERE sha256 = ?")
            .bind(sha256_hex)
            .fetch_optional(&self.pool)
            .await
            .context("failed to query first seen url")?;
        Ok(row.map(|r| r.get("first_seen_url")))
    }
}
