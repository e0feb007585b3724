//! Cross-run persistent state.
//!
//! Two sqlite-backed stores: the incremental store (per-URL validators
//! and freshness) and the content hash store (first-seen ledger of body
//! digests). Both open in WAL mode with a busy timeout; passing no state
//! directory keeps them in memory for the duration of the run.

mod content_hash;
mod incremental;

pub use content_hash::ContentHashStore;
pub use incremental::{CrawlReason, IncrementalStore, Validators};

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};

/// Open a sqlite pool for a store database.
///
/// With a state directory the database lives at `{dir}/{file}` (created
/// if missing); without one a single-connection in-memory database is
/// used so all handles see the same data.
pub(crate) async fn open_pool(state_dir: Option<&Path>, file: &str) -> Result<SqlitePool> {
    match state_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("failed to create state dir {}", dir.display()))?;

            let options = SqliteConnectOptions::new()
                .filename(dir.join(file))
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .busy_timeout(Duration::from_secs(30));

            SqlitePoolOptions::new()
                .max_connections(4)
                .connect_with(options)
                .await
                .context("failed to open sqlite database")
        }
        None => {
            let options = SqliteConnectOptions::new()
                .filename(":memory:")
                .create_if_missing(true);

            // One connection only: separate connections to :memory: would
            // each get their own empty database.
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect_with(options)
                .await
                .context("failed to open in-memory sqlite database")
        }
    }
}
