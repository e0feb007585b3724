//! crawlkit — a polite, concurrent web-crawling engine.
//!
//! Turns a seed URL into a bounded, deduplicated stream of
//! [`PageArtifact`]s while respecting robots.txt, per-host pacing,
//! crawl scope, and page/byte/time budgets. Incremental state (ETags,
//! Last-Modified validators, and content hashes) persists across runs so
//! unchanged pages are revalidated instead of refetched.
//!
//! ```no_run
//! use crawlkit::{CrawlConfig, CrawlEngine};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = CrawlConfig::builder()
//!     .start_url("https://example.com/")
//!     .max_depth(2)
//!     .workers(4)
//!     .max_pages(100)
//!     .build()?;
//!
//! let (engine, mut artifacts) = CrawlEngine::new(config).await?;
//! let crawl = tokio::spawn(engine.run());
//!
//! while let Some(artifact) = artifacts.recv().await {
//!     println!("{} -> {:?}", artifact.url, artifact.http_status);
//! }
//! let summary = crawl.await??;
//! println!("{} pages in {:.1}s", summary.pages_crawled, summary.duration_seconds);
//! # Ok(())
//! # }
//! ```

pub mod budget;
pub mod config;
pub mod distributed;
pub mod engine;
pub mod errors;
pub mod events;
pub mod fetcher;
pub mod frontier;
pub mod limiter;
pub mod renderer;
pub mod robots;
pub mod router;
pub mod sitemap;
pub mod store;
pub mod urlnorm;

pub use budget::BudgetTracker;
pub use config::{BrowserType, CompositeWeights, CrawlConfig, PatternPriority, StrategyKind};
pub use engine::{
    ArtifactError, CancellationToken, CrawlEngine, PageArtifact, RunSummary, StopCause,
};
pub use errors::{CrawlError, CrawlResult, ErrorKind};
pub use events::{CrawlEvent, EventBus, ShutdownReason};
pub use fetcher::{Body, FetchRequest, FetchResult, Fetcher};
pub use frontier::{Frontier, FrontierEntry, VisitedSet};
pub use limiter::RateLimiter;
pub use renderer::{RenderOptions, RenderedPage, Renderer};
pub use robots::RobotsRegistry;
pub use router::{ContentHandler, ContentRouter, RoutedContent};
pub use store::{ContentHashStore, IncrementalStore};
pub use urlnorm::{CanonicalUrl, Normalizer, Scope};

#[cfg(feature = "browser")]
pub use renderer::ChromiumRenderer;
