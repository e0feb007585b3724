//! Core configuration types for crawl runs
//!
//! This module contains the main `CrawlConfig` struct and its associated
//! enums that define the behavior of a crawl: scope, politeness, fetching,
//! budgets, and frontier ordering.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which frontier ordering strategy to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// FIFO across depths, insertion order within a depth
    #[default]
    Bfs,
    /// LIFO
    Dfs,
    /// Sitemap-declared priority, descending, then depth
    Sitemap,
    /// Score from regex matches on the URL
    Pattern,
    /// Weighted sum of sitemap, pattern, and depth scores
    Composite,
}

/// Browser engine used by the rendered-DOM port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BrowserType {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

/// A regex pattern with the priority score it contributes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternPriority {
    pub pattern: String,
    pub score: f64,
}

/// Sub-strategy weights for the composite ordering strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompositeWeights {
    pub sitemap: f64,
    pub pattern: f64,
    pub depth: f64,
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            sitemap: 1.0,
            pattern: 1.0,
            depth: 0.1,
        }
    }
}

/// Main configuration struct for a crawl run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Seed URL the crawl starts from
    pub(crate) start_url: String,
    pub(crate) max_depth: usize,
    pub(crate) same_host_only: bool,
    pub(crate) same_path_only: bool,
    pub(crate) respect_robots: bool,

    /// Frontier capacity; `None` = unbounded. When full, pushes are
    /// counted and dropped, never fatal.
    pub(crate) max_queue_size: Option<usize>,
    pub(crate) workers: usize,
    /// Concurrent in-flight fetches per worker process in distributed mode
    pub(crate) max_concurrent_requests: usize,

    pub(crate) user_agent: String,
    pub(crate) max_retries: u32,
    pub(crate) timeout_secs: u64,
    pub(crate) verify_tls: bool,
    pub(crate) proxy: Option<String>,
    /// Permit following an https→http redirect
    pub(crate) allow_insecure_downgrade: bool,
    /// Hard cap on response body size; larger responses fail with
    /// `ResponseTooLarge` without buffering the body.
    pub(crate) max_response_bytes: Option<u64>,

    pub(crate) use_rendered_dom: bool,
    pub(crate) render_wait_selector: Option<String>,
    pub(crate) render_wait_timeout_ms: Option<u64>,
    pub(crate) browser_type: BrowserType,

    /// Minimum inter-request gap per host, in seconds
    pub(crate) base_delay_secs: f64,
    pub(crate) use_per_host_delay: bool,
    /// Honor `Crawl-Delay` from robots.txt when larger than the base delay
    pub(crate) respect_crawl_delay: bool,
    /// Grow the per-host delay on 429/5xx pressure, decay it on success
    pub(crate) adaptive_delay: bool,
    pub(crate) robots_cache_ttl_secs: u64,

    pub(crate) max_pages: Option<u64>,
    pub(crate) max_bytes: Option<u64>,
    pub(crate) max_wall_clock_secs: Option<u64>,

    pub(crate) strategy: StrategyKind,
    pub(crate) priority_patterns: Vec<PatternPriority>,
    pub(crate) composite_weights: CompositeWeights,

    /// Directory holding the sqlite state databases. `None` keeps state
    /// in memory for the duration of the run.
    pub(crate) state_dir: Option<PathBuf>,
    /// Re-crawl a known URL only after this many seconds
    pub(crate) incremental_max_age_secs: Option<u64>,
    /// Bypass freshness checks and conditional requests entirely
    pub(crate) force_recrawl: bool,

    /// Seed the frontier from robots.txt-declared sitemaps
    pub(crate) use_sitemap: bool,
    /// Additional sitemap URLs to seed from
    pub(crate) sitemap_urls: Vec<String>,

    /// Path extensions the normalizer rejects outright (e.g. "jpg")
    pub(crate) ignored_extensions: Vec<String>,
    pub(crate) excluded_patterns: Option<Vec<String>>,

    /// Compiled regexes from `excluded_patterns`, built once at config
    /// creation to avoid hot-path compilation
    #[serde(skip)]
    pub(crate) excluded_patterns_compiled: Vec<regex::Regex>,

    /// How long an idle `pop` waits before reporting the frontier empty,
    /// in milliseconds
    pub(crate) idle_timeout_ms: u64,
    /// Identifier recorded with content hashes; generated when absent
    pub(crate) run_id: Option<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            start_url: String::new(),
            max_depth: 3,
            same_host_only: true,
            same_path_only: false,
            respect_robots: true,
            max_queue_size: None,
            workers: 1,
            max_concurrent_requests: 5,
            user_agent: concat!("crawlkit/", env!("CARGO_PKG_VERSION")).to_string(),
            max_retries: 3,
            timeout_secs: 10,
            verify_tls: true,
            proxy: None,
            allow_insecure_downgrade: false,
            max_response_bytes: None,
            use_rendered_dom: false,
            render_wait_selector: None,
            render_wait_timeout_ms: None,
            browser_type: BrowserType::default(),
            base_delay_secs: 0.1,
            use_per_host_delay: true,
            respect_crawl_delay: true,
            adaptive_delay: true,
            robots_cache_ttl_secs: 3600,
            max_pages: None,
            max_bytes: None,
            max_wall_clock_secs: None,
            strategy: StrategyKind::default(),
            priority_patterns: Vec::new(),
            composite_weights: CompositeWeights::default(),
            state_dir: None,
            incremental_max_age_secs: None,
            force_recrawl: false,
            use_sitemap: false,
            sitemap_urls: Vec::new(),
            ignored_extensions: Vec::new(),
            excluded_patterns: None,
            excluded_patterns_compiled: Vec::new(),
            idle_timeout_ms: 1000,
            run_id: None,
        }
    }
}
