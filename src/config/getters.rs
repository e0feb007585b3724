//! Getter methods for `CrawlConfig`
//!
//! Accessor methods for retrieving configuration values; durations are
//! materialized here so callers never hand-convert seconds.

use std::path::Path;
use std::time::Duration;

use super::types::{BrowserType, CompositeWeights, CrawlConfig, PatternPriority, StrategyKind};

impl CrawlConfig {
    #[must_use]
    pub fn start_url(&self) -> &str {
        &self.start_url
    }

    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    #[must_use]
    pub fn same_host_only(&self) -> bool {
        self.same_host_only
    }

    #[must_use]
    pub fn same_path_only(&self) -> bool {
        self.same_path_only
    }

    #[must_use]
    pub fn respect_robots(&self) -> bool {
        self.respect_robots
    }

    #[must_use]
    pub fn max_queue_size(&self) -> Option<usize> {
        self.max_queue_size
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    #[must_use]
    pub fn max_concurrent_requests(&self) -> usize {
        self.max_concurrent_requests
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn verify_tls(&self) -> bool {
        self.verify_tls
    }

    #[must_use]
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    #[must_use]
    pub fn allow_insecure_downgrade(&self) -> bool {
        self.allow_insecure_downgrade
    }

    #[must_use]
    pub fn max_response_bytes(&self) -> Option<u64> {
        self.max_response_bytes
    }

    #[must_use]
    pub fn use_rendered_dom(&self) -> bool {
        self.use_rendered_dom
    }

    #[must_use]
    pub fn render_wait_selector(&self) -> Option<&str> {
        self.render_wait_selector.as_deref()
    }

    #[must_use]
    pub fn render_wait_timeout_ms(&self) -> Option<u64> {
        self.render_wait_timeout_ms
    }

    #[must_use]
    pub fn browser_type(&self) -> BrowserType {
        self.browser_type
    }

    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_secs_f64(self.base_delay_secs.max(0.0))
    }

    #[must_use]
    pub fn use_per_host_delay(&self) -> bool {
        self.use_per_host_delay
    }

    #[must_use]
    pub fn respect_crawl_delay(&self) -> bool {
        self.respect_crawl_delay
    }

    #[must_use]
    pub fn adaptive_delay(&self) -> bool {
        self.adaptive_delay
    }

    #[must_use]
    pub fn robots_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.robots_cache_ttl_secs)
    }

    #[must_use]
    pub fn max_pages(&self) -> Option<u64> {
        self.max_pages
    }

    #[must_use]
    pub fn max_bytes(&self) -> Option<u64> {
        self.max_bytes
    }

    #[must_use]
    pub fn max_wall_clock(&self) -> Option<Duration> {
        self.max_wall_clock_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    #[must_use]
    pub fn priority_patterns(&self) -> &[PatternPriority] {
        &self.priority_patterns
    }

    #[must_use]
    pub fn composite_weights(&self) -> CompositeWeights {
        self.composite_weights
    }

    #[must_use]
    pub fn state_dir(&self) -> Option<&Path> {
        self.state_dir.as_deref()
    }

    #[must_use]
    pub fn incremental_max_age(&self) -> Option<Duration> {
        self.incremental_max_age_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub fn force_recrawl(&self) -> bool {
        self.force_recrawl
    }

    #[must_use]
    pub fn use_sitemap(&self) -> bool {
        self.use_sitemap
    }

    #[must_use]
    pub fn sitemap_urls(&self) -> &[String] {
        &self.sitemap_urls
    }

    #[must_use]
    pub fn ignored_extensions(&self) -> &[String] {
        &self.ignored_extensions
    }

    /// Pre-compiled exclusion regexes (compiled once at `build()` time)
    #[must_use]
    pub fn excluded_patterns_compiled(&self) -> &[regex::Regex] {
        &self.excluded_patterns_compiled
    }

    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    #[must_use]
    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }
}
