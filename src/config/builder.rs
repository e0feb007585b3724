//! Type-safe builder for `CrawlConfig` using the typestate pattern
//!
//! The builder refuses to produce a config until the seed URL is set, and
//! validates cross-field constraints (worker counts, delays, patterns) at
//! `build()` time so the engine never sees a half-formed config.

use std::marker::PhantomData;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use regex::Regex;

use super::types::{
    BrowserType, CompositeWeights, CrawlConfig, PatternPriority, StrategyKind,
};

// Type states for the builder
pub struct WithStartUrl;

pub struct CrawlConfigBuilder<State = ()> {
    pub(crate) inner: CrawlConfig,
    pub(crate) _phantom: PhantomData<State>,
}

impl Default for CrawlConfigBuilder<()> {
    fn default() -> Self {
        Self {
            inner: CrawlConfig::default(),
            _phantom: PhantomData,
        }
    }
}

impl CrawlConfig {
    /// Create a builder for configuring a `CrawlConfig` with a fluent interface
    #[must_use]
    pub fn builder() -> CrawlConfigBuilder<()> {
        CrawlConfigBuilder::default()
    }
}

impl CrawlConfigBuilder<()> {
    /// Set the seed URL (required)
    #[must_use]
    pub fn start_url(mut self, url: impl Into<String>) -> CrawlConfigBuilder<WithStartUrl> {
        self.inner.start_url = url.into();
        CrawlConfigBuilder {
            inner: self.inner,
            _phantom: PhantomData,
        }
    }
}

impl<State> CrawlConfigBuilder<State> {
    #[must_use]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.inner.max_depth = depth;
        self
    }

    #[must_use]
    pub fn same_host_only(mut self, value: bool) -> Self {
        self.inner.same_host_only = value;
        self
    }

    #[must_use]
    pub fn same_path_only(mut self, value: bool) -> Self {
        self.inner.same_path_only = value;
        self
    }

    #[must_use]
    pub fn respect_robots(mut self, value: bool) -> Self {
        self.inner.respect_robots = value;
        self
    }

    #[must_use]
    pub fn max_queue_size(mut self, size: usize) -> Self {
        self.inner.max_queue_size = Some(size);
        self
    }

    #[must_use]
    pub fn workers(mut self, count: usize) -> Self {
        self.inner.workers = count;
        self
    }

    #[must_use]
    pub fn max_concurrent_requests(mut self, count: usize) -> Self {
        self.inner.max_concurrent_requests = count;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.inner.user_agent = ua.into();
        self
    }

    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.inner.max_retries = retries;
        self
    }

    #[must_use]
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.inner.timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn verify_tls(mut self, value: bool) -> Self {
        self.inner.verify_tls = value;
        self
    }

    #[must_use]
    pub fn proxy(mut self, proxy_url: impl Into<String>) -> Self {
        self.inner.proxy = Some(proxy_url.into());
        self
    }

    #[must_use]
    pub fn allow_insecure_downgrade(mut self, value: bool) -> Self {
        self.inner.allow_insecure_downgrade = value;
        self
    }

    #[must_use]
    pub fn max_response_bytes(mut self, bytes: u64) -> Self {
        self.inner.max_response_bytes = Some(bytes);
        self
    }

    #[must_use]
    pub fn use_rendered_dom(mut self, value: bool) -> Self {
        self.inner.use_rendered_dom = value;
        self
    }

    #[must_use]
    pub fn render_wait_selector(mut self, selector: impl Into<String>) -> Self {
        self.inner.render_wait_selector = Some(selector.into());
        self
    }

    #[must_use]
    pub fn render_wait_timeout_ms(mut self, ms: u64) -> Self {
        self.inner.render_wait_timeout_ms = Some(ms);
        self
    }

    #[must_use]
    pub fn browser_type(mut self, browser: BrowserType) -> Self {
        self.inner.browser_type = browser;
        self
    }

    #[must_use]
    pub fn base_delay_secs(mut self, secs: f64) -> Self {
        self.inner.base_delay_secs = secs;
        self
    }

    #[must_use]
    pub fn use_per_host_delay(mut self, value: bool) -> Self {
        self.inner.use_per_host_delay = value;
        self
    }

    #[must_use]
    pub fn respect_crawl_delay(mut self, value: bool) -> Self {
        self.inner.respect_crawl_delay = value;
        self
    }

    #[must_use]
    pub fn adaptive_delay(mut self, value: bool) -> Self {
        self.inner.adaptive_delay = value;
        self
    }

    #[must_use]
    pub fn robots_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.inner.robots_cache_ttl_secs = secs;
        self
    }

    #[must_use]
    pub fn max_pages(mut self, pages: u64) -> Self {
        self.inner.max_pages = Some(pages);
        self
    }

    #[must_use]
    pub fn max_bytes(mut self, bytes: u64) -> Self {
        self.inner.max_bytes = Some(bytes);
        self
    }

    #[must_use]
    pub fn max_wall_clock_secs(mut self, secs: u64) -> Self {
        self.inner.max_wall_clock_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn strategy(mut self, strategy: StrategyKind) -> Self {
        self.inner.strategy = strategy;
        self
    }

    #[must_use]
    pub fn priority_pattern(mut self, pattern: impl Into<String>, score: f64) -> Self {
        self.inner.priority_patterns.push(PatternPriority {
            pattern: pattern.into(),
            score,
        });
        self
    }

    #[must_use]
    pub fn composite_weights(mut self, weights: CompositeWeights) -> Self {
        self.inner.composite_weights = weights;
        self
    }

    #[must_use]
    pub fn state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.inner.state_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn incremental_max_age_secs(mut self, secs: u64) -> Self {
        self.inner.incremental_max_age_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn force_recrawl(mut self, value: bool) -> Self {
        self.inner.force_recrawl = value;
        self
    }

    #[must_use]
    pub fn use_sitemap(mut self, value: bool) -> Self {
        self.inner.use_sitemap = value;
        self
    }

    #[must_use]
    pub fn sitemap_url(mut self, url: impl Into<String>) -> Self {
        self.inner.sitemap_urls.push(url.into());
        self
    }

    #[must_use]
    pub fn ignored_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.ignored_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn excluded_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.excluded_patterns = Some(patterns.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn idle_timeout_ms(mut self, ms: u64) -> Self {
        self.inner.idle_timeout_ms = ms;
        self
    }

    #[must_use]
    pub fn run_id(mut self, id: impl Into<String>) -> Self {
        self.inner.run_id = Some(id.into());
        self
    }
}

impl CrawlConfigBuilder<WithStartUrl> {
    /// Validate and produce the final configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for an unparseable seed URL, zero workers, a
    /// negative delay, or an invalid exclusion/priority regex.
    pub fn build(mut self) -> Result<CrawlConfig> {
        let config = &mut self.inner;

        url::Url::parse(&config.start_url)
            .map_err(|e| anyhow!("invalid start_url '{}': {e}", config.start_url))?;

        if config.workers == 0 {
            return Err(anyhow!("workers must be at least 1"));
        }
        if config.max_concurrent_requests == 0 {
            return Err(anyhow!("max_concurrent_requests must be at least 1"));
        }
        if !config.base_delay_secs.is_finite() || config.base_delay_secs < 0.0 {
            return Err(anyhow!(
                "base_delay_secs must be a non-negative number, got {}",
                config.base_delay_secs
            ));
        }
        if config.user_agent.trim().is_empty() {
            return Err(anyhow!("user_agent must not be empty"));
        }

        for p in &config.priority_patterns {
            Regex::new(&p.pattern)
                .map_err(|e| anyhow!("invalid priority pattern '{}': {e}", p.pattern))?;
        }

        if let Some(patterns) = &config.excluded_patterns {
            config.excluded_patterns_compiled = patterns
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|e| anyhow!("invalid excluded pattern '{p}': {e}"))
                })
                .collect::<Result<Vec<_>>>()?;
        }

        Ok(self.inner)
    }
}
