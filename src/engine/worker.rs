//! The single-URL pipeline.
//!
//! Every frontier entry runs the same gauntlet: depth and scope checks,
//! robots evaluation, per-host pacing, the incremental-store freshness
//! decision, the fetch itself, content-hash dedup, routing, and link
//! discovery. The pipeline owns the visited-set transition: a URL is
//! marked visited exactly when its processing completes, and never when
//! the run is cancelled mid-flight.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::budget::BudgetTracker;
use crate::config::CrawlConfig;
use crate::errors::ErrorKind;
use crate::events::EventBus;
use crate::fetcher::{Body, FetchRequest, FetchResult, Fetcher};
use crate::frontier::{FrontierEntry, VisitedSet};
use crate::limiter::RateLimiter;
use crate::renderer::RenderOptions;
use crate::robots::RobotsRegistry;
use crate::router::ContentRouter;
use crate::store::{ContentHashStore, IncrementalStore};
use crate::urlnorm::{CanonicalUrl, Normalizer, Scope};

use super::CancellationToken;
use super::artifact::{ArtifactError, PageArtifact};

/// Run-wide skip accounting.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub skipped_by_robots: AtomicU64,
    pub skipped_by_scope: AtomicU64,
    pub skipped_fresh: AtomicU64,
    pub queue_full_drops: AtomicU64,
    errors: Mutex<HashMap<ErrorKind, u64>>,
}

impl Counters {
    pub fn record_error(&self, kind: ErrorKind) {
        *self.errors.lock().entry(kind).or_insert(0) += 1;
    }

    pub fn errors_by_kind(&self) -> HashMap<ErrorKind, u64> {
        self.errors.lock().clone()
    }
}

/// Shared state every worker borrows for the duration of the run.
pub(crate) struct CrawlContext {
    pub config: CrawlConfig,
    pub scope: Scope,
    pub normalizer: Normalizer,
    pub robots: RobotsRegistry,
    pub limiter: RateLimiter,
    pub fetcher: Fetcher,
    pub router: ContentRouter,
    pub incremental: IncrementalStore,
    pub hashes: ContentHashStore,
    pub budget: BudgetTracker,
    pub visited: Arc<VisitedSet>,
    pub events: Option<Arc<EventBus>>,
    pub cancel: CancellationToken,
    pub counters: Counters,
    pub run_id: String,
}

impl CrawlContext {
    /// Assemble the shared subsystems from a config.
    ///
    /// Returns the context and the canonicalized seed URL. When the
    /// config asks for rendered DOM and no renderer was supplied, the
    /// bundled chromium renderer is launched (requires the `browser`
    /// feature).
    pub(crate) async fn build(
        config: CrawlConfig,
        router: ContentRouter,
        renderer: Option<Arc<dyn crate::renderer::Renderer>>,
        events: Option<Arc<EventBus>>,
    ) -> anyhow::Result<(Self, CanonicalUrl)> {
        use anyhow::{Context as _, anyhow};

        let normalizer = Normalizer::with_ignored_extensions(config.ignored_extensions());
        let seed = normalizer
            .normalize(config.start_url(), None)
            .map_err(|e| anyhow!("start_url rejected: {e}"))?;

        let scope = Scope::from_seed(&seed, config.same_host_only(), config.same_path_only());

        let renderer = match renderer {
            Some(r) => Some(r),
            None if config.use_rendered_dom() => Some(launch_default_renderer(&config).await?),
            None => None,
        };

        let fetcher = Fetcher::new(&config, renderer)?;
        let robots = RobotsRegistry::new(
            config.user_agent(),
            config.timeout(),
            config.robots_cache_ttl(),
        )?;
        let limiter = RateLimiter::new(
            config.base_delay(),
            config.respect_crawl_delay(),
            config.adaptive_delay(),
        );
        let incremental = IncrementalStore::open(config.state_dir())
            .await
            .context("failed to open incremental store")?;
        let hashes = ContentHashStore::open(config.state_dir())
            .await
            .context("failed to open content hash store")?;
        let budget = BudgetTracker::from_config(&config);
        let run_id = config
            .run_id()
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);

        Ok((
            Self {
                config,
                scope,
                normalizer,
                robots,
                limiter,
                fetcher,
                router,
                incremental,
                hashes,
                budget,
                visited: Arc::new(VisitedSet::new()),
                events,
                cancel: CancellationToken::new(),
                counters: Counters::default(),
                run_id,
            },
            seed,
        ))
    }

    /// Whether `url` passes the scope predicate and the configured
    /// exclusion patterns.
    pub fn admits(&self, url: &CanonicalUrl) -> bool {
        if !self.scope.contains(url) {
            return false;
        }
        !self
            .config
            .excluded_patterns_compiled()
            .iter()
            .any(|re| re.is_match(url.as_str()))
    }
}

/// Why an entry produced no artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SkipKind {
    DepthExceeded,
    Scope,
    Robots,
    Fresh,
}

/// Outcome of processing one entry.
pub(crate) enum Processed {
    /// Artifact to emit plus in-scope links to schedule
    Artifact(Box<PageArtifact>, Vec<FrontierEntry>),
    Skipped(SkipKind),
    /// Run cancelled mid-pipeline; the visited set was not touched
    Cancelled,
}

/// Run the full pipeline for one frontier entry.
pub(crate) async fn process_entry(ctx: &CrawlContext, entry: &FrontierEntry) -> Processed {
    let url = &entry.url;

    if entry.depth > ctx.config.max_depth() {
        ctx.visited.insert(url);
        return Processed::Skipped(SkipKind::DepthExceeded);
    }

    if !ctx.admits(url) {
        ctx.counters.skipped_by_scope.fetch_add(1, Ordering::Relaxed);
        ctx.visited.insert(url);
        return Processed::Skipped(SkipKind::Scope);
    }

    if ctx.config.respect_robots() {
        let allowed = tokio::select! {
            allowed = ctx.robots.allowed(url) => allowed,
            () = ctx.cancel.cancelled() => return Processed::Cancelled,
        };
        if !allowed {
            debug!("robots.txt disallows {url}");
            ctx.counters.skipped_by_robots.fetch_add(1, Ordering::Relaxed);
            ctx.visited.insert(url);
            return Processed::Skipped(SkipKind::Robots);
        }
    }

    let host = url.host_str().to_string();

    if ctx.config.respect_crawl_delay() {
        let crawl_delay = ctx.robots.crawl_delay(url).await;
        ctx.limiter.set_crawl_delay(&host, crawl_delay).await;
    }

    if ctx.config.use_per_host_delay() {
        tokio::select! {
            () = ctx.limiter.wait(&host) => {}
            () = ctx.cancel.cancelled() => return Processed::Cancelled,
        }
    }

    let max_age = ctx.config.incremental_max_age();
    let force = ctx.config.force_recrawl();
    match ctx.incremental.should_crawl(url, max_age, force).await {
        Ok((false, _)) => {
            debug!("{url} is fresh, skipping");
            ctx.counters.skipped_fresh.fetch_add(1, Ordering::Relaxed);
            ctx.visited.insert(url);
            return Processed::Skipped(SkipKind::Fresh);
        }
        Ok((true, _)) => {}
        Err(e) => warn!("incremental lookup failed for {url}: {e:#}"),
    }

    let validators = if force {
        crate::store::Validators::default()
    } else {
        ctx.incremental
            .conditional_headers(url)
            .await
            .unwrap_or_default()
    };

    let mut request = FetchRequest::new(url.clone()).with_validators(validators);
    if ctx.config.use_rendered_dom() {
        request.use_rendered_dom = true;
        request.render_options = Some(RenderOptions {
            wait_for_selector: ctx.config.render_wait_selector().map(str::to_string),
            wait_timeout_ms: ctx.config.render_wait_timeout_ms(),
            browser_type: ctx.config.browser_type(),
        });
    }

    info!("crawling [depth {}]: {url}", entry.depth);

    let fetched = tokio::select! {
        fetched = ctx.fetcher.fetch(&request) => fetched,
        () = ctx.cancel.cancelled() => return Processed::Cancelled,
    };

    match fetched {
        Ok(result) if result.from_cache => {
            ctx.limiter.report_outcome(&host, result.status, None).await;
            if let Err(e) = ctx.incremental.record(url, 304, None, None, None).await {
                warn!("incremental record failed for {url}: {e:#}");
            }

            let artifact = PageArtifact {
                url: url.clone(),
                final_url: Some(result.url.clone()),
                http_status: Some(result.status),
                headers: header_map(&result),
                content_type: None,
                content_hash_hex: None,
                fetched_at: result.fetched_at,
                depth: entry.depth,
                unchanged: true,
                body: None,
                rendered: false,
                discovered: Vec::new(),
                error: None,
            };

            ctx.visited.insert(url);
            ctx.budget.record(1, 0);
            Processed::Artifact(Box::new(artifact), Vec::new())
        }

        Ok(result) => {
            ctx.limiter.report_outcome(&host, result.status, None).await;

            let digest = ContentHashStore::hash(result.body.as_bytes());
            let (digest, is_new) = match ctx
                .hashes
                .record(&digest, url.as_str(), None, Some(&ctx.run_id))
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("content hash record failed for {url}: {e:#}");
                    (digest, true)
                }
            };

            if let Err(e) = ctx
                .incremental
                .record(
                    url,
                    result.status,
                    result.etag(),
                    result.last_modified(),
                    Some(&digest),
                )
                .await
            {
                warn!("incremental record failed for {url}: {e:#}");
            }

            // Visited before link discovery so a self-link cannot requeue
            // the page we are finishing.
            ctx.visited.insert(url);

            let discovered = discover_links(ctx, entry, &result);
            let body_len = result.body.len() as u64;

            let artifact = PageArtifact {
                url: url.clone(),
                final_url: Some(result.url.clone()),
                http_status: Some(result.status),
                headers: header_map(&result),
                content_type: result.content_type.clone(),
                content_hash_hex: Some(digest),
                fetched_at: result.fetched_at,
                depth: entry.depth,
                unchanged: !is_new,
                body: match &result.body {
                    Body::Text(t) => Some(t.clone()),
                    Body::Bytes(_) | Body::Empty => None,
                },
                rendered: result.rendered,
                discovered: discovered.iter().map(|e| e.url.clone()).collect(),
                error: None,
            };

            ctx.budget.record(1, body_len);
            Processed::Artifact(Box::new(artifact), discovered)
        }

        Err(failure) => {
            if let Some(status) = failure.status {
                ctx.limiter
                    .report_outcome(&host, status, failure.retry_after)
                    .await;
            }

            let kind = failure.error.kind();
            ctx.counters.record_error(kind);
            ctx.visited.insert(url);

            let artifact = PageArtifact {
                url: url.clone(),
                final_url: None,
                http_status: failure.status,
                headers: BTreeMap::new(),
                content_type: None,
                content_hash_hex: None,
                fetched_at: Utc::now(),
                depth: entry.depth,
                unchanged: false,
                body: None,
                rendered: false,
                discovered: Vec::new(),
                error: Some(ArtifactError {
                    kind,
                    message: failure.error.to_string(),
                    attempts: failure.attempts,
                }),
            };

            ctx.budget.record(1, 0);
            Processed::Artifact(Box::new(artifact), Vec::new())
        }
    }
}

/// Resolve, filter, and deduplicate the links a page produced.
///
/// Links are resolved against the final (post-redirect) URL, scoped, and
/// depth-checked; URLs at `depth == max_depth` are fetched but their
/// discoveries are dropped here.
fn discover_links(
    ctx: &CrawlContext,
    entry: &FrontierEntry,
    result: &FetchResult,
) -> Vec<FrontierEntry> {
    let content_type = result.content_type.as_deref().unwrap_or("text/html");
    let Some(routed) = ctx.router.route(content_type, result) else {
        return Vec::new();
    };

    let routed = match routed {
        Ok(r) => r,
        Err(e) => {
            warn!("handler failed for {}: {e:#}", entry.url);
            return Vec::new();
        }
    };

    let next_depth = entry.depth + 1;
    if next_depth > ctx.config.max_depth() {
        return Vec::new();
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut discovered = Vec::new();

    for raw in routed.links {
        let Ok(normalized) = ctx.normalizer.normalize(&raw, Some(&result.url)) else {
            continue;
        };
        if !seen.insert(normalized.as_str().to_string()) {
            continue;
        }
        if !ctx.admits(&normalized) {
            ctx.counters.skipped_by_scope.fetch_add(1, Ordering::Relaxed);
            continue;
        }
        if ctx.visited.contains(&normalized) {
            continue;
        }
        discovered.push(FrontierEntry::new(
            normalized,
            next_depth,
            Some(entry.url.clone()),
        ));
    }

    discovered
}

#[cfg(feature = "browser")]
async fn launch_default_renderer(
    config: &CrawlConfig,
) -> anyhow::Result<Arc<dyn crate::renderer::Renderer>> {
    let renderer = crate::renderer::ChromiumRenderer::launch(config.timeout()).await?;
    Ok(Arc::new(renderer))
}

#[cfg(not(feature = "browser"))]
async fn launch_default_renderer(
    _config: &CrawlConfig,
) -> anyhow::Result<Arc<dyn crate::renderer::Renderer>> {
    Err(anyhow::anyhow!(
        "use_rendered_dom requires the 'browser' feature or an explicit renderer"
    ))
}

fn header_map(result: &FetchResult) -> BTreeMap<String, String> {
    result
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}
