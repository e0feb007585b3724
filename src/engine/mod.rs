//! Worker-pool crawl engine.
//!
//! N workers drain the frontier concurrently, each running the
//! single-URL pipeline in [`worker`]. The pool terminates when the
//! frontier is quiescent (empty with nothing in flight), when the budget
//! trips, or on cancellation; the latter two drain the frontier without
//! processing the remainder.

mod artifact;
pub(crate) mod worker;

pub use artifact::{ArtifactError, PageArtifact, RunSummary, StopCause};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::Result;
use log::{debug, info, warn};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinSet;

use crate::config::CrawlConfig;
use crate::events::{CrawlEvent, EventBus, ShutdownReason};
use crate::frontier::{Frontier, FrontierEntry, PopOutcome, PushOutcome, strategy};
use crate::renderer::Renderer;
use crate::router::ContentRouter;
use crate::sitemap;
use crate::urlnorm::CanonicalUrl;

use worker::{CrawlContext, Processed};

/// Size of the artifact channel; a slow consumer applies backpressure to
/// the workers rather than buffering without bound.
const ARTIFACT_CHANNEL_CAPACITY: usize = 256;

/// One-shot, run-wide cancellation signal.
///
/// Once cancelled it can never be unset; every blocking point in the
/// engine observes it.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Re-check after registering so a cancel between the check
            // and the registration cannot be missed
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// The crawl engine: configuration plus every shared subsystem, ready to
/// run a pool of workers.
pub struct CrawlEngine {
    ctx: Arc<CrawlContext>,
    frontier: Arc<Frontier>,
    artifacts_tx: mpsc::Sender<PageArtifact>,
    seed: CanonicalUrl,
}

impl CrawlEngine {
    /// Build an engine with the default router (HTML link extraction).
    ///
    /// Returns the engine and the artifact stream; artifacts arrive as
    /// pages complete, in no particular order.
    pub async fn new(
        config: CrawlConfig,
    ) -> Result<(Self, mpsc::Receiver<PageArtifact>)> {
        Self::with_parts(config, ContentRouter::with_html_handler(), None, None).await
    }

    /// Build an engine with a custom router, renderer, or event bus.
    pub async fn with_parts(
        config: CrawlConfig,
        router: ContentRouter,
        renderer: Option<Arc<dyn Renderer>>,
        events: Option<Arc<EventBus>>,
    ) -> Result<(Self, mpsc::Receiver<PageArtifact>)> {
        let (ctx, seed) = CrawlContext::build(config, router, renderer, events).await?;
        let ctx = Arc::new(ctx);

        let frontier = Arc::new(Frontier::new(
            strategy::from_config(&ctx.config),
            Arc::clone(&ctx.visited),
            ctx.config.max_queue_size(),
            ctx.config.idle_timeout(),
        ));

        let (artifacts_tx, artifacts_rx) = mpsc::channel(ARTIFACT_CHANNEL_CAPACITY);

        Ok((
            Self {
                ctx,
                frontier,
                artifacts_tx,
                seed,
            },
            artifacts_rx,
        ))
    }

    /// Token that cancels this run; observable by every blocking call.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    /// Run the crawl to completion and return the summary.
    pub async fn run(self) -> Result<RunSummary> {
        let started = Instant::now();
        let ctx = self.ctx;
        let frontier = self.frontier;

        if let Some(bus) = &ctx.events {
            bus.publish(CrawlEvent::crawl_started(
                ctx.config.start_url().to_string(),
                ctx.config.max_depth(),
            ));
        }

        frontier
            .push(FrontierEntry::new(self.seed.clone(), 0, None))
            .await;

        if ctx.config.use_sitemap() {
            seed_from_sitemaps(&ctx, &frontier, &self.seed).await;
        }

        let worker_count = ctx.config.workers();
        info!(
            "starting crawl of {} with {worker_count} worker(s)",
            ctx.config.start_url()
        );

        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            let ctx = Arc::clone(&ctx);
            let frontier = Arc::clone(&frontier);
            let tx = self.artifacts_tx.clone();
            workers.spawn(worker_loop(ctx, frontier, tx, worker_id));
        }
        drop(self.artifacts_tx);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!("worker task failed: {e}");
            }
        }

        let stopped_by = if ctx.cancel.is_cancelled() {
            StopCause::Cancelled
        } else if ctx.budget.exceeded() {
            StopCause::BudgetExceeded
        } else {
            StopCause::FrontierExhausted
        };

        // Budget stops and cancellation leave entries behind; drain them
        // without processing.
        frontier.close().await;

        let summary = RunSummary {
            pages_crawled: ctx.budget.pages_so_far(),
            bytes_fetched: ctx.budget.bytes_so_far(),
            errors_by_kind: ctx.counters.errors_by_kind(),
            skipped_by_robots: ctx.counters.skipped_by_robots.load(Ordering::Relaxed),
            skipped_by_scope: ctx.counters.skipped_by_scope.load(Ordering::Relaxed),
            skipped_fresh: ctx.counters.skipped_fresh.load(Ordering::Relaxed),
            queue_full_drops: ctx.counters.queue_full_drops.load(Ordering::Relaxed),
            duration_seconds: started.elapsed().as_secs_f64(),
            stopped_by,
        };

        if let Some(bus) = &ctx.events {
            bus.publish(CrawlEvent::crawl_completed(
                summary.pages_crawled,
                summary.bytes_fetched,
                summary.duration_seconds,
            ));
            bus.shutdown(match stopped_by {
                StopCause::FrontierExhausted => ShutdownReason::Completed,
                StopCause::BudgetExceeded => ShutdownReason::BudgetExceeded,
                StopCause::Cancelled => ShutdownReason::Cancelled,
            });
        }

        info!(
            "crawl finished: {} pages, {} bytes, {:?} ({:.1}s)",
            summary.pages_crawled, summary.bytes_fetched, stopped_by, summary.duration_seconds
        );

        Ok(summary)
    }
}

/// Seed the frontier from robots.txt-declared and configured sitemaps.
async fn seed_from_sitemaps(ctx: &CrawlContext, frontier: &Frontier, seed: &CanonicalUrl) {
    let mut roots = ctx.robots.sitemaps(seed).await;
    for raw in ctx.config.sitemap_urls() {
        match url::Url::parse(raw) {
            Ok(u) => roots.push(u),
            Err(e) => warn!("ignoring invalid sitemap url '{raw}': {e}"),
        }
    }
    if roots.is_empty() {
        return;
    }

    let entries = sitemap::fetch_url_entries(ctx.fetcher.client(), roots).await;
    let mut pushed = 0usize;
    for (loc, priority) in entries {
        let Ok(normalized) = ctx.normalizer.normalize(loc.as_str(), None) else {
            continue;
        };
        if !ctx.admits(&normalized) {
            continue;
        }
        let entry = FrontierEntry::new(normalized, 0, None)
            .with_priority(priority.unwrap_or(0.5));
        if frontier.push(entry).await == PushOutcome::Queued {
            pushed += 1;
        }
    }
    info!("seeded {pushed} urls from sitemaps");
}

/// One worker: drain the frontier until the run ends.
async fn worker_loop(
    ctx: Arc<CrawlContext>,
    frontier: Arc<Frontier>,
    artifacts: mpsc::Sender<PageArtifact>,
    worker_id: usize,
) {
    debug!("worker {worker_id} started");

    loop {
        if ctx.cancel.is_cancelled() {
            debug!("worker {worker_id}: cancelled");
            break;
        }
        if ctx.budget.exceeded() {
            debug!("worker {worker_id}: budget exceeded");
            break;
        }

        let popped = tokio::select! {
            outcome = frontier.pop() => outcome,
            () = ctx.cancel.cancelled() => break,
        };

        let entry = match popped {
            PopOutcome::Entry(entry) => entry,
            PopOutcome::Idle => {
                if frontier.is_quiescent().await {
                    debug!("worker {worker_id}: frontier quiescent");
                    break;
                }
                continue;
            }
            PopOutcome::Closed => break,
        };

        match worker::process_entry(&ctx, &entry).await {
            Processed::Cancelled => {
                frontier.mark_done().await;
                break;
            }
            Processed::Skipped(kind) => {
                debug!("worker {worker_id}: skipped {} ({kind:?})", entry.url);
                frontier.mark_done().await;
            }
            Processed::Artifact(artifact, discovered) => {
                for link in discovered {
                    if frontier.push(link).await == PushOutcome::QueueFull {
                        ctx.counters
                            .queue_full_drops
                            .fetch_add(1, Ordering::Relaxed);
                    }
                }

                if let Some(bus) = &ctx.events {
                    bus.publish(match &artifact.error {
                        Some(err) => CrawlEvent::page_failed(
                            artifact.url.to_string(),
                            err.kind,
                            err.message.clone(),
                            err.attempts,
                        ),
                        None => CrawlEvent::page_crawled(
                            artifact.url.to_string(),
                            artifact.http_status.unwrap_or_default(),
                            artifact.depth,
                            artifact.content_hash_hex.clone(),
                            artifact.unchanged,
                        ),
                    });
                }

                tokio::select! {
                    sent = artifacts.send(*artifact) => {
                        if sent.is_err() {
                            debug!("artifact receiver dropped");
                        }
                    }
                    () = ctx.cancel.cancelled() => {
                        frontier.mark_done().await;
                        break;
                    }
                }

                frontier.mark_done().await;
            }
        }
    }

    debug!("worker {worker_id} exiting");
}
