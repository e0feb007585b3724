//! The distributed-mode coordinator.
//!
//! A single coordinator owns the global visited set and the budget. It
//! publishes the seed onto `tasks`, consumes `results`, and feeds every
//! newly discovered in-scope URL back into `tasks`. At-least-once
//! delivery from the broker is made idempotent here: a URL is published
//! at most once, and duplicate result deliveries are acked and dropped.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};

use crate::budget::BudgetTracker;
use crate::config::CrawlConfig;
use crate::engine::{CancellationToken, RunSummary, StopCause};
use crate::frontier::{FrontierEntry, VisitedSet};
use crate::urlnorm::{CanonicalUrl, Normalizer, Scope};

use super::broker::{Broker, Topic};
use super::messages::{ResultMessage, TaskMessage};

/// Coordinates a fleet of [`CrawlWorker`](super::CrawlWorker)s through a
/// broker.
pub struct Coordinator {
    broker: Arc<dyn Broker>,
    config: CrawlConfig,
    normalizer: Normalizer,
    scope: Scope,
    seed: CanonicalUrl,
    visited: VisitedSet,
    budget: BudgetTracker,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new(config: CrawlConfig, broker: Arc<dyn Broker>) -> Result<Self> {
        let normalizer = Normalizer::with_ignored_extensions(config.ignored_extensions());
        let seed = normalizer
            .normalize(config.start_url(), None)
            .map_err(|e| anyhow!("start_url rejected: {e}"))?;
        let scope = Scope::from_seed(&seed, config.same_host_only(), config.same_path_only());
        let budget = BudgetTracker::from_config(&config);

        Ok(Self {
            broker,
            config,
            normalizer,
            scope,
            seed,
            visited: VisitedSet::new(),
            budget,
            cancel: CancellationToken::new(),
        })
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Publish a task, marking the URL visited so it can never be
    /// scheduled twice.
    async fn publish_task(&self, entry: &FrontierEntry) -> Result<()> {
        let payload = serde_json::to_value(TaskMessage::from_entry(entry))
            .context("failed to serialize task")?;
        self.broker.publish(Topic::Tasks, payload).await
    }

    /// Run the coordination loop until the crawl quiesces, the budget
    /// trips, or cancellation is requested.
    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();

        // URLs published and not yet resolved by a result
        let mut outstanding: HashSet<String> = HashSet::new();
        // The wire format carries an error message, not a kind; per-kind
        // accounting lives in the workers' own summaries.
        let mut failed_pages = 0u64;

        self.visited.insert(&self.seed);
        outstanding.insert(self.seed.as_str().to_string());
        self.publish_task(&FrontierEntry::new(self.seed.clone(), 0, None))
            .await?;

        info!("coordinator started for {}", self.config.start_url());

        let stopped_by = loop {
            if self.cancel.is_cancelled() {
                break StopCause::Cancelled;
            }
            if self.budget.exceeded() {
                break StopCause::BudgetExceeded;
            }

            let delivery = tokio::select! {
                delivery = self.broker.consume(Topic::Results, self.config.idle_timeout()) => delivery?,
                () = self.cancel.cancelled() => break StopCause::Cancelled,
            };

            let Some(delivery) = delivery else {
                if outstanding.is_empty() {
                    break StopCause::FrontierExhausted;
                }
                continue;
            };

            let result: ResultMessage = match serde_json::from_value(delivery.payload.clone()) {
                Ok(r) => r,
                Err(e) => {
                    warn!("dropping malformed result message: {e}");
                    self.broker.ack(&delivery).await?;
                    continue;
                }
            };
            if let Err(e) = result.validate() {
                warn!("dropping result: {e}");
                self.broker.ack(&delivery).await?;
                continue;
            }

            self.broker.ack(&delivery).await?;

            // At-least-once: a redelivered result for an already-resolved
            // URL is dropped here.
            if !outstanding.remove(&result.url) {
                debug!("duplicate result for {}, ignoring", result.url);
                continue;
            }

            if let Some(message) = &result.error {
                debug!("worker reported failure for {}: {message}", result.url);
                failed_pages += 1;
            }
            self.budget.record(1, 0);

            let next_depth = result.depth + 1;
            if next_depth > self.config.max_depth() {
                continue;
            }

            for raw in &result.discovered {
                let Ok(url) = self.normalizer.normalize(raw, None) else {
                    continue;
                };
                if !self.scope.contains(&url) {
                    continue;
                }
                // Global dedup: insert reports prior presence
                if self.visited.insert(&url) {
                    continue;
                }
                let entry = FrontierEntry::new(url.clone(), next_depth, None);
                if let Err(e) = self.publish_task(&entry).await {
                    warn!("failed to publish task for {url}: {e:#}");
                    self.visited.remove(&url);
                    continue;
                }
                outstanding.insert(url.as_str().to_string());
            }
        };

        info!(
            "coordinator finished: {} pages ({} failed), {:?}",
            self.budget.pages_so_far(),
            failed_pages,
            stopped_by
        );

        Ok(RunSummary {
            pages_crawled: self.budget.pages_so_far(),
            bytes_fetched: 0,
            errors_by_kind: HashMap::new(),
            skipped_by_robots: 0,
            skipped_by_scope: 0,
            skipped_fresh: 0,
            queue_full_drops: 0,
            duration_seconds: started.elapsed().as_secs_f64(),
            stopped_by,
        })
    }
}
