//! The distributed-mode worker.
//!
//! Identical pipeline to the in-process engine, except the frontier is a
//! broker client: tasks are consumed from the `tasks` topic, processed
//! through the same scope → robots → pacing → fetch → dedupe steps, and
//! the outcome (including discovered links) is published to `results`.
//! The task is acked only after its result is published, so a worker
//! that dies mid-page loses nothing — the broker redelivers.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use tokio::task::JoinSet;

use crate::config::CrawlConfig;
use crate::engine::CancellationToken;
use crate::engine::worker::{CrawlContext, Processed, process_entry};
use crate::events::EventBus;
use crate::renderer::Renderer;
use crate::router::ContentRouter;

use super::broker::{Broker, Delivery, Topic};
use super::messages::{ResultMessage, TaskMessage};

/// Broker-fed crawl worker.
pub struct CrawlWorker {
    ctx: Arc<CrawlContext>,
    broker: Arc<dyn Broker>,
    /// Exit when the tasks topic stays empty for an idle period instead
    /// of waiting for cancellation. Off for long-lived fleet workers.
    stop_when_idle: bool,
}

impl CrawlWorker {
    pub async fn new(config: CrawlConfig, broker: Arc<dyn Broker>) -> Result<Self> {
        Self::with_parts(config, broker, ContentRouter::with_html_handler(), None, None).await
    }

    pub async fn with_parts(
        config: CrawlConfig,
        broker: Arc<dyn Broker>,
        router: ContentRouter,
        renderer: Option<Arc<dyn Renderer>>,
        events: Option<Arc<EventBus>>,
    ) -> Result<Self> {
        let (ctx, _seed) = CrawlContext::build(config, router, renderer, events).await?;
        Ok(Self {
            ctx: Arc::new(ctx),
            broker,
            stop_when_idle: false,
        })
    }

    /// Make the worker exit once the task topic has drained. Useful for
    /// batch deployments and tests.
    #[must_use]
    pub fn stop_when_idle(mut self) -> Self {
        self.stop_when_idle = true;
        self
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    /// Consume tasks until cancelled (or idle, when configured).
    ///
    /// Up to `max_concurrent_requests` pages are in flight at once; the
    /// per-host rate limiter still serializes within a host.
    pub async fn run(&self) -> Result<()> {
        let max_concurrent = self.ctx.config.max_concurrent_requests();
        let mut in_flight: JoinSet<()> = JoinSet::new();

        info!("crawl worker started (max {max_concurrent} concurrent)");

        loop {
            if self.ctx.cancel.is_cancelled() {
                break;
            }

            while in_flight.len() >= max_concurrent {
                in_flight.join_next().await;
            }

            let delivery = tokio::select! {
                delivery = self
                    .broker
                    .consume(Topic::Tasks, self.ctx.config.idle_timeout()) => delivery?,
                () = self.ctx.cancel.cancelled() => break,
            };

            let Some(delivery) = delivery else {
                if self.stop_when_idle && in_flight.is_empty() {
                    debug!("task topic idle, worker stopping");
                    break;
                }
                continue;
            };

            let task: TaskMessage = match serde_json::from_value(delivery.payload.clone()) {
                Ok(t) => t,
                Err(e) => {
                    warn!("dropping malformed task message: {e}");
                    self.broker.ack(&delivery).await?;
                    continue;
                }
            };

            let ctx = Arc::clone(&self.ctx);
            let broker = Arc::clone(&self.broker);
            in_flight.spawn(async move {
                if let Err(e) = handle_task(&ctx, broker.as_ref(), task, &delivery).await {
                    warn!("task handling failed: {e:#}");
                }
            });
        }

        // Let in-flight pages finish, bounded by their own timeouts
        while in_flight.join_next().await.is_some() {}

        info!("crawl worker stopped");
        Ok(())
    }
}

async fn handle_task(
    ctx: &CrawlContext,
    broker: &dyn Broker,
    task: TaskMessage,
    delivery: &Delivery,
) -> Result<()> {
    let entry = match task.into_entry(&ctx.normalizer) {
        Ok(entry) => entry,
        Err(e) => {
            warn!("dropping invalid task: {e:#}");
            return broker.ack(delivery).await;
        }
    };

    match process_entry(ctx, &entry).await {
        Processed::Artifact(artifact, _discovered) => {
            // The artifact's discovered list already carries the
            // in-scope canonical links; the coordinator decides what to
            // schedule from them.
            let message = ResultMessage::from_artifact(&artifact);
            let payload = serde_json::to_value(&message).context("failed to serialize result")?;
            broker.publish(Topic::Results, payload).await?;
            broker.ack(delivery).await
        }
        Processed::Skipped(kind) => {
            debug!("skipped {} ({kind:?})", entry.url);
            // Publish an empty result so the coordinator can resolve the
            // task instead of waiting for the visibility timeout.
            let message = ResultMessage {
                url: entry.url.to_string(),
                final_url: None,
                http_status: None,
                content_hash_hex: None,
                content_type: None,
                fetched_at: chrono::Utc::now(),
                depth: entry.depth,
                discovered: Vec::new(),
                error: None,
                schema_version: super::messages::SCHEMA_VERSION,
            };
            broker
                .publish(Topic::Results, serde_json::to_value(&message)?)
                .await?;
            broker.ack(delivery).await
        }
        Processed::Cancelled => {
            // Deliberately not acked: the broker will redeliver after
            // the visibility timeout so another worker can finish it.
            Ok(())
        }
    }
}
