//! Minimal CLI runner: crawl a site and print artifacts as JSON lines.
//!
//! Usage: `crawlkit <start-url> [max-depth]`
//! Tunables beyond that belong in library callers; this binary exists
//! for smoke-testing an engine build against a real site.

use anyhow::{Context, Result, anyhow};
use crawlkit::{CrawlConfig, CrawlEngine, StopCause};
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let start_url = args
        .next()
        .ok_or_else(|| anyhow!("usage: crawlkit <start-url> [max-depth]"))?;
    let max_depth: usize = match args.next() {
        Some(raw) => raw.parse().context("max-depth must be an integer")?,
        None => 2,
    };

    let config = CrawlConfig::builder()
        .start_url(start_url)
        .max_depth(max_depth)
        .workers(4)
        .build()?;

    let (engine, mut artifacts) = CrawlEngine::new(config).await?;
    let cancel = engine.cancellation_token();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, draining");
            cancel.cancel();
        }
    });

    let crawl = tokio::spawn(engine.run());

    while let Some(artifact) = artifacts.recv().await {
        println!("{}", serde_json::to_string(&artifact)?);
    }

    let summary = crawl.await??;
    eprintln!(
        "crawled {} pages ({} bytes) in {:.1}s; robots-skipped {}, scope-skipped {}",
        summary.pages_crawled,
        summary.bytes_fetched,
        summary.duration_seconds,
        summary.skipped_by_robots,
        summary.skipped_by_scope,
    );

    std::process::exit(match summary.stopped_by {
        StopCause::FrontierExhausted => 0,
        StopCause::Cancelled => 2,
        StopCause::BudgetExceeded => {
            if summary.pages_crawled == 0 { 3 } else { 0 }
        }
    });
}
