//! Conditional re-crawl across runs: the second run must present the
//! validators recorded by the first and treat a 304 as unchanged.

use crawlkit::{CrawlConfig, CrawlEngine, StopCause};
use mockito::Matcher;

#[tokio::test]
async fn second_run_sends_validators_and_honors_304() {
    let mut server = mockito::Server::new_async().await;
    let state_dir = tempfile::tempdir().unwrap();

    server
        .mock("GET", "/robots.txt")
        .with_status(404)
        .expect_at_least(1)
        .create_async()
        .await;

    // First run: no validators yet
    let fresh = server
        .mock("GET", "/page")
        .match_header("if-none-match", Matcher::Missing)
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_header("etag", "\"v1\"")
        .with_body("<html><body>version one</body></html>")
        .create_async()
        .await;

    // Second run: validators present, content unchanged
    let revalidated = server
        .mock("GET", "/page")
        .match_header("if-none-match", "\"v1\"")
        .with_status(304)
        .create_async()
        .await;

    let config = |dir: &std::path::Path| {
        CrawlConfig::builder()
            .start_url(format!("{}/page", server.url()))
            .max_depth(0)
            .state_dir(dir)
            .base_delay_secs(0.0)
            .idle_timeout_ms(100)
            .build()
            .unwrap()
    };

    // Run 1
    let (engine, mut artifacts) = CrawlEngine::new(config(state_dir.path())).await.unwrap();
    let crawl = tokio::spawn(engine.run());
    let first = artifacts.recv().await.expect("first artifact");
    while artifacts.recv().await.is_some() {}
    let summary = crawl.await.unwrap().unwrap();

    assert_eq!(first.http_status, Some(200));
    assert!(!first.unchanged);
    assert!(first.content_hash_hex.is_some());
    assert_eq!(summary.stopped_by, StopCause::FrontierExhausted);
    fresh.assert_async().await;

    // Run 2 against the same state directory
    let (engine, mut artifacts) = CrawlEngine::new(config(state_dir.path())).await.unwrap();
    let crawl = tokio::spawn(engine.run());
    let second = artifacts.recv().await.expect("second artifact");
    while artifacts.recv().await.is_some() {}
    crawl.await.unwrap().unwrap();

    assert_eq!(second.http_status, Some(304));
    assert!(second.unchanged, "304 means the stored copy is current");
    assert!(second.body.is_none(), "no body is re-read on a 304");
    revalidated.assert_async().await;
}

#[tokio::test]
async fn fresh_pages_are_skipped_within_max_age() {
    let mut server = mockito::Server::new_async().await;
    let state_dir = tempfile::tempdir().unwrap();

    server
        .mock("GET", "/robots.txt")
        .with_status(404)
        .expect_at_least(1)
        .create_async()
        .await;
    let page = server
        .mock("GET", "/page")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html>stable</html>")
        .expect(1)
        .create_async()
        .await;

    let config = || {
        CrawlConfig::builder()
            .start_url(format!("{}/page", server.url()))
            .max_depth(0)
            .state_dir(state_dir.path())
            .incremental_max_age_secs(3600)
            .base_delay_secs(0.0)
            .idle_timeout_ms(100)
            .build()
            .unwrap()
    };

    // First run fetches
    let (engine, mut artifacts) = CrawlEngine::new(config()).await.unwrap();
    let crawl = tokio::spawn(engine.run());
    while artifacts.recv().await.is_some() {}
    crawl.await.unwrap().unwrap();

    // Second run inside the freshness window: no request at all
    let (engine, mut artifacts) = CrawlEngine::new(config()).await.unwrap();
    let crawl = tokio::spawn(engine.run());
    let mut second_run_artifacts = 0;
    while artifacts.recv().await.is_some() {
        second_run_artifacts += 1;
    }
    let summary = crawl.await.unwrap().unwrap();

    assert_eq!(second_run_artifacts, 0);
    assert_eq!(summary.skipped_fresh, 1);
    page.assert_async().await;
}
