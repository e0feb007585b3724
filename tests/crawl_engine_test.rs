//! End-to-end crawl scenarios against a mock site: scope filtering,
//! robots compliance, duplicate content, budget cutoff, depth limits,
//! and cancellation.

mod common;

use crawlkit::{CrawlConfig, CrawlEngine, PageArtifact, RunSummary, StopCause};

use common::page_with_links;

async fn run_crawl(config: CrawlConfig) -> (Vec<PageArtifact>, RunSummary) {
    let (engine, mut artifacts) = CrawlEngine::new(config).await.expect("engine builds");
    let crawl = tokio::spawn(engine.run());

    let mut collected = Vec::new();
    while let Some(artifact) = artifacts.recv().await {
        collected.push(artifact);
    }
    let summary = crawl.await.expect("task joins").expect("run succeeds");
    (collected, summary)
}

fn config_for(server: &mockito::Server) -> CrawlConfig {
    CrawlConfig::builder()
        .start_url(format!("{}/", server.url()))
        .base_delay_secs(0.0)
        .idle_timeout_ms(100)
        .build()
        .expect("config builds")
}

#[tokio::test]
async fn basic_crawl_fetches_in_scope_pages_only() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/robots.txt")
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(page_with_links(
            "root",
            &["/a", "/b", "http://elsewhere.invalid/x"],
        ))
        .create_async()
        .await;
    server
        .mock("GET", "/a")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(page_with_links("a", &[]))
        .create_async()
        .await;
    server
        .mock("GET", "/b")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(page_with_links("b", &[]))
        .create_async()
        .await;

    let config = CrawlConfig::builder()
        .start_url(format!("{}/", server.url()))
        .max_depth(1)
        .same_host_only(true)
        .base_delay_secs(0.0)
        .idle_timeout_ms(100)
        .build()
        .unwrap();

    let (artifacts, summary) = run_crawl(config).await;

    let successes: Vec<_> = artifacts.iter().filter(|a| a.is_success()).collect();
    assert_eq!(successes.len(), 3, "expected /, /a, /b: {artifacts:?}");
    assert_eq!(summary.skipped_by_scope, 1);
    assert_eq!(summary.stopped_by, StopCause::FrontierExhausted);
    assert_eq!(summary.pages_crawled, 3);
}

#[tokio::test]
async fn robots_disallowed_paths_are_skipped_and_counted() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body("User-agent: *\nDisallow: /private/\n")
        .create_async()
        .await;
    server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(page_with_links("root", &["/public", "/private/x"]))
        .create_async()
        .await;
    server
        .mock("GET", "/public")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(page_with_links("public", &[]))
        .create_async()
        .await;
    let private = server
        .mock("GET", "/private/x")
        .with_status(200)
        .expect(0)
        .create_async()
        .await;

    let (artifacts, summary) = run_crawl(config_for(&server)).await;

    assert_eq!(summary.skipped_by_robots, 1);
    assert!(artifacts.iter().all(|a| !a.url.as_str().contains("/private/")));
    private.assert_async().await;
}

#[tokio::test]
async fn duplicate_content_first_writer_wins() {
    let mut server = mockito::Server::new_async().await;
    let same_body = "<html><body>identical twins</body></html>";
    server
        .mock("GET", "/robots.txt")
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(page_with_links("root", &["/a", "/b"]))
        .create_async()
        .await;
    for path in ["/a", "/b"] {
        server
            .mock("GET", path)
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(same_body)
            .create_async()
            .await;
    }

    // One worker so /a deterministically completes before /b
    let (artifacts, _) = run_crawl(config_for(&server)).await;

    let a = artifacts
        .iter()
        .find(|a| a.url.as_str().ends_with("/a"))
        .unwrap();
    let b = artifacts
        .iter()
        .find(|a| a.url.as_str().ends_with("/b"))
        .unwrap();

    assert_eq!(a.content_hash_hex, b.content_hash_hex);
    assert!(!a.unchanged, "first body is new");
    assert!(b.unchanged, "second identical body is a duplicate");
}

#[tokio::test]
async fn budget_stops_the_crawl_early() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/robots.txt")
        .with_status(404)
        .create_async()
        .await;

    let links: Vec<String> = (0..10).map(|i| format!("/page{i}")).collect();
    let link_refs: Vec<&str> = links.iter().map(String::as_str).collect();
    server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(page_with_links("root", &link_refs))
        .create_async()
        .await;
    for link in &links {
        server
            .mock("GET", link.as_str())
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(page_with_links("leaf", &[]))
            .create_async()
            .await;
    }

    let config = CrawlConfig::builder()
        .start_url(format!("{}/", server.url()))
        .max_pages(2)
        .base_delay_secs(0.0)
        .idle_timeout_ms(100)
        .build()
        .unwrap();

    let (artifacts, summary) = run_crawl(config).await;

    assert_eq!(summary.stopped_by, StopCause::BudgetExceeded);
    assert_eq!(summary.pages_crawled, 2);
    assert_eq!(artifacts.iter().filter(|a| a.is_success()).count(), 2);
}

#[tokio::test]
async fn links_at_max_depth_are_not_enqueued() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/robots.txt")
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(page_with_links("root", &["/a"]))
        .create_async()
        .await;
    server
        .mock("GET", "/a")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(page_with_links("a", &["/b"]))
        .create_async()
        .await;
    let too_deep = server
        .mock("GET", "/b")
        .with_status(200)
        .expect(0)
        .create_async()
        .await;

    let config = CrawlConfig::builder()
        .start_url(format!("{}/", server.url()))
        .max_depth(1)
        .base_delay_secs(0.0)
        .idle_timeout_ms(100)
        .build()
        .unwrap();

    let (artifacts, _) = run_crawl(config).await;

    // The page at the depth limit is fetched; its discoveries are not
    assert!(artifacts.iter().any(|a| a.url.as_str().ends_with("/a")));
    too_deep.assert_async().await;
}

#[tokio::test]
async fn cancellation_stops_new_fetches() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/robots.txt")
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(page_with_links("root", &["/a", "/b", "/c"]))
        .create_async()
        .await;

    let (engine, mut artifacts) = CrawlEngine::new(config_for(&server))
        .await
        .expect("engine builds");
    let cancel = engine.cancellation_token();
    cancel.cancel();

    let crawl = tokio::spawn(engine.run());
    while artifacts.recv().await.is_some() {}
    let summary = crawl.await.unwrap().unwrap();

    assert_eq!(summary.stopped_by, StopCause::Cancelled);
    assert_eq!(summary.pages_crawled, 0);
}

#[tokio::test]
async fn error_artifacts_carry_kind_and_attempts() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/robots.txt")
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(page_with_links("root", &["/gone"]))
        .create_async()
        .await;
    server
        .mock("GET", "/gone")
        .with_status(404)
        .create_async()
        .await;

    let (artifacts, summary) = run_crawl(config_for(&server)).await;

    let failed = artifacts
        .iter()
        .find(|a| a.url.as_str().ends_with("/gone"))
        .expect("failure artifact emitted");
    let error = failed.error.as_ref().expect("carries error");
    assert_eq!(error.attempts, 1);
    assert_eq!(failed.http_status, Some(404));
    assert_eq!(summary.errors_by_kind.len(), 1);
}
