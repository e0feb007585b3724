//! Robots registry behavior over HTTP: caching, permissive failure
//! handling, crawl-delay, and sitemap extraction.

use std::time::Duration;

use crawlkit::robots::RobotsRegistry;
use crawlkit::urlnorm::Normalizer;

fn registry() -> RobotsRegistry {
    RobotsRegistry::new("testbot/1.0", Duration::from_secs(5), Duration::from_secs(3600))
        .expect("registry builds")
}

#[tokio::test]
async fn rules_are_fetched_once_and_enforced() {
    let mut server = mockito::Server::new_async().await;
    let robots = server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body("User-agent: *\nDisallow: /admin\nCrawl-delay: 2\n")
        .expect(1)
        .create_async()
        .await;

    let registry = registry();
    let normalizer = Normalizer::default();
    let admin = normalizer
        .normalize(&format!("{}/admin/panel", server.url()), None)
        .unwrap();
    let public = normalizer
        .normalize(&format!("{}/index.html", server.url()), None)
        .unwrap();

    assert!(!registry.allowed(&admin).await);
    assert!(registry.allowed(&public).await);
    assert_eq!(
        registry.crawl_delay(&public).await,
        Some(Duration::from_secs(2))
    );

    // All three lookups hit the cache after the first fetch
    robots.assert_async().await;
}

#[tokio::test]
async fn missing_robots_is_permissive() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/robots.txt")
        .with_status(404)
        .create_async()
        .await;

    let registry = registry();
    let url = Normalizer::default()
        .normalize(&format!("{}/anything", server.url()), None)
        .unwrap();
    assert!(registry.allowed(&url).await);
}

#[tokio::test]
async fn server_error_on_robots_is_permissive() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/robots.txt")
        .with_status(500)
        .create_async()
        .await;

    let registry = registry();
    let url = Normalizer::default()
        .normalize(&format!("{}/page", server.url()), None)
        .unwrap();
    assert!(registry.allowed(&url).await);
}

#[tokio::test]
async fn sitemaps_are_extracted() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body(
            "User-agent: *\nDisallow:\nSitemap: http://s.test/sitemap.xml\nSitemap: http://s.test/news.xml\n",
        )
        .create_async()
        .await;

    let registry = registry();
    let url = Normalizer::default()
        .normalize(&format!("{}/", server.url()), None)
        .unwrap();

    let sitemaps = registry.sitemaps(&url).await;
    let locations: Vec<String> = sitemaps.iter().map(ToString::to_string).collect();
    assert_eq!(
        locations,
        ["http://s.test/sitemap.xml", "http://s.test/news.xml"]
    );
}

#[tokio::test]
async fn concurrent_lookups_single_flight_the_fetch() {
    let mut server = mockito::Server::new_async().await;
    let robots = server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body("User-agent: *\nDisallow: /x\n")
        .expect(1)
        .create_async()
        .await;

    let registry = std::sync::Arc::new(registry());
    let url = Normalizer::default()
        .normalize(&format!("{}/x", server.url()), None)
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = std::sync::Arc::clone(&registry);
        let url = url.clone();
        handles.push(tokio::spawn(async move { registry.allowed(&url).await }));
    }
    for handle in handles {
        assert!(!handle.await.unwrap());
    }

    robots.assert_async().await;
}
