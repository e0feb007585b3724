//! sitemaps.org XML parsing.
//!
//! Handles both `<urlset>` documents (URL entries with an optional
//! `<priority>`) and `<sitemapindex>` documents; index files are followed
//! exactly one level deep when fetching.

use log::debug;
use quick_xml::events::Event;
use url::Url;

/// One entry from a sitemap document
#[derive(Debug, Clone, PartialEq)]
pub enum SitemapEntry {
    /// A page URL with its declared priority (0.0–1.0)
    Url { loc: Url, priority: Option<f64> },
    /// A nested sitemap from an index document
    Sitemap(Url),
}

/// Parse a sitemap or sitemap-index body.
///
/// Malformed XML stops parsing at the error point and returns whatever
/// was collected; unknown elements are ignored.
#[must_use]
pub fn parse_sitemap(body: &str) -> Vec<SitemapEntry> {
    let mut reader = quick_xml::Reader::from_str(body);

    let mut entries = Vec::new();

    let mut in_sitemap = false;
    let mut in_url = false;
    let mut in_loc = false;
    let mut in_priority = false;

    let mut current_loc: Option<Url> = None;
    let mut current_priority: Option<f64> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"sitemap" => in_sitemap = true,
                b"url" => in_url = true,
                b"loc" => in_loc = true,
                b"priority" => in_priority = true,
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"sitemap" => in_sitemap = false,
                b"url" => {
                    in_url = false;
                    if let Some(loc) = current_loc.take() {
                        entries.push(SitemapEntry::Url {
                            loc,
                            priority: current_priority.take(),
                        });
                    }
                    current_priority = None;
                }
                b"loc" => in_loc = false,
                b"priority" => in_priority = false,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                let Ok(text) = e.unescape() else { continue };
                let text = text.trim();
                if in_sitemap && in_loc {
                    if let Ok(url) = Url::parse(text) {
                        entries.push(SitemapEntry::Sitemap(url));
                    }
                } else if in_url && in_loc {
                    if let Ok(url) = Url::parse(text) {
                        current_loc = Some(url);
                    }
                } else if in_url && in_priority {
                    current_priority = text.parse::<f64>().ok().filter(|p| p.is_finite());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!("sitemap parse stopped: {e}");
                break;
            }
            _ => {}
        }
    }

    entries
}

/// Fetch `roots` and return the page URLs they declare, following
/// sitemap-index indirection one level.
pub async fn fetch_url_entries(
    client: &reqwest::Client,
    roots: Vec<Url>,
) -> Vec<(Url, Option<f64>)> {
    let mut urls = Vec::new();
    let mut nested: Vec<Url> = Vec::new();

    for sitemap_url in roots {
        collect_entries(client, &sitemap_url, &mut urls, Some(&mut nested)).await;
    }
    // One level of index indirection only
    for sitemap_url in nested {
        collect_entries(client, &sitemap_url, &mut urls, None).await;
    }

    urls
}

async fn collect_entries(
    client: &reqwest::Client,
    sitemap_url: &Url,
    urls: &mut Vec<(Url, Option<f64>)>,
    mut nested: Option<&mut Vec<Url>>,
) {
    let Some(body) = fetch_body(client, sitemap_url).await else {
        return;
    };

    for entry in parse_sitemap(&body) {
        match entry {
            SitemapEntry::Url { loc, priority } => urls.push((loc, priority)),
            SitemapEntry::Sitemap(url) => {
                if let Some(nested) = nested.as_deref_mut() {
                    nested.push(url);
                }
            }
        }
    }
}

async fn fetch_body(client: &reqwest::Client, url: &Url) -> Option<String> {
    match client.get(url.clone()).send().await {
        Ok(response) if response.status().is_success() => response.text().await.ok(),
        Ok(response) => {
            debug!("sitemap {url} returned {}", response.status());
            None
        }
        Err(e) => {
            debug!("sitemap fetch failed for {url}: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_urlset_with_priorities() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url>
                <loc>http://s.test/</loc>
                <priority>1.0</priority>
              </url>
              <url>
                <loc>http://s.test/about</loc>
                <priority>0.5</priority>
              </url>
              <url>
                <loc>http://s.test/no-priority</loc>
              </url>
            </urlset>"#;

        let entries = parse_sitemap(body);
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[0],
            SitemapEntry::Url {
                loc: Url::parse("http://s.test/").unwrap(),
                priority: Some(1.0),
            }
        );
        assert_eq!(
            entries[2],
            SitemapEntry::Url {
                loc: Url::parse("http://s.test/no-priority").unwrap(),
                priority: None,
            }
        );
    }

    #[test]
    fn parses_sitemap_index() {
        let body = r#"<sitemapindex>
            <sitemap><loc>http://s.test/sitemap-a.xml</loc></sitemap>
            <sitemap>
              <loc>
                http://s.test/sitemap-b.xml
              </loc>
            </sitemap>
        </sitemapindex>"#;

        let entries = parse_sitemap(body);
        assert_eq!(
            entries,
            vec![
                SitemapEntry::Sitemap(Url::parse("http://s.test/sitemap-a.xml").unwrap()),
                SitemapEntry::Sitemap(Url::parse("http://s.test/sitemap-b.xml").unwrap()),
            ]
        );
    }

    #[test]
    fn malformed_xml_returns_partial() {
        let body = r"<urlset><url><loc>http://s.test/ok</loc></url><url><loc";
        let entries = parse_sitemap(body);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn garbage_priority_ignored() {
        let body = r"<urlset><url><loc>http://s.test/x</loc><priority>high</priority></url></urlset>";
        let entries = parse_sitemap(body);
        assert_eq!(
            entries,
            vec![SitemapEntry::Url {
                loc: Url::parse("http://s.test/x").unwrap(),
                priority: None,
            }]
        );
    }
}
