//! Content-type dispatch.
//!
//! Maps HTTP `Content-Type` values to handler implementations so adding
//! support for new media types (JSON feeds, PDF, CSV, …) never touches
//! the engine core. Registration is case-insensitive and ignores `;`
//! parameters. Handlers are the boundary to downstream extractors; the
//! engine only consumes the discovered links they return.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use log::debug;
use scraper::{Html, Selector};

use crate::fetcher::{Body, FetchResult, charset};

/// What a handler produced for one response.
#[derive(Debug, Clone, Default)]
pub struct RoutedContent {
    /// Raw link targets discovered in the document (unresolved)
    pub links: Vec<String>,
    /// Handler-specific extraction output, passed through on the artifact
    pub data: Option<serde_json::Value>,
}

/// A media-type handler.
pub trait ContentHandler: Send + Sync {
    fn handle(&self, result: &FetchResult) -> Result<RoutedContent>;
}

impl<F> ContentHandler for F
where
    F: Fn(&FetchResult) -> Result<RoutedContent> + Send + Sync,
{
    fn handle(&self, result: &FetchResult) -> Result<RoutedContent> {
        self(result)
    }
}

/// Registry of media type → handler.
#[derive(Clone, Default)]
pub struct ContentRouter {
    handlers: HashMap<String, Arc<dyn ContentHandler>>,
    default: Option<Arc<dyn ContentHandler>>,
}

impl ContentRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A router with the built-in HTML link handler wired up.
    #[must_use]
    pub fn with_html_handler() -> Self {
        let mut router = Self::new();
        let html = Arc::new(HtmlLinkHandler);
        router.register("text/html", html.clone());
        router.register("application/xhtml+xml", html);
        router
    }

    /// Register a handler. The lookup key is the media type before any
    /// `;` parameters, lower-cased; registering twice overwrites.
    pub fn register(&mut self, content_type: &str, handler: Arc<dyn ContentHandler>) -> &mut Self {
        self.handlers
            .insert(charset::media_type(content_type), handler);
        self
    }

    /// Set the fallback handler used when no registered type matches.
    pub fn set_default(&mut self, handler: Arc<dyn ContentHandler>) -> &mut Self {
        self.default = Some(handler);
        self
    }

    #[must_use]
    pub fn has_handler(&self, content_type: &str) -> bool {
        self.handlers
            .contains_key(&charset::media_type(content_type))
            || self.default.is_some()
    }

    /// Dispatch to the handler for `content_type`.
    ///
    /// Returns `None` when neither a specific nor a default handler is
    /// registered.
    pub fn route(&self, content_type: &str, result: &FetchResult) -> Option<Result<RoutedContent>> {
        let key = charset::media_type(content_type);
        let handler = self.handlers.get(&key).or(self.default.as_ref());
        match handler {
            Some(h) => Some(h.handle(result)),
            None => {
                debug!("no handler for content type '{key}', skipping");
                None
            }
        }
    }
}

/// Built-in handler extracting `<a href>` targets from HTML bodies.
pub struct HtmlLinkHandler;

impl ContentHandler for HtmlLinkHandler {
    fn handle(&self, result: &FetchResult) -> Result<RoutedContent> {
        let Body::Text(html) = &result.body else {
            return Ok(RoutedContent::default());
        };

        let document = Html::parse_document(html);
        let selector = Selector::parse("a[href]").expect("anchor selector is valid");

        let links = document
            .select(&selector)
            .filter_map(|el| el.value().attr("href"))
            .map(str::to_string)
            .collect();

        Ok(RoutedContent {
            links,
            data: None,
        })
    }
}
