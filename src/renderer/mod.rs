//! The rendered-DOM port.
//!
//! Pages that require JavaScript execution are fetched through this
//! narrow interface instead of the plain HTTP client. The engine only
//! depends on the [`Renderer`] trait; the bundled chromium-based
//! implementation lives behind the `browser` cargo feature so the heavy
//! dependency can be compiled out.

use anyhow::Result;
use async_trait::async_trait;

use crate::config::BrowserType;

/// Options for a single render call.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// CSS selector to wait for after load
    pub wait_for_selector: Option<String>,
    /// Extra settle time after navigation, in milliseconds
    pub wait_timeout_ms: Option<u64>,
    pub browser_type: BrowserType,
}

/// A document produced by the renderer.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub final_url: String,
    pub status: u16,
    pub html: String,
    pub headers: Vec<(String, String)>,
}

/// Narrow interface to a headless browser (or anything that can produce
/// a post-JavaScript DOM for a URL).
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &str, options: &RenderOptions) -> Result<RenderedPage>;
}

#[cfg(feature = "browser")]
pub use chromium::ChromiumRenderer;

#[cfg(feature = "browser")]
mod chromium {
    use std::path::PathBuf;
    use std::time::Duration;

    use anyhow::{Context, Result, anyhow};
    use async_trait::async_trait;
    use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
    use futures::StreamExt;
    use log::{debug, error, warn};
    use tokio::task::JoinHandle;

    use super::{RenderOptions, RenderedPage, Renderer};

    /// How often to poll for a wait-for selector
    const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);
    /// Give up waiting for a selector after this long
    const SELECTOR_WAIT_LIMIT: Duration = Duration::from_secs(30);

    /// Renderer backed by a headless Chromium instance over CDP.
    pub struct ChromiumRenderer {
        browser: Browser,
        handler_task: JoinHandle<()>,
        page_timeout: Duration,
    }

    impl ChromiumRenderer {
        /// Launch a headless browser and spawn the task that drives its
        /// CDP connection.
        pub async fn launch(page_timeout: Duration) -> Result<Self> {
            let user_data_dir = std::env::temp_dir()
                .join(format!("crawlkit_chrome_{}", std::process::id()));
            std::fs::create_dir_all(&user_data_dir)
                .context("failed to create browser user data directory")?;

            let mut config_builder = BrowserConfigBuilder::default()
                .request_timeout(Duration::from_secs(30))
                .window_size(1920, 1080)
                .user_data_dir(user_data_dir)
                .headless_mode(HeadlessMode::default())
                .arg("--disable-background-networking")
                .arg("--disable-extensions")
                .arg("--mute-audio")
                .arg("--no-first-run")
                .arg("--no-default-browser-check");

            if let Some(path) = find_executable() {
                config_builder = config_builder.chrome_executable(path);
            }

            let browser_config = config_builder
                .build()
                .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

            let (browser, mut handler) = Browser::launch(browser_config)
                .await
                .context("failed to launch browser")?;

            let handler_task = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if let Err(e) = event {
                        let msg = e.to_string();
                        // chromiumoxide rejects some CDP events it does not
                        // model; those are not actionable
                        if !msg.contains("data did not match any variant") {
                            error!("browser handler error: {e}");
                        }
                    }
                }
                debug!("browser handler task finished");
            });

            Ok(Self {
                browser,
                handler_task,
                page_timeout,
            })
        }

        /// Close the browser and stop the handler task.
        pub async fn shutdown(mut self) {
            if let Err(e) = self.browser.close().await {
                warn!("browser close failed: {e}");
            }
            self.handler_task.abort();
        }
    }

    fn find_executable() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("CHROMIUM_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }
        [
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
    }

    #[async_trait]
    impl Renderer for ChromiumRenderer {
        async fn render(&self, url: &str, options: &RenderOptions) -> Result<RenderedPage> {
            let page = self
                .browser
                .new_page("about:blank")
                .await
                .context("failed to open page")?;

            let result = async {
                tokio::time::timeout(self.page_timeout, page.goto(url))
                    .await
                    .map_err(|_| anyhow!("navigation timeout after {:?}", self.page_timeout))?
                    .context("navigation failed")?;

                tokio::time::timeout(self.page_timeout, page.wait_for_navigation())
                    .await
                    .map_err(|_| anyhow!("page load timeout after {:?}", self.page_timeout))?
                    .context("page load failed")?;

                if let Some(selector) = &options.wait_for_selector {
                    wait_for_selector(&page, selector).await?;
                }
                if let Some(ms) = options.wait_timeout_ms {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                }

                let html = page.content().await.context("failed to read DOM")?;
                let final_url = page
                    .url()
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| url.to_string());

                Ok::<_, anyhow::Error>(RenderedPage {
                    final_url,
                    // CDP does not surface the HTTP status on the happy
                    // path; a completed navigation is treated as 200
                    status: 200,
                    html,
                    headers: Vec::new(),
                })
            }
            .await;

            if let Err(e) = page.close().await {
                debug!("page close failed: {e}");
            }

            result
        }
    }

    async fn wait_for_selector(page: &chromiumoxide::Page, selector: &str) -> Result<()> {
        let deadline = tokio::time::Instant::now() + SELECTOR_WAIT_LIMIT;
        loop {
            if page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(anyhow!("timed out waiting for selector '{selector}'"));
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }
}
