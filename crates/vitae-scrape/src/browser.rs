//! Headless Chrome context pool.
//!
//! One lazily launched browser process serves a bounded pool of tabs. A
//! semaphore caps concurrent page loads; when an acquire waits longer than
//! the configured timeout, a fresh unpooled tab is fabricated so the
//! request still proceeds. Navigation and content capture are blocking CDP
//! calls and run on the blocking thread pool.

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use vitae_config::schema::ScraperConfig;
use vitae_core::{Result, VitaeError};

/// A rendered page as handed to the extraction stage.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub html: String,
    pub title: Option<String>,
}

/// The seam between the pipeline and the browser. Tests substitute a
/// deterministic fetcher; production uses [`BrowserPool`].
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

struct PoolInner {
    /// Launched on first use, relaunched if the process died.
    browser: Mutex<Option<Arc<Browser>>>,
    /// Tabs ready for reuse.
    idle: Mutex<Vec<Arc<Tab>>>,
    config: ScraperConfig,
}

/// Bounded pool of browser tabs.
pub struct BrowserPool {
    inner: Arc<PoolInner>,
    semaphore: Arc<Semaphore>,
}

impl BrowserPool {
    pub fn new(config: ScraperConfig) -> Self {
        let permits = config.pool_size.max(1);
        Self {
            inner: Arc::new(PoolInner {
                browser: Mutex::new(None),
                idle: Mutex::new(Vec::new()),
                config,
            }),
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }
}

impl PoolInner {
    fn get_or_launch(&self) -> Result<Arc<Browser>> {
        let mut guard = self.browser.lock();

        if let Some(ref browser) = *guard {
            // Liveness check: the version call fails when the process died.
            if browser.get_version().is_ok() {
                return Ok(Arc::clone(browser));
            }
            warn!("browser process dead, relaunching");
        }

        info!("launching headless Chrome");
        let options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .idle_browser_timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| VitaeError::Scrape(format!("browser launch options: {e}")))?;
        let browser = Browser::new(options).map_err(|e| {
            VitaeError::Scrape(format!(
                "failed to launch Chrome/Chromium: {e}. Ensure Chrome or Chromium is installed."
            ))
        })?;

        let arc = Arc::new(browser);
        *guard = Some(Arc::clone(&arc));
        Ok(arc)
    }

    /// Navigate and capture content on the current (blocking) thread.
    fn fetch_blocking(&self, url: &str, pooled: bool) -> Result<FetchedPage> {
        let browser = self.get_or_launch()?;

        let reused = if pooled { self.idle.lock().pop() } else { None };
        let tab = match reused {
            Some(tab) => tab,
            None => browser
                .new_tab()
                .map_err(|e| VitaeError::Scrape(format!("failed to open tab: {e}")))?,
        };
        tab.set_default_timeout(Duration::from_secs(self.config.page_timeout_secs));
        let _ = tab.set_user_agent(&self.config.user_agent, None, None);

        let outcome = (|| -> Result<FetchedPage> {
            tab.navigate_to(url)
                .map_err(|e| VitaeError::Scrape(format!("navigation failed: {e}")))?;
            tab.wait_until_navigated()
                .map_err(|e| VitaeError::Scrape(format!("page load timed out: {e}")))?;
            let html = tab
                .get_content()
                .map_err(|e| VitaeError::Scrape(format!("content capture failed: {e}")))?;
            let title = tab.get_title().ok().filter(|t| !t.is_empty());
            Ok(FetchedPage { html, title })
        })();

        // The tab goes back on every exit path; unpooled tabs and overflow
        // beyond the pool bound are closed instead.
        if pooled {
            let mut idle = self.idle.lock();
            if idle.len() < self.config.pool_size {
                idle.push(tab);
            } else {
                let _ = tab.close(true);
            }
        } else {
            let _ = tab.close(true);
        }

        outcome
    }
}

#[async_trait]
impl PageFetcher for BrowserPool {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let acquire_timeout = Duration::from_secs(self.inner.config.acquire_timeout_secs);
        let permit = match tokio::time::timeout(
            acquire_timeout,
            Arc::clone(&self.semaphore).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => Some(permit),
            Ok(Err(_)) => None,
            Err(_) => {
                warn!(url, "context pool saturated, fabricating a fresh context");
                None
            }
        };

        let inner = Arc::clone(&self.inner);
        let url = url.to_string();
        tokio::task::spawn_blocking(move || {
            let pooled = permit.is_some();
            // Hold the permit for the whole page load.
            let _permit = permit;
            inner.fetch_blocking(&url, pooled)
        })
        .await
        .map_err(|e| VitaeError::Scrape(format!("fetch task failed: {e}")))?
    }
}
