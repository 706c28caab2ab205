// Chrome launcher and context
//
// Every launch starts a fresh browser process with a throwaway profile, so a
// context is one isolated cookie jar. Pages opened from it share that jar.

use crate::convert::{cookie_from_cdp, cookie_to_cdp, protocol_error};
use crate::page::ChromePage;
use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use scrapeflow_core::domain::SessionCookie;
use scrapeflow_core::port::{
    BrowserContext, BrowserError, BrowserLauncher, BrowserPage, BrowserResult,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ChromeConfig {
    pub headless: bool,
    /// Chrome/Chromium binary; auto-detected when None
    pub executable: Option<PathBuf>,
    /// Upper bound for a single CDP request
    pub request_timeout: Duration,
    pub window_width: u32,
    pub window_height: u32,
    pub extra_args: Vec<String>,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            request_timeout: Duration::from_secs(30),
            window_width: 1366,
            window_height: 900,
            extra_args: Vec::new(),
        }
    }
}

pub struct ChromeLauncher {
    config: ChromeConfig,
}

impl ChromeLauncher {
    pub fn new(config: ChromeConfig) -> Self {
        Self { config }
    }

    fn browser_config(&self) -> BrowserResult<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .window_size(self.config.window_width, self.config.window_height)
            .request_timeout(self.config.request_timeout);

        // chromiumoxide defaults to headless
        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.config.executable {
            builder = builder.chrome_executable(path);
        }

        builder = builder
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run");
        for arg in &self.config.extra_args {
            builder = builder.arg(arg);
        }

        builder
            .build()
            .map_err(|e| BrowserError::LaunchFailed(format!("invalid browser config: {}", e)))
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> BrowserResult<Arc<dyn BrowserContext>> {
        let config = self.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        // The CDP connection only makes progress while the handler is polled
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser event error");
                }
            }
            debug!("browser event handler exited");
        });

        info!(headless = self.config.headless, "Browser launched");
        Ok(Arc::new(ChromeContext {
            browser: Mutex::new(Some(browser)),
            events,
        }))
    }
}

pub struct ChromeContext {
    browser: Mutex<Option<Browser>>,
    events: JoinHandle<()>,
}

#[async_trait]
impl BrowserContext for ChromeContext {
    async fn new_page(&self) -> BrowserResult<Arc<dyn BrowserPage>> {
        let guard = self.browser.lock().await;
        let browser = guard.as_ref().ok_or(BrowserError::Closed)?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(protocol_error)?;
        Ok(Arc::new(ChromePage::new(page)))
    }

    async fn cookies(&self) -> BrowserResult<Vec<SessionCookie>> {
        let guard = self.browser.lock().await;
        let browser = guard.as_ref().ok_or(BrowserError::Closed)?;
        let cookies = browser.get_cookies().await.map_err(protocol_error)?;
        Ok(cookies.into_iter().map(cookie_from_cdp).collect())
    }

    async fn add_cookies(&self, cookies: &[SessionCookie]) -> BrowserResult<()> {
        if cookies.is_empty() {
            return Ok(());
        }
        let params = cookies
            .iter()
            .map(cookie_to_cdp)
            .collect::<BrowserResult<Vec<_>>>()?;
        let guard = self.browser.lock().await;
        let browser = guard.as_ref().ok_or(BrowserError::Closed)?;
        browser.set_cookies(params).await.map_err(protocol_error)?;
        Ok(())
    }

    async fn close(&self) -> BrowserResult<()> {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Ok(());
        };
        if let Err(e) = browser.close().await {
            warn!(error = %e, "Browser did not close cleanly");
        }
        if let Err(e) = browser.wait().await {
            warn!(error = %e, "Browser process wait failed");
        }
        self.events.abort();
        info!("Browser closed");
        Ok(())
    }
}

impl Drop for ChromeContext {
    fn drop(&mut self) {
        self.events.abort();
    }
}
