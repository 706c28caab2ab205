// Browser Port
//
// Driver-neutral view of a browser: one launcher, shared contexts holding the
// cookie jar, and pages owned by workers. The Chrome adapter lives in
// infra-browser; `mocks::FakeBrowser` backs the tests.

pub mod mocks;

use crate::domain::{OriginStorage, SessionCookie};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Interval between selector probes
pub const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("timed out after {timeout_ms}ms waiting for {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("page or context already closed")]
    Closed,

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl BrowserError {
    pub fn timeout(what: impl Into<String>, timeout: Duration) -> Self {
        BrowserError::Timeout {
            what: what.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }
}

pub type BrowserResult<T> = std::result::Result<T, BrowserError>;

/// Starts isolated browser contexts
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> BrowserResult<Arc<dyn BrowserContext>>;
}

/// One cookie jar shared by many pages
#[async_trait]
pub trait BrowserContext: Send + Sync {
    async fn new_page(&self) -> BrowserResult<Arc<dyn BrowserPage>>;

    async fn cookies(&self) -> BrowserResult<Vec<SessionCookie>>;

    async fn add_cookies(&self, cookies: &[SessionCookie]) -> BrowserResult<()>;

    /// Closes the context and every page still open in it
    async fn close(&self) -> BrowserResult<()>;
}

/// A single tab
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigate and wait for the load, bounded by `timeout`
    async fn goto(&self, url: &str, timeout: Duration) -> BrowserResult<()>;

    async fn current_url(&self) -> BrowserResult<String>;

    async fn title(&self) -> BrowserResult<String>;

    /// Visible text of the document body
    async fn body_text(&self) -> BrowserResult<String>;

    async fn exists(&self, selector: &str) -> BrowserResult<bool>;

    /// Trimmed inner text of the first match
    async fn text_of(&self, selector: &str) -> BrowserResult<Option<String>>;

    async fn attribute(&self, selector: &str, name: &str) -> BrowserResult<Option<String>>;

    /// Clear the input, then type `value`
    async fn fill(&self, selector: &str, value: &str) -> BrowserResult<()>;

    async fn input_value(&self, selector: &str) -> BrowserResult<Option<String>>;

    async fn click(&self, selector: &str) -> BrowserResult<()>;

    /// Submit by pressing Enter inside `selector`
    async fn press_enter(&self, selector: &str) -> BrowserResult<()>;

    async fn evaluate(&self, script: &str) -> BrowserResult<serde_json::Value>;

    /// Local storage of the current origin
    async fn local_storage(&self) -> BrowserResult<OriginStorage>;

    async fn set_local_storage(&self, storage: &OriginStorage) -> BrowserResult<()>;

    async fn close(&self) -> BrowserResult<()>;
}

/// Poll until `selector` matches or `timeout` elapses
pub async fn wait_for_selector(
    page: &dyn BrowserPage,
    selector: &str,
    timeout: Duration,
) -> BrowserResult<()> {
    wait_for_any(page, &[selector], timeout).await.map(|_| ())
}

/// Poll until one of `selectors` matches; returns the first that did
pub async fn wait_for_any<'a>(
    page: &dyn BrowserPage,
    selectors: &[&'a str],
    timeout: Duration,
) -> BrowserResult<&'a str> {
    let deadline = Instant::now() + timeout;
    loop {
        for selector in selectors {
            if page.exists(selector).await? {
                return Ok(selector);
            }
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(BrowserError::timeout(
                format!("selector {}", selectors.join(" | ")),
                timeout,
            ));
        }
        tokio::time::sleep(SELECTOR_POLL_INTERVAL.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::{FakeBrowser, FakePageFixture};
    use super::*;

    #[tokio::test]
    async fn test_wait_for_selector_times_out_with_typed_error() {
        let browser = FakeBrowser::new();
        browser.set_fixture("https://site.test/", FakePageFixture::new("Home"));
        let ctx = browser.launch().await.unwrap();
        let page = ctx.new_page().await.unwrap();
        page.goto("https://site.test/", Duration::from_secs(1)).await.unwrap();

        let err = wait_for_selector(page.as_ref(), "#missing", Duration::from_millis(150))
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::Timeout { timeout_ms: 150, .. }));
    }

    #[tokio::test]
    async fn test_wait_for_any_returns_matching_selector() {
        let browser = FakeBrowser::new();
        browser.set_fixture(
            "https://site.test/",
            FakePageFixture::new("Home").with_selector(".b"),
        );
        let ctx = browser.launch().await.unwrap();
        let page = ctx.new_page().await.unwrap();
        page.goto("https://site.test/", Duration::from_secs(1)).await.unwrap();

        let found = wait_for_any(page.as_ref(), &[".a", ".b"], Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(found, ".b");
    }
}
