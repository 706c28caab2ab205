// Chrome page adapter
//
// Reads go through small JS snippets (selector passed as a JSON literal),
// input goes through CDP element handles so real key events fire.

use crate::convert::{protocol_error, script_with_selector};
use async_trait::async_trait;
use chromiumoxide::Page;
use scrapeflow_core::domain::OriginStorage;
use scrapeflow_core::port::{BrowserError, BrowserPage, BrowserResult};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

pub struct ChromePage {
    page: Page,
    closed: AtomicBool,
}

impl ChromePage {
    pub(crate) fn new(page: Page) -> Self {
        Self {
            page,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> BrowserResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrowserError::Closed);
        }
        Ok(())
    }

    async fn eval(&self, script: &str) -> BrowserResult<Value> {
        self.ensure_open()?;
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?;
        // `undefined` has no value
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn eval_string(&self, script: &str) -> BrowserResult<Option<String>> {
        Ok(match self.eval(script).await? {
            Value::String(s) => Some(s),
            _ => None,
        })
    }

    async fn element(&self, selector: &str) -> BrowserResult<chromiumoxide::Element> {
        self.ensure_open()?;
        self.page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::ElementNotFound(selector.to_string()))
    }
}

#[async_trait]
impl BrowserPage for ChromePage {
    async fn goto(&self, url: &str, timeout: Duration) -> BrowserResult<()> {
        self.ensure_open()?;
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {
                debug!(url, "Navigated");
                Ok(())
            }
            Ok(Err(e)) => Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(BrowserError::timeout(format!("navigation to {}", url), timeout)),
        }
    }

    async fn current_url(&self) -> BrowserResult<String> {
        self.ensure_open()?;
        let url = self.page.url().await.map_err(protocol_error)?;
        Ok(url.unwrap_or_default())
    }

    async fn title(&self) -> BrowserResult<String> {
        self.ensure_open()?;
        let title = self.page.get_title().await.map_err(protocol_error)?;
        Ok(title.unwrap_or_default())
    }

    async fn body_text(&self) -> BrowserResult<String> {
        Ok(self
            .eval_string("document.body ? document.body.innerText : ''")
            .await?
            .unwrap_or_default())
    }

    async fn exists(&self, selector: &str) -> BrowserResult<bool> {
        let script = script_with_selector(selector, "return el !== null;")?;
        Ok(matches!(self.eval(&script).await?, Value::Bool(true)))
    }

    async fn text_of(&self, selector: &str) -> BrowserResult<Option<String>> {
        let script = script_with_selector(
            selector,
            "return el ? (el.innerText || el.textContent || '').trim() : null;",
        )?;
        self.eval_string(&script).await
    }

    async fn attribute(&self, selector: &str, name: &str) -> BrowserResult<Option<String>> {
        let name = serde_json::to_string(name).map_err(|e| BrowserError::Script(e.to_string()))?;
        let body = format!("return el ? el.getAttribute({}) : null;", name);
        let script = script_with_selector(selector, &body)?;
        self.eval_string(&script).await
    }

    async fn fill(&self, selector: &str, value: &str) -> BrowserResult<()> {
        let clear = script_with_selector(
            selector,
            "if (!el) return false; el.focus(); el.value = ''; \
             el.dispatchEvent(new Event('input', { bubbles: true })); return true;",
        )?;
        if !matches!(self.eval(&clear).await?, Value::Bool(true)) {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        let element = self.element(selector).await?;
        element
            .click()
            .await
            .map_err(protocol_error)?
            .type_str(value)
            .await
            .map_err(protocol_error)?;
        Ok(())
    }

    async fn input_value(&self, selector: &str) -> BrowserResult<Option<String>> {
        let script = script_with_selector(selector, "return el ? String(el.value ?? '') : null;")?;
        self.eval_string(&script).await
    }

    async fn click(&self, selector: &str) -> BrowserResult<()> {
        let element = self.element(selector).await?;
        element.click().await.map_err(protocol_error)?;
        Ok(())
    }

    async fn press_enter(&self, selector: &str) -> BrowserResult<()> {
        let element = self.element(selector).await?;
        element
            .focus()
            .await
            .map_err(protocol_error)?
            .press_key("Enter")
            .await
            .map_err(protocol_error)?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> BrowserResult<Value> {
        self.eval(script).await
    }

    async fn local_storage(&self) -> BrowserResult<OriginStorage> {
        let value = self
            .eval(
                "(() => { const entries = {}; \
                 for (let i = 0; i < localStorage.length; i++) { \
                   const k = localStorage.key(i); entries[k] = localStorage.getItem(k); } \
                 return { origin: location.origin, entries }; })()",
            )
            .await?;
        serde_json::from_value(value).map_err(|e| BrowserError::Script(e.to_string()))
    }

    async fn set_local_storage(&self, storage: &OriginStorage) -> BrowserResult<()> {
        let payload =
            serde_json::to_string(storage).map_err(|e| BrowserError::Script(e.to_string()))?;
        let script = format!(
            "(() => {{ const s = {}; if (location.origin !== s.origin) return false; \
             for (const [k, v] of Object.entries(s.entries)) localStorage.setItem(k, v); \
             return true; }})()",
            payload
        );
        if !matches!(self.eval(&script).await?, Value::Bool(true)) {
            debug!(origin = %storage.origin, "Local storage skipped, page is on another origin");
        }
        Ok(())
    }

    async fn close(&self) -> BrowserResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.page.clone().close().await.map_err(protocol_error)?;
        Ok(())
    }
}
