// Automated CAPTCHA solver - 2Captcha-compatible HTTP API
//
// submit:  GET {base}/in.php?key=..&method=userrecaptcha&googlekey=..&pageurl=..&json=1
// poll:    GET {base}/res.php?key=..&action=get&id=..&json=1
// The returned token is written into the page's g-recaptcha-response field.

use async_trait::async_trait;
use scrapeflow_core::port::{BrowserPage, CaptchaChallenge, CaptchaError, CaptchaMode, CaptchaSolver};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

const NOT_READY: &str = "CAPCHA_NOT_READY";

/// Error codes that will not go away by retrying
const FATAL_CODES: &[&str] = &[
    "ERROR_WRONG_USER_KEY",
    "ERROR_KEY_DOES_NOT_EXIST",
    "ERROR_ZERO_BALANCE",
    "ERROR_IP_NOT_ALLOWED",
    "IP_BANNED",
];

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: i64,
    request: String,
}

pub struct TwoCaptchaSolver {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    poll_interval: Duration,
}

impl TwoCaptchaSolver {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            timeout,
            poll_interval: Duration::from_secs(5),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn call(&self, path: &str, query: &[(&str, &str)]) -> Result<ApiResponse, CaptchaError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CaptchaError::Rejected(format!("solver request failed: {}", e)))?;
        response
            .json::<ApiResponse>()
            .await
            .map_err(|e| CaptchaError::Rejected(format!("unreadable solver response: {}", e)))
    }

    fn classify(code: &str) -> CaptchaError {
        if FATAL_CODES.contains(&code) {
            CaptchaError::Unavailable(code.to_string())
        } else {
            CaptchaError::Rejected(code.to_string())
        }
    }

    async fn submit(&self, key: &str, site_key: &str, page_url: &str) -> Result<String, CaptchaError> {
        let response = self
            .call(
                "in.php",
                &[
                    ("key", key),
                    ("method", "userrecaptcha"),
                    ("googlekey", site_key),
                    ("pageurl", page_url),
                    ("json", "1"),
                ],
            )
            .await?;
        if response.status != 1 {
            return Err(Self::classify(&response.request));
        }
        Ok(response.request)
    }

    async fn poll(&self, key: &str, request_id: &str, deadline: Instant) -> Result<String, CaptchaError> {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(CaptchaError::Timeout {
                    mode: CaptchaMode::Automated,
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;

            let response = self
                .call(
                    "res.php",
                    &[("key", key), ("action", "get"), ("id", request_id), ("json", "1")],
                )
                .await?;
            if response.status == 1 {
                return Ok(response.request);
            }
            if response.request != NOT_READY {
                return Err(Self::classify(&response.request));
            }
            debug!(request_id, "CAPTCHA not ready yet");
        }
    }
}

/// Script that writes `token` into every reCAPTCHA response field
fn injection_script(token: &str) -> String {
    // serde_json string encoding doubles as JS string escaping
    let literal = serde_json::Value::String(token.to_string()).to_string();
    format!(
        "(() => {{ const t = {literal}; \
         document.querySelectorAll('[name=\"g-recaptcha-response\"], #g-recaptcha-response')\
         .forEach(el => {{ el.style.display = 'block'; el.value = t; el.innerHTML = t; }}); \
         return true; }})()"
    )
}

#[async_trait]
impl CaptchaSolver for TwoCaptchaSolver {
    fn mode(&self) -> CaptchaMode {
        CaptchaMode::Automated
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn solve(
        &self,
        page: &dyn BrowserPage,
        challenge: &CaptchaChallenge,
    ) -> Result<(), CaptchaError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CaptchaError::Unavailable("no solver API key configured".to_string()))?;
        let site_key = challenge
            .site_key
            .as_deref()
            .ok_or_else(|| CaptchaError::Unavailable("challenge exposes no site key".to_string()))?;

        let deadline = Instant::now() + self.timeout;
        let request_id = self.submit(key, site_key, &challenge.page_url).await?;
        info!(request_id = %request_id, url = %challenge.page_url, "CAPTCHA submitted to solver");

        let token = self.poll(key, &request_id, deadline).await?;
        if token.is_empty() {
            return Err(CaptchaError::Rejected("solver returned an empty token".to_string()));
        }
        page.evaluate(&injection_script(&token)).await?;
        info!(request_id = %request_id, "CAPTCHA token injected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use scrapeflow_core::port::browser::mocks::{FakeBrowser, FakePageFixture};
    use scrapeflow_core::port::BrowserLauncher;
    use std::sync::Arc;

    const PAGE: &str = "https://portal.test/login";

    async fn page(browser: &FakeBrowser) -> Arc<dyn BrowserPage> {
        browser.set_fixture(PAGE, FakePageFixture::new("Sign in"));
        let ctx = browser.launch().await.unwrap();
        let page = ctx.new_page().await.unwrap();
        page.goto(PAGE, Duration::from_secs(1)).await.unwrap();
        page
    }

    fn challenge(site_key: Option<&str>) -> CaptchaChallenge {
        CaptchaChallenge {
            page_url: PAGE.to_string(),
            site_key: site_key.map(str::to_string),
            selector: ".g-recaptcha".to_string(),
        }
    }

    fn solver(url: String) -> TwoCaptchaSolver {
        TwoCaptchaSolver::new(url, Some("secret".to_string()), Duration::from_secs(5))
            .with_poll_interval(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_submits_polls_and_injects_token() {
        let mut server = mockito::Server::new_async().await;
        let submit = server
            .mock("GET", "/in.php")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("key".into(), "secret".into()),
                Matcher::UrlEncoded("googlekey".into(), "6Lc-key".into()),
                Matcher::UrlEncoded("pageurl".into(), PAGE.into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":1,"request":"req-9"}"#)
            .create_async()
            .await;
        let ready = server
            .mock("GET", "/res.php")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("action".into(), "get".into()),
                Matcher::UrlEncoded("id".into(), "req-9".into()),
            ]))
            .with_body(r#"{"status":1,"request":"tok\"en"}"#)
            .create_async()
            .await;

        let browser = FakeBrowser::new();
        let page = page(&browser).await;
        solver(server.url())
            .solve(page.as_ref(), &challenge(Some("6Lc-key")))
            .await
            .unwrap();

        submit.assert_async().await;
        ready.assert_async().await;
        let scripts = browser.scripts();
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].contains(r#""tok\"en""#));
        assert!(scripts[0].contains("g-recaptcha-response"));
    }

    #[tokio::test]
    async fn test_missing_site_key_is_unavailable() {
        let browser = FakeBrowser::new();
        let page = page(&browser).await;
        let err = solver("http://127.0.0.1:9".to_string())
            .solve(page.as_ref(), &challenge(None))
            .await
            .unwrap_err();
        assert!(matches!(err, CaptchaError::Unavailable(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_api_key_is_unavailable() {
        let browser = FakeBrowser::new();
        let page = page(&browser).await;
        let solver = TwoCaptchaSolver::new("http://127.0.0.1:9", Some(" ".to_string()), Duration::from_secs(1));
        let err = solver.solve(page.as_ref(), &challenge(Some("k"))).await.unwrap_err();
        assert!(matches!(err, CaptchaError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_zero_balance_is_fatal_and_unsolvable_is_retryable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/in.php")
            .match_query(Matcher::Any)
            .with_body(r#"{"status":0,"request":"ERROR_ZERO_BALANCE"}"#)
            .create_async()
            .await;
        let browser = FakeBrowser::new();
        let page = page(&browser).await;

        let err = solver(server.url())
            .solve(page.as_ref(), &challenge(Some("k")))
            .await
            .unwrap_err();
        assert_eq!(err, CaptchaError::Unavailable("ERROR_ZERO_BALANCE".to_string()));

        server.reset_async().await;
        server
            .mock("GET", "/in.php")
            .match_query(Matcher::Any)
            .with_body(r#"{"status":1,"request":"req-1"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/res.php")
            .match_query(Matcher::Any)
            .with_body(r#"{"status":0,"request":"ERROR_CAPTCHA_UNSOLVABLE"}"#)
            .create_async()
            .await;
        let err = solver(server.url())
            .solve(page.as_ref(), &challenge(Some("k")))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(browser.scripts().is_empty());
    }

    #[tokio::test]
    async fn test_poll_stops_at_timeout() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/in.php")
            .match_query(Matcher::Any)
            .with_body(r#"{"status":1,"request":"req-2"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/res.php")
            .match_query(Matcher::Any)
            .with_body(r#"{"status":0,"request":"CAPCHA_NOT_READY"}"#)
            .create_async()
            .await;
        let browser = FakeBrowser::new();
        let page = page(&browser).await;
        let solver = TwoCaptchaSolver::new(server.url(), Some("secret".to_string()), Duration::from_millis(100))
            .with_poll_interval(Duration::from_millis(20));

        let err = solver.solve(page.as_ref(), &challenge(Some("k"))).await.unwrap_err();
        assert!(matches!(
            err,
            CaptchaError::Timeout { mode: CaptchaMode::Automated, timeout_ms: 100 }
        ));
    }
}
