// CAPTCHA detection and bounded solving
//
// Detection is selector based. Solving is delegated to a `CaptchaSolver`
// (manual wait or automated service), each call bounded by the solver's own
// timeout and retried up to `max_attempts` times.

use crate::port::{
    BrowserPage, BrowserResult, CaptchaChallenge, CaptchaError, CaptchaMode, CaptchaSolver,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptchaConfig {
    /// Any match means a challenge is showing
    pub selectors: Vec<String>,
    /// Attribute holding the widget site key
    pub site_key_attribute: String,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            selectors: vec![
                ".g-recaptcha".to_string(),
                "iframe[src*='recaptcha']".to_string(),
                ".h-captcha".to_string(),
                "#captcha".to_string(),
            ],
            site_key_attribute: "data-sitekey".to_string(),
            max_attempts: 3,
            retry_delay_ms: 2_000,
        }
    }
}

pub struct CaptchaHandler {
    solver: Arc<dyn CaptchaSolver>,
    config: CaptchaConfig,
}

impl CaptchaHandler {
    pub fn new(solver: Arc<dyn CaptchaSolver>, config: CaptchaConfig) -> Self {
        Self { solver, config }
    }

    pub fn mode(&self) -> CaptchaMode {
        self.solver.mode()
    }

    /// The challenge currently on `page`, if any
    pub async fn detect(&self, page: &dyn BrowserPage) -> BrowserResult<Option<CaptchaChallenge>> {
        for selector in &self.config.selectors {
            if page.exists(selector).await? {
                let site_key = page
                    .attribute(selector, &self.config.site_key_attribute)
                    .await?;
                return Ok(Some(CaptchaChallenge {
                    page_url: page.current_url().await?,
                    site_key,
                    selector: selector.clone(),
                }));
            }
        }
        Ok(None)
    }

    /// Solve until the page shows no challenge, within the attempt budget
    pub async fn solve(&self, page: &dyn BrowserPage) -> Result<(), CaptchaError> {
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = CaptchaError::Rejected("no attempt made".to_string());

        for attempt in 1..=attempts {
            let Some(challenge) = self.detect(page).await? else {
                return Ok(());
            };
            info!(
                attempt = attempt,
                max_attempts = attempts,
                mode = %self.solver.mode(),
                selector = %challenge.selector,
                "Solving CAPTCHA"
            );

            let timeout = self.solver.timeout();
            let result = match tokio::time::timeout(timeout, self.solver.solve(page, &challenge)).await
            {
                Ok(result) => result,
                Err(_) => Err(CaptchaError::Timeout {
                    mode: self.solver.mode(),
                    timeout_ms: timeout.as_millis() as u64,
                }),
            };

            match result {
                Ok(()) => {
                    if self.detect(page).await?.is_none() {
                        info!(attempt = attempt, "CAPTCHA cleared");
                        return Ok(());
                    }
                    last_error = CaptchaError::Rejected("challenge still present".to_string());
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => last_error = e,
            }

            warn!(attempt = attempt, error = %last_error, "CAPTCHA attempt failed");
            if attempt < attempts {
                tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
            }
        }
        Err(last_error)
    }
}

/// Waits for a person to solve the challenge in a headed browser
pub struct ManualCaptchaSolver {
    timeout: Duration,
    poll_interval: Duration,
}

impl ManualCaptchaSolver {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[async_trait]
impl CaptchaSolver for ManualCaptchaSolver {
    fn mode(&self) -> CaptchaMode {
        CaptchaMode::Manual
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn solve(
        &self,
        page: &dyn BrowserPage,
        challenge: &CaptchaChallenge,
    ) -> Result<(), CaptchaError> {
        warn!(url = %challenge.page_url, "CAPTCHA needs manual solving in the browser window");
        let deadline = Instant::now() + self.timeout;
        while Instant::now() < deadline {
            if !page.exists(&challenge.selector).await? {
                return Ok(());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        Err(CaptchaError::Timeout {
            mode: CaptchaMode::Manual,
            timeout_ms: self.timeout.as_millis() as u64,
        })
    }
}
