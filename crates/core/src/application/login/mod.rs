// LoginHandler - form login protocol
//
// NOT_LOGGED_IN -> NAVIGATING -> FORM_READY -> (CAPTCHA_PENDING)? -> SUBMITTING
//   -> LOGGED_IN | FAILED
//
// `login` never returns an error: every exit is a `LoginOutcome`.

mod config;

pub use config::{FailurePhrases, LoginConfig};

use crate::application::captcha::CaptchaHandler;
use crate::domain::{Credentials, LoginFailureKind, LoginOutcome, LoginState, LogLevel};
use crate::port::{wait_for_selector, BrowserError, BrowserPage, BrowserResult, ExecutionLog, ScrapeError};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct LoginHandler {
    config: LoginConfig,
    captcha: Arc<CaptchaHandler>,
}

impl LoginHandler {
    pub fn new(config: LoginConfig, captcha: Arc<CaptchaHandler>) -> Self {
        Self { config, captcha }
    }

    pub fn config(&self) -> &LoginConfig {
        &self.config
    }

    /// Off the login path and showing a logged-in marker
    pub async fn is_logged_in(&self, page: &dyn BrowserPage) -> bool {
        match self.probe_logged_in(page).await {
            Ok(logged_in) => logged_in,
            Err(e) => {
                debug!(error = %e, "Logged-in probe failed, assuming logged out");
                false
            }
        }
    }

    async fn probe_logged_in(&self, page: &dyn BrowserPage) -> BrowserResult<bool> {
        let url = page.current_url().await?;
        if url.contains(&self.config.login_path) {
            return Ok(false);
        }
        self.has_logged_in_marker(page).await
    }

    async fn has_logged_in_marker(&self, page: &dyn BrowserPage) -> BrowserResult<bool> {
        for selector in &self.config.logged_in_selectors {
            if page.exists(selector).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Load the login page, retrying while the title is not the expected one
    pub async fn navigate_to_login_page(&self, page: &dyn BrowserPage) -> Result<(), ScrapeError> {
        let attempts = self.config.navigation_attempts.max(1);
        let expected = self.config.expected_title.to_lowercase();
        let mut last_error = None;

        for attempt in 1..=attempts {
            match page
                .goto(&self.config.login_url, self.config.navigation_timeout())
                .await
            {
                Ok(()) => {
                    let title = page.title().await?;
                    if title.to_lowercase().contains(&expected) {
                        debug!(attempt = attempt, "Login page loaded");
                        return Ok(());
                    }
                    warn!(attempt = attempt, title = %title, "Unexpected login page title");
                    last_error = Some(BrowserError::Navigation {
                        url: self.config.login_url.clone(),
                        reason: format!("unexpected page title '{}'", title),
                    });
                }
                Err(e) => {
                    warn!(attempt = attempt, error = %e, "Login page navigation failed");
                    last_error = Some(e);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.navigation_backoff()).await;
            }
        }

        Err(last_error
            .unwrap_or_else(|| BrowserError::Navigation {
                url: self.config.login_url.clone(),
                reason: "no attempt made".to_string(),
            })
            .into())
    }

    /// Wait for the username, password and submit elements
    pub async fn wait_for_login_page_load(&self, page: &dyn BrowserPage) -> Result<(), ScrapeError> {
        for selector in [
            &self.config.username_selector,
            &self.config.password_selector,
            &self.config.submit_selector,
        ] {
            wait_for_selector(page, selector, self.config.form_timeout())
                .await
                .map_err(|e| ScrapeError::Login {
                    message: format!("login form did not load, markup may have changed: {}", e),
                    requires_captcha: false,
                })?;
        }
        Ok(())
    }

    /// Structural check of the four form elements, naming every missing one
    pub async fn validate_login_form(&self, page: &dyn BrowserPage) -> Result<(), ScrapeError> {
        let required = [
            ("form", &self.config.form_selector),
            ("username", &self.config.username_selector),
            ("password", &self.config.password_selector),
            ("submit", &self.config.submit_selector),
        ];
        let mut missing = Vec::new();
        for (label, selector) in required {
            if !page.exists(selector).await? {
                missing.push(format!("{} ({})", label, selector));
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ScrapeError::Login {
                message: format!("login form incomplete, missing {}", missing.join(", ")),
                requires_captcha: false,
            })
        }
    }

    /// Fill both fields and read them back
    pub async fn fill_login_form(
        &self,
        page: &dyn BrowserPage,
        credentials: &Credentials,
    ) -> Result<(), ScrapeError> {
        let fields = [
            ("username", &self.config.username_selector, &credentials.username),
            ("password", &self.config.password_selector, &credentials.password),
        ];
        for (label, selector, value) in fields {
            page.fill(selector, value).await?;
            let stored = page.input_value(selector).await?;
            if stored.as_deref() != Some(value.as_str()) {
                return Err(ScrapeError::Login {
                    message: format!("{} field did not keep its value", label),
                    requires_captcha: false,
                });
            }
        }
        debug!(
            username = %credentials.username,
            password_len = credentials.password.len(),
            "Login form filled"
        );
        Ok(())
    }

    /// Click submit (Enter in the password field if there is none), then settle
    pub async fn submit_login_form(&self, page: &dyn BrowserPage) -> Result<(), ScrapeError> {
        if page.exists(&self.config.submit_selector).await? {
            page.click(&self.config.submit_selector).await?;
        } else {
            debug!("No submit element, pressing Enter");
            page.press_enter(&self.config.password_selector).await?;
        }
        tokio::time::sleep(self.config.settle()).await;
        Ok(())
    }

    /// Classify the page after submit; first matching rule wins
    pub async fn wait_for_login_result(&self, page: &dyn BrowserPage) -> LoginOutcome {
        match self.classify_result(page).await {
            Ok(outcome) => outcome,
            Err(e) => LoginOutcome::fatal(
                LoginFailureKind::Internal,
                format!("could not inspect page after submit: {}", e),
            ),
        }
    }

    async fn classify_result(&self, page: &dyn BrowserPage) -> BrowserResult<LoginOutcome> {
        let body = page.body_text().await?;

        if self.config.mentions_anti_automation(&body) {
            return Ok(LoginOutcome::fatal(
                LoginFailureKind::AntiAutomation,
                "site showed an anti-automation page",
            ));
        }

        if let Some(challenge) = self.captcha.detect(page).await? {
            return Ok(LoginOutcome::captcha_required(format!(
                "CAPTCHA shown after submit ({})",
                challenge.selector
            )));
        }

        for selector in &self.config.error_selectors {
            if let Some(text) = page.text_of(selector).await? {
                if !text.is_empty() {
                    let kind = self
                        .config
                        .classify(&text)
                        .unwrap_or(LoginFailureKind::InvalidCredentials);
                    return Ok(LoginOutcome::fatal(kind, text));
                }
            }
        }

        let url = page.current_url().await?;
        if !url.contains(&self.config.login_path) && self.probe_logged_in(page).await? {
            return Ok(LoginOutcome::success());
        }

        if self.has_logged_in_marker(page).await? {
            return Ok(LoginOutcome::success());
        }

        if let Some(kind) = self.config.classify(&body) {
            return Ok(LoginOutcome::fatal(kind, format!("login rejected ({:?})", kind)));
        }

        let title = page.title().await.unwrap_or_default();
        error!(
            url = %url,
            title = %title,
            "Login result indeterminate: no detection rule matched, rules may be stale"
        );
        Ok(LoginOutcome::fatal(
            LoginFailureKind::Indeterminate,
            format!("could not determine login result at {} ('{}')", url, title),
        ))
    }

    /// Full protocol; never errors
    pub async fn login(
        &self,
        page: &dyn BrowserPage,
        credentials: &Credentials,
        logger: &dyn ExecutionLog,
    ) -> LoginOutcome {
        logger
            .log(
                LogLevel::Info,
                "Logging in",
                Some(json!({ "username": credentials.username, "loginUrl": self.config.login_url })),
            )
            .await;

        let outcome = self.run_protocol(page, credentials).await;

        if outcome.success {
            transition(LoginState::LoggedIn);
            logger.info("Login succeeded").await;
        } else {
            transition(LoginState::Failed);
            logger
                .log(
                    LogLevel::Error,
                    &format!("Login failed: {}", outcome.error_message()),
                    Some(json!({
                        "kind": outcome.failure_kind,
                        "requiresCaptcha": outcome.requires_captcha,
                        "retryable": outcome.retryable,
                    })),
                )
                .await;
        }
        outcome
    }

    async fn run_protocol(&self, page: &dyn BrowserPage, credentials: &Credentials) -> LoginOutcome {
        if self.is_logged_in(page).await {
            info!("Already logged in");
            return LoginOutcome::success();
        }

        transition(LoginState::Navigating);
        if let Err(e) = self.navigate_to_login_page(page).await {
            return LoginOutcome::fatal(LoginFailureKind::Navigation, e.to_string());
        }
        if let Err(e) = self.wait_for_login_page_load(page).await {
            return LoginOutcome::fatal(LoginFailureKind::MarkupDrift, e.to_string());
        }
        if let Err(e) = self.validate_login_form(page).await {
            return LoginOutcome::fatal(LoginFailureKind::MarkupDrift, e.to_string());
        }
        transition(LoginState::FormReady);

        if let Err(outcome) = self.clear_captcha(page).await {
            return outcome;
        }

        let mut cycles = 0;
        loop {
            if let Err(e) = self.fill_login_form(page, credentials).await {
                return LoginOutcome::fatal(LoginFailureKind::MarkupDrift, e.to_string());
            }
            transition(LoginState::Submitting);
            if let Err(e) = self.submit_login_form(page).await {
                return LoginOutcome::fatal(LoginFailureKind::Internal, e.to_string());
            }

            let outcome = self.wait_for_login_result(page).await;
            if outcome.requires_captcha && outcome.retryable && cycles < self.config.max_captcha_cycles {
                cycles += 1;
                info!(cycle = cycles, "CAPTCHA reappeared after submit, solving again");
                if let Err(outcome) = self.clear_captcha(page).await {
                    return outcome;
                }
                continue;
            }
            return outcome;
        }
    }

    async fn clear_captcha(&self, page: &dyn BrowserPage) -> Result<(), LoginOutcome> {
        match self.captcha.detect(page).await {
            Ok(None) => Ok(()),
            Ok(Some(_)) => {
                transition(LoginState::CaptchaPending);
                self.captcha.solve(page).await.map_err(|e| {
                    LoginOutcome::fatal(LoginFailureKind::Captcha, format!("CAPTCHA not solved: {}", e))
                })
            }
            Err(e) => Err(LoginOutcome::fatal(LoginFailureKind::Internal, e.to_string())),
        }
    }
}

fn transition(state: LoginState) {
    debug!(state = %state, "Login state");
}
