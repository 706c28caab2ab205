// Login protocol configuration
//
// Everything site specific about a form login: where it lives, which
// selectors make up the form, and which phrases mean what after submit.

use crate::domain::LoginFailureKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Phrases that identify one failure category in the page text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailurePhrases {
    pub kind: LoginFailureKind,
    pub phrases: Vec<String>,
}

impl FailurePhrases {
    fn new(kind: LoginFailureKind, phrases: &[&str]) -> Self {
        Self {
            kind,
            phrases: phrases.iter().map(|p| p.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    pub login_url: String,
    /// Any page that requires a session; used to probe for a restored login
    pub authenticated_url: String,
    /// Substring of the login page path
    pub login_path: String,
    /// Case-insensitive substring expected in the login page title
    pub expected_title: String,

    pub form_selector: String,
    pub username_selector: String,
    pub password_selector: String,
    pub submit_selector: String,
    /// User menu / dashboard markers shown only when logged in
    pub logged_in_selectors: Vec<String>,
    /// Elements carrying an explicit login error message
    pub error_selectors: Vec<String>,

    /// Bot-detection interstitial text, always fatal
    pub anti_automation_phrases: Vec<String>,
    /// Checked in order after the DOM signals
    pub failure_phrases: Vec<FailurePhrases>,

    pub navigation_attempts: u32,
    pub navigation_backoff_ms: u64,
    pub navigation_timeout_ms: u64,
    pub form_timeout_ms: u64,
    /// Fixed wait after submit; some successful logins cause no network change
    pub settle_ms: u64,
    /// CAPTCHA re-solve cycles after a submit brought a new challenge
    pub max_captcha_cycles: u32,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            login_url: "https://portal.example.com/login".to_string(),
            authenticated_url: "https://portal.example.com/dashboard".to_string(),
            login_path: "/login".to_string(),
            expected_title: "sign in".to_string(),
            form_selector: "form".to_string(),
            username_selector: "input[name='username']".to_string(),
            password_selector: "input[type='password']".to_string(),
            submit_selector: "button[type='submit']".to_string(),
            logged_in_selectors: vec![
                ".user-menu".to_string(),
                "[data-testid='dashboard']".to_string(),
                "a[href*='logout']".to_string(),
            ],
            error_selectors: vec![
                ".login-error".to_string(),
                ".alert-danger".to_string(),
                "[role='alert']".to_string(),
            ],
            anti_automation_phrases: vec![
                "unusual traffic".to_string(),
                "verify you are human".to_string(),
                "automated access".to_string(),
                "access denied".to_string(),
            ],
            failure_phrases: vec![
                FailurePhrases::new(
                    LoginFailureKind::InvalidCredentials,
                    &[
                        "invalid username or password",
                        "incorrect password",
                        "wrong password",
                        "invalid credentials",
                    ],
                ),
                FailurePhrases::new(
                    LoginFailureKind::AccountLocked,
                    &["account locked", "account has been suspended", "account disabled"],
                ),
                FailurePhrases::new(
                    LoginFailureKind::RateLimited,
                    &["too many attempts", "try again later", "too many requests"],
                ),
            ],
            navigation_attempts: 3,
            navigation_backoff_ms: 5_000,
            navigation_timeout_ms: 30_000,
            form_timeout_ms: 15_000,
            settle_ms: 3_000,
            max_captcha_cycles: 2,
        }
    }
}

impl LoginConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn navigation_backoff(&self) -> Duration {
        Duration::from_millis(self.navigation_backoff_ms)
    }

    pub fn form_timeout(&self) -> Duration {
        Duration::from_millis(self.form_timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// First failure category whose phrase occurs in `text` (case-insensitive)
    pub fn classify(&self, text: &str) -> Option<LoginFailureKind> {
        let text = text.to_lowercase();
        self.failure_phrases
            .iter()
            .find(|category| {
                category
                    .phrases
                    .iter()
                    .any(|p| text.contains(&p.to_lowercase()))
            })
            .map(|category| category.kind)
    }

    pub fn mentions_anti_automation(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.anti_automation_phrases
            .iter()
            .any(|p| text.contains(&p.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_uses_first_matching_category() {
        let config = LoginConfig::default();
        assert_eq!(
            config.classify("Too many attempts. Please try again later."),
            Some(LoginFailureKind::RateLimited)
        );
        assert_eq!(
            config.classify("Incorrect password for this account"),
            Some(LoginFailureKind::InvalidCredentials)
        );
        assert_eq!(config.classify("Welcome back"), None);
    }
}
