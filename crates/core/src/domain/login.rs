// Login Protocol Domain Types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of the login protocol, as logged by the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoginState {
    NotLoggedIn,
    Navigating,
    FormReady,
    CaptchaPending,
    Submitting,
    LoggedIn,
    Failed,
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoginState::NotLoggedIn => "NOT_LOGGED_IN",
            LoginState::Navigating => "NAVIGATING",
            LoginState::FormReady => "FORM_READY",
            LoginState::CaptchaPending => "CAPTCHA_PENDING",
            LoginState::Submitting => "SUBMITTING",
            LoginState::LoggedIn => "LOGGED_IN",
            LoginState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Why a login attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginFailureKind {
    InvalidCredentials,
    AccountLocked,
    RateLimited,
    /// Site redirected to a bot-detection or verification page
    AntiAutomation,
    Captcha,
    /// Expected form elements missing
    MarkupDrift,
    Navigation,
    /// None of the detection rules matched
    Indeterminate,
    Internal,
}

/// Outcome of `LoginHandler::login`; never an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub requires_captcha: bool,
    pub retryable: bool,
    pub failure_kind: Option<LoginFailureKind>,
}

impl LoginOutcome {
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
            requires_captcha: false,
            retryable: false,
            failure_kind: None,
        }
    }

    pub fn fatal(kind: LoginFailureKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            requires_captcha: kind == LoginFailureKind::Captcha,
            retryable: false,
            failure_kind: Some(kind),
        }
    }

    /// A fresh CAPTCHA showed up after submit
    pub fn captcha_required(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            requires_captcha: true,
            retryable: true,
            failure_kind: Some(LoginFailureKind::Captcha),
        }
    }

    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("login failed")
    }
}
