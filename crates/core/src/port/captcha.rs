// CAPTCHA Solver Port

use crate::port::browser::{BrowserError, BrowserPage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptchaMode {
    /// Wait for a human to solve it in a headed browser
    Manual,
    /// Hand the challenge to a solving service
    Automated,
}

impl fmt::Display for CaptchaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptchaMode::Manual => f.write_str("manual"),
            CaptchaMode::Automated => f.write_str("automated"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptchaError {
    #[error("{mode} CAPTCHA solving timed out after {timeout_ms}ms")]
    Timeout { mode: CaptchaMode, timeout_ms: u64 },

    /// Solver answered but the answer was not accepted; worth another attempt
    #[error("CAPTCHA solution rejected: {0}")]
    Rejected(String),

    /// Solver cannot be used at all (bad key, no balance, missing site key)
    #[error("CAPTCHA solver unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

impl CaptchaError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CaptchaError::Timeout { .. } | CaptchaError::Rejected(_) | CaptchaError::Browser(_)
        )
    }
}

/// A challenge found on the current page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaChallenge {
    pub page_url: String,
    /// Widget site key, when the markup exposes one
    pub site_key: Option<String>,
    /// Selector that matched
    pub selector: String,
}

#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    fn mode(&self) -> CaptchaMode;

    /// Upper bound for a single `solve` call
    fn timeout(&self) -> Duration;

    /// Resolve the challenge on `page`. Returns once the page no longer
    /// needs a solution or the attempt failed.
    async fn solve(
        &self,
        page: &dyn BrowserPage,
        challenge: &CaptchaChallenge,
    ) -> Result<(), CaptchaError>;
}

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    type SolvedHook = Box<dyn Fn() + Send + Sync>;

    /// Replays scripted results; runs `on_success` after each successful solve
    pub struct ScriptedCaptchaSolver {
        results: Mutex<VecDeque<Result<(), CaptchaError>>>,
        on_success: Option<SolvedHook>,
        calls: Mutex<Vec<CaptchaChallenge>>,
    }

    impl ScriptedCaptchaSolver {
        pub fn new(results: impl IntoIterator<Item = Result<(), CaptchaError>>) -> Self {
            Self {
                results: Mutex::new(results.into_iter().collect()),
                on_success: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn on_success(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
            self.on_success = Some(Box::new(hook));
            self
        }

        pub fn calls(&self) -> Vec<CaptchaChallenge> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CaptchaSolver for ScriptedCaptchaSolver {
        fn mode(&self) -> CaptchaMode {
            CaptchaMode::Automated
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }

        async fn solve(
            &self,
            _page: &dyn BrowserPage,
            challenge: &CaptchaChallenge,
        ) -> Result<(), CaptchaError> {
            self.calls.lock().unwrap().push(challenge.clone());
            let next = self
                .results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(CaptchaError::Unavailable("script exhausted".to_string())));
            if next.is_ok() {
                if let Some(hook) = &self.on_success {
                    hook();
                }
            }
            next
        }
    }
}
