// Site Scraper Plugin Port

use crate::domain::{Credentials, ExecutionId, ScrapeLimits, ScrapedItem, SiteKey};
use crate::port::browser::BrowserError;
use crate::port::captcha::CaptchaError;
use crate::port::log_sink::ExecutionLog;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScrapeError {
    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("login failed: {message}")]
    Login {
        message: String,
        requires_captcha: bool,
    },

    /// None of the login detection rules matched the post-submit page
    #[error("ambiguous login state: {0}")]
    AmbiguousLoginState(String),

    #[error(transparent)]
    Captcha(#[from] CaptchaError),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("invalid scrape request: {0}")]
    InvalidRequest(String),

    #[error("scrape cancelled")]
    Cancelled,
}

/// Limits handed to a scraper after normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeOptions {
    /// At least 1
    pub concurrency: usize,
    pub max_requests: Option<u32>,
    pub max_pages: Option<u32>,
    pub max_results: Option<u32>,
    /// min <= max
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl ScrapeOptions {
    /// Clamp concurrency to >= 1, drop zero caps, order the delay window
    pub fn normalized(limits: &ScrapeLimits) -> Self {
        let positive = |v: Option<u32>| v.filter(|n| *n > 0);
        let (min_delay_ms, max_delay_ms) = if limits.min_delay_ms <= limits.max_delay_ms {
            (limits.min_delay_ms, limits.max_delay_ms)
        } else {
            (limits.max_delay_ms, limits.min_delay_ms)
        };
        Self {
            concurrency: limits.concurrency.max(1),
            max_requests: positive(limits.max_requests),
            max_pages: positive(limits.max_pages),
            max_results: positive(limits.max_results),
            min_delay_ms,
            max_delay_ms,
        }
    }

    /// Tighter of `max_requests` and `max_results`, if either is set
    pub fn request_budget(&self) -> Option<usize> {
        match (self.max_requests, self.max_results) {
            (Some(a), Some(b)) => Some(a.min(b) as usize),
            (Some(n), None) | (None, Some(n)) => Some(n as usize),
            (None, None) => None,
        }
    }
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self::normalized(&ScrapeLimits::default())
    }
}

/// Everything a scraper needs for one execution
#[derive(Clone)]
pub struct ScrapeRequest {
    pub execution_id: ExecutionId,
    pub site: SiteKey,
    pub start_urls: Vec<String>,
    pub credentials: Option<Credentials>,
    pub options: ScrapeOptions,
    pub logger: Arc<dyn ExecutionLog>,
}

/// One implementation per `SiteKey`
#[async_trait]
pub trait SiteScraper: Send + Sync {
    fn site(&self) -> SiteKey;

    async fn scrape(&self, request: ScrapeRequest) -> Result<Vec<ScrapedItem>, ScrapeError>;
}

pub mod mocks {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Behaviour of `StubScraper`
    #[derive(Debug, Clone)]
    pub enum StubBehavior {
        /// Return one item per start URL after `delay`
        Items { delay: Duration },
        Fail(ScrapeError),
        Panic(String),
    }

    /// Scraper returning canned results; records each request's execution id
    pub struct StubScraper {
        site: SiteKey,
        behavior: Mutex<StubBehavior>,
        calls: Mutex<Vec<ExecutionId>>,
    }

    impl StubScraper {
        pub fn new(site: SiteKey, behavior: StubBehavior) -> Self {
            Self {
                site,
                behavior: Mutex::new(behavior),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn items(site: SiteKey, delay: Duration) -> Self {
            Self::new(site, StubBehavior::Items { delay })
        }

        pub fn set_behavior(&self, behavior: StubBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }

        pub fn calls(&self) -> Vec<ExecutionId> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SiteScraper for StubScraper {
        fn site(&self) -> SiteKey {
            self.site
        }

        async fn scrape(&self, request: ScrapeRequest) -> Result<Vec<ScrapedItem>, ScrapeError> {
            self.calls.lock().unwrap().push(request.execution_id.clone());
            let behavior = self.behavior.lock().unwrap().clone();
            match behavior {
                StubBehavior::Items { delay } => {
                    tokio::time::sleep(delay).await;
                    Ok(request
                        .start_urls
                        .iter()
                        .map(|url| ScrapedItem::new(url.clone(), self.site.as_str()))
                        .collect())
                }
                StubBehavior::Fail(err) => Err(err),
                StubBehavior::Panic(msg) => panic!("{}", msg),
            }
        }
    }
}
