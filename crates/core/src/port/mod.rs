// Port Layer - Interfaces for external dependencies

pub mod browser;
pub mod captcha;
pub mod execution_repository;
pub mod extraction;
pub mod id_provider; // For deterministic testing
pub mod item_repository;
pub mod job_definition_repository;
pub mod log_sink;
pub mod progress_reporter;
pub mod session_store;
pub mod site_scraper;
pub mod time_provider;

// Re-exports
pub use browser::{
    wait_for_any, wait_for_selector, BrowserContext, BrowserError, BrowserLauncher, BrowserPage,
    BrowserResult,
};
pub use captcha::{CaptchaChallenge, CaptchaError, CaptchaMode, CaptchaSolver};
pub use execution_repository::ExecutionRepository;
pub use extraction::{DetailHandler, ListingHandler, ListingPage};
pub use id_provider::{IdProvider, UuidProvider};
pub use item_repository::ItemRepository;
pub use job_definition_repository::JobDefinitionRepository;
pub use log_sink::{ExecutionLog, LogMirror, LogSink, NullExecutionLog};
pub use progress_reporter::{NoopProgressReporter, ProgressReporter, ProgressSnapshot};
pub use session_store::SessionStore;
pub use site_scraper::{ScrapeError, ScrapeOptions, ScrapeRequest, SiteScraper};
pub use time_provider::{SystemTimeProvider, TimeProvider};
