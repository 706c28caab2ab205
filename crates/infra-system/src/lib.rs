// Scrapeflow Infrastructure - System Adapters
// Implements: ProgressReporter (HTTP), SessionStore (file fallback),
// LogMirror (per-execution file), CaptchaSolver (2Captcha-compatible API)

pub mod captcha_solver;
pub mod log_mirror;
pub mod progress_reporter;
pub mod session_store;

pub use captcha_solver::TwoCaptchaSolver;
pub use log_mirror::FileLogMirror;
pub use progress_reporter::HttpProgressReporter;
pub use session_store::FileSessionStore;
