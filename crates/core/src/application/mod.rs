// Application Layer - Orchestration services

pub mod batch;
pub mod best_effort;
pub mod captcha;
pub mod constants;
pub mod executor;
pub mod isolation;
pub mod listing;
pub mod logging;
pub mod login;
pub mod queue;
pub mod recovery;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod shutdown;
pub mod taxonomy;

// Re-exports
pub use batch::{
    BatchMerchantScraper, BatchObserver, BatchParams, CancelFlag, MerchantPortalScraper, TaskBoard,
};
pub use best_effort::best_effort;
pub use captcha::{CaptchaConfig, CaptchaHandler, ManualCaptchaSolver};
pub use executor::TaskExecutor;
pub use listing::ListingCrawler;
pub use logging::{ExecutionLogger, ExecutionLoggerFactory};
pub use login::{FailurePhrases, LoginConfig, LoginHandler};
pub use queue::{QueueStats, ShutdownReport, TaskQueueManager};
pub use recovery::{RecoveryReport, RecoveryService};
pub use registry::SiteRegistry;
pub use scheduler::JobScheduler;
pub use session::SessionManager;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use taxonomy::TaxonomyBuilder;
