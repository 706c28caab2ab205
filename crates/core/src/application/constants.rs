// Orchestration constants (no magic values)
use std::time::Duration;

/// Default global cap on concurrently RUNNING executions
pub const DEFAULT_MAX_CONCURRENCY: usize = 2;

/// How long `TaskQueueManager::shutdown` waits for active executions
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Error stored on RUNNING records found at startup
pub const INTERRUPTED_BY_RESTART: &str = "execution interrupted by process restart";

/// Error stored on merchant tasks never claimed before the batch stopped
pub const BATCH_CANCELLED: &str = "batch cancelled";

/// Error stored on merchant tasks owned by a worker that panicked
pub const WORKER_ABORTED: &str = "worker aborted";

/// Default navigation timeout for detail and listing pages
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum age of a persisted session (1 hour)
pub const DEFAULT_SESSION_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// Default interval between scheduler ticks
pub const DEFAULT_SCHEDULER_TICK: Duration = Duration::from_secs(30);

/// How long a finished batch waits for queued progress pushes to drain
pub const PROGRESS_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);
