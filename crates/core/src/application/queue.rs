// TaskQueueManager - global admission control for executions
//
// FIFO of execution ids in memory, durable records in storage. A single-flight
// drain starts executions while fewer than `max_concurrency` are active; every
// completion re-triggers the drain.

use crate::application::constants::{DEFAULT_MAX_CONCURRENCY, DEFAULT_SHUTDOWN_GRACE};
use crate::application::executor::TaskExecutor;
use crate::application::isolation::run_isolated;
use crate::application::recovery::{RecoveryReport, RecoveryService};
use crate::domain::{ExecutionId, ExecutionRecord, ExecutionStatus, JobDefinitionId, TriggerType};
use crate::error::{AppError, Result};
use crate::port::{ExecutionRepository, IdProvider, JobDefinitionRepository, TimeProvider};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Point-in-time view of the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub queued: usize,
    pub active: usize,
    pub max_concurrency: usize,
    pub accepting: bool,
}

/// Outcome of `shutdown`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Executions still running when the grace period ran out
    pub abandoned: Vec<ExecutionId>,
    /// Left QUEUED in storage, resumed by the next `initialize`
    pub still_queued: usize,
}

#[derive(Default)]
struct QueueState {
    fifo: VecDeque<ExecutionId>,
    queued: HashSet<ExecutionId>,
    running: HashSet<ExecutionId>,
    max_concurrency: usize,
    accepting: bool,
    draining: bool,
    /// Open `initialize` calls; no execution starts while non-zero
    recovering: usize,
}

impl QueueState {
    fn can_start(&self) -> bool {
        self.accepting
            && self.recovering == 0
            && self.running.len() < self.max_concurrency
            && !self.fifo.is_empty()
    }

    fn push(&mut self, id: ExecutionId) -> bool {
        if self.queued.contains(&id) || self.running.contains(&id) {
            return false;
        }
        self.queued.insert(id.clone());
        self.fifo.push_back(id);
        true
    }
}

struct Inner {
    executions: Arc<dyn ExecutionRepository>,
    jobs: Arc<dyn JobDefinitionRepository>,
    executor: Arc<TaskExecutor>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    shutdown_grace: Duration,
    state: Mutex<QueueState>,
    idle: Notify,
}

/// Cheap to clone; all clones share one queue
#[derive(Clone)]
pub struct TaskQueueManager {
    inner: Arc<Inner>,
}

impl TaskQueueManager {
    pub fn new(
        executions: Arc<dyn ExecutionRepository>,
        jobs: Arc<dyn JobDefinitionRepository>,
        executor: Arc<TaskExecutor>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                executions,
                jobs,
                executor,
                id_provider,
                time_provider,
                shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
                state: Mutex::new(QueueState {
                    max_concurrency: DEFAULT_MAX_CONCURRENCY,
                    accepting: true,
                    ..QueueState::default()
                }),
                idle: Notify::new(),
            }),
        }
    }

    /// Builder-style overrides, only valid before the queue is shared
    pub fn with_limits(self, max_concurrency: usize, shutdown_grace: Duration) -> Result<Self> {
        if max_concurrency < 1 {
            return Err(AppError::Validation(
                "max concurrency must be at least 1".to_string(),
            ));
        }
        let inner = Arc::try_unwrap(self.inner).map_err(|_| {
            AppError::InvalidState("queue already shared, use set_max_concurrency".to_string())
        })?;
        {
            let mut state = inner.lock();
            state.max_concurrency = max_concurrency;
        }
        Ok(Self {
            inner: Arc::new(Inner {
                shutdown_grace,
                ..inner
            }),
        })
    }

    /// Validate, persist a QUEUED record, append it to the FIFO and drain
    pub async fn enqueue(
        &self,
        job_definition_id: &JobDefinitionId,
        trigger_type: TriggerType,
    ) -> Result<ExecutionRecord> {
        if !self.inner.lock().accepting {
            return Err(AppError::InvalidState(
                "queue is shutting down, not accepting executions".to_string(),
            ));
        }

        let job = self
            .inner
            .jobs
            .find_by_id(job_definition_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job definition {}", job_definition_id)))?;
        if !job.enabled {
            return Err(AppError::DisabledJob(job.id));
        }

        let record = ExecutionRecord::new(
            self.inner.id_provider.generate_id(),
            job.id.clone(),
            trigger_type,
            self.inner.time_provider.now_millis(),
        );
        self.inner.executions.insert(&record).await?;

        let position = {
            let mut state = self.inner.lock();
            state.push(record.id.clone());
            state.fifo.len()
        };
        info!(
            execution_id = %record.id,
            job_definition_id = %job.id,
            trigger = %trigger_type,
            position = position,
            "Execution enqueued"
        );

        Inner::drain(&self.inner);
        Ok(record)
    }

    /// Rebuild the FIFO from storage after a restart and resume draining
    ///
    /// Call at startup, before the control surface or scheduler can enqueue.
    /// Starts are held while storage is scanned, so an execution this process
    /// launches can never be mistaken for an orphan.
    pub async fn initialize(&self) -> Result<RecoveryReport> {
        let live = {
            let mut state = self.inner.lock();
            state.recovering += 1;
            state.running.clone()
        };
        let recovery =
            RecoveryService::new(self.inner.executions.clone(), self.inner.time_provider.clone());
        let outcome = recovery.recover(&live).await;

        let resumed = {
            let mut state = self.inner.lock();
            state.recovering -= 1;
            outcome.as_ref().map_or(0, |report| {
                report
                    .backlog
                    .iter()
                    .filter(|id| state.push((*id).clone()))
                    .count()
            })
        };
        Inner::drain(&self.inner);

        let report = outcome?;
        info!(resumed = resumed, interrupted = report.interrupted.len(), "Queue initialized");
        Ok(report)
    }

    /// Raise or lower the cap; raising starts queued work immediately
    pub fn set_max_concurrency(&self, max_concurrency: usize) -> Result<()> {
        if max_concurrency < 1 {
            return Err(AppError::Validation(
                "max concurrency must be at least 1".to_string(),
            ));
        }
        let previous = {
            let mut state = self.inner.lock();
            std::mem::replace(&mut state.max_concurrency, max_concurrency)
        };
        info!(previous = previous, max_concurrency = max_concurrency, "Max concurrency changed");
        Inner::drain(&self.inner);
        Ok(())
    }

    /// Remove a still-queued execution and mark it CANCELLED
    pub async fn cancel(&self, execution_id: &ExecutionId) -> Result<ExecutionRecord> {
        let was_queued = {
            let mut state = self.inner.lock();
            // Handed to the executor; its record may not say RUNNING yet
            if state.running.contains(execution_id) {
                return Err(AppError::InvalidState(format!(
                    "execution {} is already running",
                    execution_id
                )));
            }
            if state.queued.remove(execution_id) {
                state.fifo.retain(|id| id != execution_id);
                true
            } else {
                false
            }
        };

        let mut record = self
            .inner
            .executions
            .find_by_id(execution_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("execution {}", execution_id)))?;
        if record.status != ExecutionStatus::Queued {
            return Err(AppError::InvalidState(format!(
                "execution {} is {}, only QUEUED executions can be cancelled",
                execution_id, record.status
            )));
        }

        record.cancel(self.inner.time_provider.now_millis())?;
        self.inner.executions.update(&record).await?;
        info!(execution_id = %execution_id, in_memory = was_queued, "Execution cancelled");
        Ok(record)
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.inner.lock();
        QueueStats {
            queued: state.fifo.len(),
            active: state.running.len(),
            max_concurrency: state.max_concurrency,
            accepting: state.accepting,
        }
    }

    pub fn active_ids(&self) -> Vec<ExecutionId> {
        let mut ids: Vec<_> = self.inner.lock().running.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Stop accepting and starting work, then wait (bounded) for active executions
    pub async fn shutdown(&self) -> ShutdownReport {
        {
            let mut state = self.inner.lock();
            state.accepting = false;
            info!(
                active = state.running.len(),
                queued = state.fifo.len(),
                grace_ms = self.inner.shutdown_grace.as_millis() as u64,
                "Queue shutting down"
            );
        }

        let deadline = Instant::now() + self.inner.shutdown_grace;
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.lock().running.is_empty() {
                break;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if tokio::time::timeout(remaining, notified).await.is_err() {
                break;
            }
        }

        let state = self.inner.lock();
        let mut abandoned: Vec<_> = state.running.iter().cloned().collect();
        abandoned.sort();
        if abandoned.is_empty() {
            info!(still_queued = state.fifo.len(), "Queue drained cleanly");
        } else {
            warn!(
                abandoned = ?abandoned,
                still_queued = state.fifo.len(),
                "Grace period elapsed with executions still running"
            );
        }
        ShutdownReport {
            abandoned,
            still_queued: state.fifo.len(),
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Single-flight: a caller finding a drain in progress returns at once.
    /// The running drain re-checks state under the lock before it exits, so
    /// a state change made by that caller is never missed.
    fn drain(this: &Arc<Self>) {
        {
            let mut state = this.lock();
            if state.draining {
                return;
            }
            state.draining = true;
        }

        loop {
            let next = {
                let mut state = this.lock();
                if !state.can_start() {
                    state.draining = false;
                    return;
                }
                let id = state.fifo.pop_front();
                if let Some(id) = &id {
                    state.queued.remove(id);
                    state.running.insert(id.clone());
                }
                id
            };

            if let Some(id) = next {
                debug!(execution_id = %id, "Starting execution");
                let inner = Arc::clone(this);
                tokio::spawn(async move {
                    inner.run_one(id).await;
                });
            }
        }
    }

    async fn run_one(self: Arc<Self>, execution_id: ExecutionId) {
        let executor = Arc::clone(&self.executor);
        let id = execution_id.clone();
        let outcome = run_isolated(async move { executor.execute_task(&id).await }).await;

        match outcome {
            Ok(Ok(record)) => {
                debug!(execution_id = %execution_id, status = %record.status, "Execution finished");
            }
            Ok(Err(e)) => {
                error!(execution_id = %execution_id, error = %e, "Executor failed");
                self.fail_directly(&execution_id, &e.to_string(), Some(&e.chain()))
                    .await;
            }
            Err(aborted) => {
                self.fail_directly(&execution_id, &format!("executor {}", aborted), None)
                    .await;
            }
        }

        {
            let mut state = self.lock();
            state.running.remove(&execution_id);
        }
        self.idle.notify_waiters();
        Inner::drain(&self);
    }

    /// Mark an execution FAILED when the executor could not
    async fn fail_directly(&self, execution_id: &ExecutionId, message: &str, stack: Option<&str>) {
        let record = match self.executions.find_by_id(execution_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(e) => {
                error!(execution_id = %execution_id, error = %e, "Cannot load execution to mark it FAILED");
                return;
            }
        };
        if record.is_terminal() {
            return;
        }
        let mut record = record;
        if let Err(e) = record.fail(self.time_provider.now_millis(), message, stack) {
            error!(execution_id = %execution_id, error = %e, "Cannot mark execution FAILED");
            return;
        }
        if let Err(e) = self.executions.update(&record).await {
            error!(execution_id = %execution_id, error = %e, "Failed to persist FAILED execution");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::logging::ExecutionLoggerFactory;
    use crate::application::registry::SiteRegistry;
    use crate::domain::{JobDefinition, ScrapedItem, SiteKey};
    use crate::port::execution_repository::mocks::InMemoryExecutionRepository;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::item_repository::mocks::InMemoryItemRepository;
    use crate::port::job_definition_repository::mocks::InMemoryJobDefinitionRepository;
    use crate::port::log_sink::mocks::MemoryLogSink;
    use crate::port::site_scraper::mocks::{StubBehavior, StubScraper};
    use crate::port::time_provider::mocks::ManualClock;
    use crate::port::{ScrapeError, ScrapeRequest, SiteScraper};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Tracks how many scrapes overlap
    struct GaugeScraper {
        current: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl SiteScraper for GaugeScraper {
        fn site(&self) -> SiteKey {
            SiteKey::ProductCatalog
        }

        async fn scrape(&self, request: ScrapeRequest) -> std::result::Result<Vec<ScrapedItem>, ScrapeError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![ScrapedItem::new(
                format!("https://shop.test/{}", request.execution_id),
                "product_catalog",
            )])
        }
    }

    fn job(id: &str, enabled: bool) -> JobDefinition {
        let mut job = JobDefinition::new(
            id,
            id,
            SiteKey::ProductCatalog,
            vec!["https://shop.test/c/1".to_string()],
            0,
        );
        job.enabled = enabled;
        job
    }

    fn queue_with(
        scraper: Arc<dyn SiteScraper>,
        executions: Arc<dyn ExecutionRepository>,
        max: usize,
    ) -> TaskQueueManager {
        let jobs = Arc::new(InMemoryJobDefinitionRepository::with([
            job("job-1", true),
            job("job-off", false),
        ]));
        let clock = Arc::new(ManualClock::new(1_000));
        let executor = Arc::new(TaskExecutor::new(
            executions.clone(),
            jobs.clone(),
            Arc::new(InMemoryItemRepository::new()),
            Arc::new(SiteRegistry::new().register(scraper)),
            ExecutionLoggerFactory::new(Arc::new(MemoryLogSink::new()), None, clock.clone()),
            clock.clone(),
        ));
        TaskQueueManager::new(
            executions,
            jobs,
            executor,
            Arc::new(SequentialIdProvider::new()),
            clock,
        )
        .with_limits(max, Duration::from_secs(5))
        .unwrap()
    }

    async fn wait_until_idle(queue: &TaskQueueManager) {
        for _ in 0..500 {
            let stats = queue.stats();
            if stats.active == 0 && stats.queued == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("queue did not go idle: {:?}", queue.stats());
    }

    #[tokio::test]
    async fn test_running_never_exceeds_cap_under_burst() {
        for cap in [1usize, 2, 3] {
            let gauge = Arc::new(GaugeScraper {
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                delay: Duration::from_millis(20),
            });
            let executions = Arc::new(InMemoryExecutionRepository::new());
            let queue = queue_with(gauge.clone(), executions.clone(), cap);

            let burst: Vec<_> = (0..8)
                .map(|_| {
                    let q = queue.clone();
                    tokio::spawn(async move {
                        q.enqueue(&"job-1".to_string(), TriggerType::Api).await
                    })
                })
                .collect();
            for handle in burst {
                handle.await.unwrap().unwrap();
            }
            wait_until_idle(&queue).await;

            assert!(gauge.peak.load(Ordering::SeqCst) <= cap, "cap {} exceeded", cap);
            assert_eq!(
                executions
                    .count_by_status(ExecutionStatus::Completed)
                    .await
                    .unwrap(),
                8
            );
        }
    }

    #[tokio::test]
    async fn test_disabled_job_is_rejected_without_record() {
        let executions = Arc::new(InMemoryExecutionRepository::new());
        let queue = queue_with(
            Arc::new(StubScraper::items(SiteKey::ProductCatalog, Duration::ZERO)),
            executions.clone(),
            1,
        );

        let err = queue
            .enqueue(&"job-off".to_string(), TriggerType::Manual)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DisabledJob(_)));

        let err = queue
            .enqueue(&"job-missing".to_string(), TriggerType::Manual)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(executions.is_empty());
    }

    #[tokio::test]
    async fn test_set_max_concurrency_rejects_zero() {
        let queue = queue_with(
            Arc::new(StubScraper::items(SiteKey::ProductCatalog, Duration::ZERO)),
            Arc::new(InMemoryExecutionRepository::new()),
            1,
        );
        assert!(matches!(
            queue.set_max_concurrency(0),
            Err(AppError::Validation(_))
        ));
        queue.set_max_concurrency(4).unwrap();
        assert_eq!(queue.stats().max_concurrency, 4);
    }

    #[tokio::test]
    async fn test_executor_panic_marks_failed_and_queue_survives() {
        let scraper = Arc::new(StubScraper::new(
            SiteKey::ProductCatalog,
            StubBehavior::Panic("selector engine exploded".to_string()),
        ));
        let executions = Arc::new(InMemoryExecutionRepository::new());
        let queue = queue_with(scraper.clone(), executions.clone(), 1);

        let first = queue
            .enqueue(&"job-1".to_string(), TriggerType::Manual)
            .await
            .unwrap();
        wait_until_idle(&queue).await;

        let failed = executions.get(&first.id).unwrap();
        assert_eq!(failed.status, ExecutionStatus::Failed);
        assert!(failed
            .error_message
            .unwrap()
            .contains("selector engine exploded"));

        scraper.set_behavior(StubBehavior::Items {
            delay: Duration::ZERO,
        });
        let second = queue
            .enqueue(&"job-1".to_string(), TriggerType::Manual)
            .await
            .unwrap();
        wait_until_idle(&queue).await;
        assert_eq!(
            executions.get(&second.id).unwrap().status,
            ExecutionStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_cancel_only_queued() {
        let executions = Arc::new(InMemoryExecutionRepository::new());
        let queue = queue_with(
            Arc::new(StubScraper::items(
                SiteKey::ProductCatalog,
                Duration::from_millis(200),
            )),
            executions.clone(),
            1,
        );

        let running = queue
            .enqueue(&"job-1".to_string(), TriggerType::Manual)
            .await
            .unwrap();
        let waiting = queue
            .enqueue(&"job-1".to_string(), TriggerType::Manual)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let cancelled = queue.cancel(&waiting.id).await.unwrap();
        assert_eq!(cancelled.status, ExecutionStatus::Cancelled);
        assert!(matches!(
            queue.cancel(&running.id).await,
            Err(AppError::InvalidState(_))
        ));

        wait_until_idle(&queue).await;
        assert_eq!(
            executions.get(&waiting.id).unwrap().status,
            ExecutionStatus::Cancelled
        );
        assert_eq!(executions.statuses_of(&waiting.id).len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work_and_reports_abandoned() {
        let executions = Arc::new(InMemoryExecutionRepository::new());
        let queue = queue_with(
            Arc::new(StubScraper::items(
                SiteKey::ProductCatalog,
                Duration::from_secs(10),
            )),
            executions.clone(),
            1,
        );
        let queue = queue.with_limits(1, Duration::from_millis(50)).unwrap();

        let slow = queue
            .enqueue(&"job-1".to_string(), TriggerType::Manual)
            .await
            .unwrap();
        queue
            .enqueue(&"job-1".to_string(), TriggerType::Manual)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let report = queue.shutdown().await;
        assert_eq!(report.abandoned, vec![slow.id]);
        assert_eq!(report.still_queued, 1);
        assert!(matches!(
            queue.enqueue(&"job-1".to_string(), TriggerType::Manual).await,
            Err(AppError::InvalidState(_))
        ));
    }

    /// Holds the first RUNNING scan until released, so work can arrive mid-recovery
    struct GatedExecutions {
        inner: Arc<InMemoryExecutionRepository>,
        armed: AtomicBool,
        entered: Notify,
        gate: tokio::sync::Semaphore,
    }

    #[async_trait]
    impl ExecutionRepository for GatedExecutions {
        async fn insert(&self, execution: &ExecutionRecord) -> Result<()> {
            self.inner.insert(execution).await
        }

        async fn find_by_id(&self, id: &ExecutionId) -> Result<Option<ExecutionRecord>> {
            self.inner.find_by_id(id).await
        }

        async fn update(&self, execution: &ExecutionRecord) -> Result<()> {
            self.inner.update(execution).await
        }

        async fn find_by_status(&self, status: ExecutionStatus) -> Result<Vec<ExecutionRecord>> {
            if status == ExecutionStatus::Running && self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                let _permit = self.gate.acquire().await.unwrap();
            }
            self.inner.find_by_status(status).await
        }

        async fn count_by_status(&self, status: ExecutionStatus) -> Result<i64> {
            self.inner.count_by_status(status).await
        }

        async fn has_active_for_job(&self, job_definition_id: &JobDefinitionId) -> Result<bool> {
            self.inner.has_active_for_job(job_definition_id).await
        }

        async fn latest_for_job(
            &self,
            job_definition_id: &JobDefinitionId,
        ) -> Result<Option<ExecutionRecord>> {
            self.inner.latest_for_job(job_definition_id).await
        }
    }

    #[tokio::test]
    async fn test_initialize_leaves_in_flight_execution_alone() {
        let executions = Arc::new(InMemoryExecutionRepository::new());
        let queue = queue_with(
            Arc::new(StubScraper::items(
                SiteKey::ProductCatalog,
                Duration::from_millis(150),
            )),
            executions.clone(),
            1,
        );
        let running = queue
            .enqueue(&"job-1".to_string(), TriggerType::Manual)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(executions.get(&running.id).unwrap().status, ExecutionStatus::Running);

        let report = queue.initialize().await.unwrap();

        assert!(report.interrupted.is_empty());
        wait_until_idle(&queue).await;
        assert_eq!(
            executions.get(&running.id).unwrap().status,
            ExecutionStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_work_enqueued_during_recovery_is_not_failed_as_orphan() {
        let executions = Arc::new(InMemoryExecutionRepository::new());
        let mut orphan = ExecutionRecord::new("exec-orphan", "job-1", TriggerType::Manual, 500);
        orphan.start(600).unwrap();
        executions.seed(orphan);
        let gated = Arc::new(GatedExecutions {
            inner: executions.clone(),
            armed: AtomicBool::new(true),
            entered: Notify::new(),
            gate: tokio::sync::Semaphore::new(0),
        });
        let queue = queue_with(
            Arc::new(StubScraper::items(SiteKey::ProductCatalog, Duration::ZERO)),
            gated.clone(),
            2,
        );

        let recovering = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.initialize().await })
        };
        gated.entered.notified().await;

        let fresh = queue
            .enqueue(&"job-1".to_string(), TriggerType::Api)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(queue.stats().active, 0);
        assert_eq!(executions.get(&fresh.id).unwrap().status, ExecutionStatus::Queued);

        gated.gate.add_permits(1);
        let report = recovering.await.unwrap().unwrap();
        wait_until_idle(&queue).await;

        assert_eq!(report.interrupted, vec!["exec-orphan".to_string()]);
        assert_eq!(
            executions.get("exec-orphan").unwrap().status,
            ExecutionStatus::Failed
        );
        assert_eq!(
            executions.get(&fresh.id).unwrap().status,
            ExecutionStatus::Completed
        );
    }
}
