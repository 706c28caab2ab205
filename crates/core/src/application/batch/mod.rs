// BatchMerchantScraper - worker pool over one shared authenticated context
//
// Flow:
// 1. Launch context, restore saved cookies (before any navigation)
// 2. Open min(concurrency, tasks) pages
// 3. Shared login on page 0
// 4. Workers claim tasks from the board until it is empty or cancelled
// 5. Leftover tasks -> FAILED, result aggregated
// 6. Pages and context closed on every path
//
// Progress snapshots go through a channel to a single forwarder task, so a
// slow endpoint never holds up a worker. Order is preserved.

mod board;

pub use board::TaskBoard;

use crate::application::best_effort::best_effort;
use crate::application::constants::{
    BATCH_CANCELLED, DEFAULT_NAVIGATION_TIMEOUT, PROGRESS_FLUSH_TIMEOUT, WORKER_ABORTED,
};
use crate::application::isolation::panic_message;
use crate::application::login::LoginHandler;
use crate::application::session::SessionManager;
use crate::application::shutdown::ShutdownToken;
use crate::domain::{
    BatchResult, Credentials, ExecutionId, LogLevel, LoginFailureKind, MerchantTarget,
    MerchantTask, ScrapedItem, SessionState, SiteKey, WorkerId,
};
use crate::port::{
    BrowserContext, BrowserLauncher, BrowserPage, DetailHandler, ExecutionLog, ProgressReporter,
    ProgressSnapshot, ScrapeError, ScrapeOptions, ScrapeRequest, SiteScraper, TimeProvider,
};
use async_trait::async_trait;
use futures::future::join_all;
use rand::Rng;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Uniform random pause from `[min_ms, max_ms]`
pub fn random_delay(min_ms: u64, max_ms: u64) -> Duration {
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
}

/// Cooperative stop signal, checked by workers at the top of their loop
#[derive(Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
    shutdown: Option<ShutdownToken>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also trips when the process starts shutting down
    pub fn with_shutdown(shutdown: ShutdownToken) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            shutdown: Some(shutdown),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.shutdown.as_ref().is_some_and(ShutdownToken::is_shutdown)
    }
}

/// Per-task callbacks, invoked after the board transition
pub trait BatchObserver: Send + Sync {
    fn on_task_completed(&self, _task: &MerchantTask) {}
    fn on_task_failed(&self, _task: &MerchantTask) {}
}

pub struct BatchParams {
    pub execution_id: ExecutionId,
    pub targets: Vec<MerchantTarget>,
    pub credentials: Option<Credentials>,
    pub options: ScrapeOptions,
    pub logger: Arc<dyn ExecutionLog>,
    pub cancel: CancelFlag,
    pub observer: Option<Arc<dyn BatchObserver>>,
}

pub struct BatchMerchantScraper {
    launcher: Arc<dyn BrowserLauncher>,
    sessions: Arc<SessionManager>,
    login: Arc<LoginHandler>,
    detail: Arc<dyn DetailHandler>,
    progress: Arc<dyn ProgressReporter>,
    time_provider: Arc<dyn TimeProvider>,
    navigation_timeout: Duration,
}

impl BatchMerchantScraper {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        sessions: Arc<SessionManager>,
        login: Arc<LoginHandler>,
        detail: Arc<dyn DetailHandler>,
        progress: Arc<dyn ProgressReporter>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            launcher,
            sessions,
            login,
            detail,
            progress,
            time_provider,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
        }
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    /// Run one batch; errors only when the batch cannot start (launch, login)
    pub async fn run(&self, params: BatchParams) -> Result<BatchResult, ScrapeError> {
        let started_at = self.time_provider.now_millis();
        let budget = params.options.request_budget().unwrap_or(usize::MAX);
        if params.targets.len() > budget {
            info!(
                execution_id = %params.execution_id,
                targets = params.targets.len(),
                budget = budget,
                "Merchant targets capped by request budget"
            );
        }
        let board = Arc::new(TaskBoard::new(params.targets.iter().take(budget).cloned()));
        if board.is_empty() {
            return Ok(board.result(0));
        }
        let workers = params.options.concurrency.max(1).min(board.len());

        info!(
            execution_id = %params.execution_id,
            tasks = board.len(),
            workers = workers,
            "Starting merchant batch"
        );

        let (feed, queued) = mpsc::unbounded_channel();
        let forwarder = tokio::spawn(forward_progress(self.progress.clone(), queued));

        let run = Arc::new(BatchRun {
            execution_id: params.execution_id.clone(),
            board,
            detail: self.detail.clone(),
            feed,
            time_provider: self.time_provider.clone(),
            logger: params.logger.clone(),
            cancel: params.cancel.clone(),
            observer: params.observer.clone(),
            min_delay_ms: params.options.min_delay_ms,
            max_delay_ms: params.options.max_delay_ms,
            navigation_timeout: self.navigation_timeout,
            started_at,
            workers,
        });

        let context = self.launcher.launch().await?;
        let mut pages: Vec<Arc<dyn BrowserPage>> = Vec::with_capacity(workers);

        let outcome = self
            .run_in_context(&run, context.as_ref(), &mut pages, &params)
            .await;

        for page in &pages {
            best_effort("page close", page.close()).await;
        }
        best_effort("browser context close", context.close()).await;
        debug!(execution_id = %params.execution_id, pages = pages.len(), "Batch browser resources closed");

        // Last sender goes with the run; the forwarder exits once drained
        drop(run);
        match tokio::time::timeout(PROGRESS_FLUSH_TIMEOUT, forwarder).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(execution_id = %params.execution_id, error = %e, "Progress forwarder aborted"),
            Err(_) => warn!(
                execution_id = %params.execution_id,
                "Progress pushes still pending, leaving them in the background"
            ),
        }

        outcome
    }

    async fn run_in_context(
        &self,
        run: &Arc<BatchRun>,
        context: &dyn BrowserContext,
        pages: &mut Vec<Arc<dyn BrowserPage>>,
        params: &BatchParams,
    ) -> Result<BatchResult, ScrapeError> {
        let identity = params.credentials.as_ref().map(Credentials::identity);
        let restored = match &identity {
            Some(identity) => self.sessions.load_session_state(identity).await,
            None => None,
        };
        if let Some(state) = &restored {
            if self.sessions.apply_cookies(context, state).await {
                run.logger
                    .log(
                        LogLevel::Info,
                        "Restored saved session",
                        Some(json!({ "cookies": state.cookies.len(), "savedAt": state.saved_at })),
                    )
                    .await;
            }
        }

        for _ in 0..run.workers {
            pages.push(context.new_page().await?);
        }

        run.push_progress("login", Some("Checking login"));
        self.ensure_logged_in(context, pages[0].as_ref(), restored.as_ref(), params)
            .await?;

        run.push_progress("scraping", None);
        let handles: Vec<_> = pages
            .iter()
            .enumerate()
            .map(|(worker_id, page)| tokio::spawn(run.clone().worker(worker_id, page.clone())))
            .collect();

        let joined = join_all(handles).await;
        for (worker_id, outcome) in joined.into_iter().enumerate() {
            let Err(join_err) = outcome else {
                continue;
            };
            let reason = if join_err.is_panic() {
                panic_message(join_err.into_panic().as_ref())
            } else {
                "task cancelled".to_string()
            };
            error!(
                execution_id = %run.execution_id,
                worker_id = worker_id,
                reason = %reason,
                "Batch worker aborted"
            );
            let aborted = run
                .board
                .fail_running_for(worker_id, WORKER_ABORTED, run.time_provider.now_millis());
            for task in &aborted {
                run.notify_failed(task).await;
            }
        }

        let leftover = run
            .board
            .fail_pending(BATCH_CANCELLED, run.time_provider.now_millis());
        if !leftover.is_empty() {
            run.logger
                .log(
                    LogLevel::Warn,
                    "Batch stopped with unclaimed tasks",
                    Some(json!({ "unclaimed": leftover.len() })),
                )
                .await;
            for task in &leftover {
                if let Some(observer) = &run.observer {
                    observer.on_task_failed(task);
                }
            }
        }

        let result = run.board.result(run.elapsed_ms());
        run.push_progress("finished", None);
        run.logger
            .log(
                LogLevel::Info,
                "Merchant batch finished",
                Some(json!({
                    "total": result.total,
                    "completed": result.completed,
                    "failed": result.failed,
                    "totalTimeMs": result.total_time_ms,
                })),
            )
            .await;
        Ok(result)
    }

    /// Probe the authenticated URL; log in only when the session is not valid
    async fn ensure_logged_in(
        &self,
        context: &dyn BrowserContext,
        page: &dyn BrowserPage,
        restored: Option<&SessionState>,
        params: &BatchParams,
    ) -> Result<(), ScrapeError> {
        let Some(credentials) = &params.credentials else {
            debug!(execution_id = %params.execution_id, "No credentials, skipping login");
            return Ok(());
        };

        page.goto(&self.login.config().authenticated_url, self.navigation_timeout)
            .await?;
        if let Some(state) = restored {
            self.sessions.apply_local_storage(page, state).await;
        }
        if self.login.is_logged_in(page).await {
            params.logger.info("Session still valid, login skipped").await;
            return Ok(());
        }

        let outcome = self
            .login
            .login(page, credentials, params.logger.as_ref())
            .await;
        if !outcome.success {
            let message = outcome.error_message().to_string();
            return Err(match outcome.failure_kind {
                Some(LoginFailureKind::Indeterminate) => ScrapeError::AmbiguousLoginState(message),
                _ => ScrapeError::Login {
                    message,
                    requires_captcha: outcome.requires_captcha,
                },
            });
        }

        if !self
            .sessions
            .save_session_state(context, Some(page), &credentials.identity())
            .await
        {
            params.logger.warn("Session could not be saved").await;
        }
        Ok(())
    }
}

/// Deliver queued snapshots one at a time, in push order
async fn forward_progress(
    reporter: Arc<dyn ProgressReporter>,
    mut queued: mpsc::UnboundedReceiver<ProgressSnapshot>,
) {
    while let Some(snapshot) = queued.recv().await {
        best_effort("progress push", reporter.report(&snapshot)).await;
    }
}

/// State shared by the workers of one batch
struct BatchRun {
    execution_id: ExecutionId,
    board: Arc<TaskBoard>,
    detail: Arc<dyn DetailHandler>,
    feed: mpsc::UnboundedSender<ProgressSnapshot>,
    time_provider: Arc<dyn TimeProvider>,
    logger: Arc<dyn ExecutionLog>,
    cancel: CancelFlag,
    observer: Option<Arc<dyn BatchObserver>>,
    min_delay_ms: u64,
    max_delay_ms: u64,
    navigation_timeout: Duration,
    started_at: i64,
    workers: usize,
}

impl BatchRun {
    fn elapsed_ms(&self) -> i64 {
        (self.time_provider.now_millis() - self.started_at).max(0)
    }

    /// Queue a snapshot for the forwarder; never waits on the endpoint
    fn push_progress(&self, phase: &str, message: Option<&str>) {
        let snapshot = ProgressSnapshot {
            execution_id: self.execution_id.clone(),
            phase: phase.to_string(),
            progress: self.board.progress(self.elapsed_ms(), self.workers),
            message: message.map(str::to_string),
            timestamp: self.time_provider.now_millis(),
        };
        if self.feed.send(snapshot).is_err() {
            debug!(execution_id = %self.execution_id, phase = phase, "Progress forwarder gone, snapshot dropped");
        }
    }

    async fn worker(self: Arc<Self>, worker_id: WorkerId, page: Arc<dyn BrowserPage>) {
        loop {
            if self.cancel.is_cancelled() {
                debug!(execution_id = %self.execution_id, worker_id = worker_id, "Worker observed cancellation");
                break;
            }
            let Some((index, task)) = self.board.claim(worker_id, self.time_provider.now_millis())
            else {
                break;
            };
            self.push_progress("scraping", None);

            let result = self.scrape_one(page.as_ref(), &task).await;
            let now = self.time_provider.now_millis();
            match result {
                Ok(item) => {
                    if let Some(done) = self.board.complete(index, item, now) {
                        debug!(
                            execution_id = %self.execution_id,
                            worker_id = worker_id,
                            task_id = %done.id,
                            duration_ms = done.duration_ms(),
                            "Merchant task completed"
                        );
                        if let Some(observer) = &self.observer {
                            observer.on_task_completed(&done);
                        }
                    }
                }
                Err(e) => {
                    if let Some(failed) = self.board.fail(index, e.to_string(), now) {
                        self.notify_failed(&failed).await;
                    }
                }
            }
            self.push_progress("scraping", None);

            if self.board.has_pending() && !self.cancel.is_cancelled() {
                tokio::time::sleep(random_delay(self.min_delay_ms, self.max_delay_ms)).await;
            }
        }
    }

    async fn scrape_one(
        &self,
        page: &dyn BrowserPage,
        task: &MerchantTask,
    ) -> Result<ScrapedItem, ScrapeError> {
        page.goto(&task.target.url, self.navigation_timeout).await?;
        self.detail.extract(page, task).await
    }

    async fn notify_failed(&self, task: &MerchantTask) {
        warn!(
            execution_id = %self.execution_id,
            task_id = %task.id,
            url = %task.target.url,
            error = task.error.as_deref().unwrap_or_default(),
            "Merchant task failed"
        );
        self.logger
            .log(
                LogLevel::Warn,
                "Merchant task failed",
                Some(json!({
                    "taskId": task.id,
                    "url": task.target.url,
                    "error": task.error,
                })),
            )
            .await;
        if let Some(observer) = &self.observer {
            observer.on_task_failed(task);
        }
    }
}

/// `SiteScraper` for the merchant portal: one task per start URL
pub struct MerchantPortalScraper {
    batch: Arc<BatchMerchantScraper>,
    shutdown: ShutdownToken,
}

impl MerchantPortalScraper {
    pub fn new(batch: Arc<BatchMerchantScraper>, shutdown: ShutdownToken) -> Self {
        Self { batch, shutdown }
    }
}

#[async_trait]
impl SiteScraper for MerchantPortalScraper {
    fn site(&self) -> SiteKey {
        SiteKey::MerchantPortal
    }

    async fn scrape(&self, request: ScrapeRequest) -> Result<Vec<ScrapedItem>, ScrapeError> {
        let targets: Vec<MerchantTarget> = request
            .start_urls
            .iter()
            .map(|url| MerchantTarget::from_url(url))
            .collect();

        let result = self
            .batch
            .run(BatchParams {
                execution_id: request.execution_id.clone(),
                targets,
                credentials: request.credentials.clone(),
                options: request.options.clone(),
                logger: request.logger.clone(),
                cancel: CancelFlag::with_shutdown(self.shutdown.clone()),
                observer: None,
            })
            .await?;

        if result.total > 0 && result.completed == 0 {
            let first_error = result
                .failed_tasks
                .first()
                .and_then(|t| t.error.clone())
                .unwrap_or_default();
            return Err(ScrapeError::Extraction(format!(
                "all {} merchant tasks failed; first error: {}",
                result.total, first_error
            )));
        }

        Ok(result
            .completed_tasks
            .into_iter()
            .filter_map(|task| task.result)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::captcha::{CaptchaConfig, CaptchaHandler};
    use crate::application::login::LoginConfig;
    use crate::domain::{MerchantTaskStatus, SessionCookie};
    use crate::port::browser::mocks::{FakeBrowser, FakePageFixture, SubmitOutcome};
    use crate::port::captcha::mocks::ScriptedCaptchaSolver;
    use crate::port::extraction::mocks::RecordingDetailHandler;
    use crate::port::progress_reporter::mocks::RecordingProgressReporter;
    use crate::port::session_store::mocks::InMemorySessionStore;
    use crate::port::time_provider::mocks::ManualClock;
    use crate::port::NullExecutionLog;
    use std::sync::Mutex;

    const LOGIN: &str = "https://portal.test/login";
    const DASHBOARD: &str = "https://portal.test/app/dashboard";
    const NOW: i64 = 1_700_000_000_000;
    const HOUR_MS: i64 = 60 * 60 * 1000;

    fn merchant(i: usize) -> String {
        format!("https://portal.test/app/merchants/m{}", i)
    }

    struct Harness {
        browser: FakeBrowser,
        store: Arc<InMemorySessionStore>,
        detail: Arc<RecordingDetailHandler>,
        progress: Arc<RecordingProgressReporter>,
        scraper: BatchMerchantScraper,
    }

    /// Reporter that takes `delay` per push before recording it
    struct SlowProgressReporter {
        inner: Arc<RecordingProgressReporter>,
        delay: Duration,
    }

    #[async_trait]
    impl ProgressReporter for SlowProgressReporter {
        async fn report(&self, snapshot: &ProgressSnapshot) -> crate::error::Result<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.report(snapshot).await
        }
    }

    fn harness(merchants: usize) -> Harness {
        harness_with_report_delay(merchants, Duration::ZERO)
    }

    fn harness_with_report_delay(merchants: usize, report_delay: Duration) -> Harness {
        let defaults = LoginConfig::default();
        let browser = FakeBrowser::new();
        browser.require_login(LOGIN, "https://portal.test/app", "auth");
        browser.set_submit_selector(defaults.submit_selector.clone());
        browser.set_fixture(
            LOGIN,
            FakePageFixture::new("Sign in")
                .with_selector(defaults.form_selector.clone())
                .with_selector(defaults.username_selector.clone())
                .with_selector(defaults.password_selector.clone())
                .with_selector(defaults.submit_selector.clone()),
        );
        browser.set_fixture(
            DASHBOARD,
            FakePageFixture::new("Dashboard").with_selector(".user-menu"),
        );
        for i in 0..merchants {
            browser.set_fixture(
                merchant(i),
                FakePageFixture::new(format!("Merchant {}", i)).with_selector(".user-menu"),
            );
        }
        browser.push_submit_outcome(SubmitOutcome::Accept {
            url: DASHBOARD.to_string(),
        });

        let clock = Arc::new(ManualClock::new(NOW));
        let store = Arc::new(InMemorySessionStore::new());
        let sessions = Arc::new(SessionManager::new(
            store.clone(),
            None,
            Duration::from_millis(HOUR_MS as u64),
            clock.clone(),
        ));
        let captcha = Arc::new(CaptchaHandler::new(
            Arc::new(ScriptedCaptchaSolver::new(Vec::new())),
            CaptchaConfig::default(),
        ));
        let login = Arc::new(LoginHandler::new(
            LoginConfig {
                login_url: LOGIN.to_string(),
                authenticated_url: DASHBOARD.to_string(),
                navigation_backoff_ms: 1,
                navigation_timeout_ms: 200,
                form_timeout_ms: 200,
                settle_ms: 0,
                ..defaults
            },
            captcha,
        ));
        let detail = Arc::new(RecordingDetailHandler::new());
        let progress = Arc::new(RecordingProgressReporter::new());
        let reporter: Arc<dyn ProgressReporter> = if report_delay.is_zero() {
            progress.clone()
        } else {
            Arc::new(SlowProgressReporter {
                inner: progress.clone(),
                delay: report_delay,
            })
        };
        let scraper = BatchMerchantScraper::new(
            Arc::new(browser.clone()),
            sessions,
            login,
            detail.clone(),
            reporter,
            clock,
        )
        .with_navigation_timeout(Duration::from_millis(50));

        Harness {
            browser,
            store,
            detail,
            progress,
            scraper,
        }
    }

    fn params(merchants: usize, concurrency: usize) -> BatchParams {
        BatchParams {
            execution_id: "exec-1".to_string(),
            targets: (0..merchants).map(|i| MerchantTarget::from_url(&merchant(i))).collect(),
            credentials: Some(Credentials::new("alice", "s3cret")),
            options: ScrapeOptions {
                concurrency,
                min_delay_ms: 0,
                max_delay_ms: 5,
                ..ScrapeOptions::default()
            },
            logger: Arc::new(NullExecutionLog),
            cancel: CancelFlag::new(),
            observer: None,
        }
    }

    fn session(saved_at: i64) -> SessionState {
        SessionState {
            identity: "alice".to_string(),
            cookies: vec![SessionCookie::new("auth", "token-old", "portal.test")],
            origins: Vec::new(),
            saved_at,
        }
    }

    #[tokio::test]
    async fn test_every_task_processed_exactly_once() {
        let h = harness(7);
        let result = h.scraper.run(params(7, 3)).await.unwrap();

        assert!(result.success);
        assert_eq!((result.total, result.completed, result.failed), (7, 7, 0));
        let counts = h.detail.claim_counts();
        assert_eq!(counts.len(), 7);
        assert!(counts.values().all(|n| *n == 1));
        assert_eq!(h.browser.pages_opened(), 3);
        assert_eq!(h.browser.pages_closed(), 3);
        assert_eq!(h.browser.contexts_closed(), 1);
        assert_eq!(h.store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_navigation_timeout_fails_only_that_task() {
        let h = harness(5);
        h.browser.fail_url(merchant(3));

        let result = h.scraper.run(params(5, 2)).await.unwrap();

        assert!(!result.success);
        assert_eq!((result.total, result.completed, result.failed), (5, 4, 1));
        let failed = &result.failed_tasks[0];
        assert_eq!(failed.target.url, merchant(3));
        assert!(failed.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_worker_panic_still_cleans_up() {
        let h = harness(4);
        h.browser.panic_on(merchant(0));

        let result = h.scraper.run(params(4, 2)).await.unwrap();

        let aborted: Vec<_> = result
            .failed_tasks
            .iter()
            .filter(|t| t.error.as_deref() == Some(WORKER_ABORTED))
            .collect();
        assert_eq!(aborted.len(), 1);
        assert_eq!(aborted[0].target.url, merchant(0));
        assert_eq!(result.completed + result.failed, 4);
        assert_eq!(h.browser.pages_closed(), h.browser.pages_opened());
        assert_eq!(h.browser.contexts_closed(), 1);
    }

    #[tokio::test]
    async fn test_fresh_session_skips_login() {
        let h = harness(2);
        h.store.put(session(NOW - 10 * 60 * 1000));

        let result = h.scraper.run(params(2, 1)).await.unwrap();

        assert!(result.success);
        assert_eq!(h.browser.submissions(), 0);
        assert_eq!(h.browser.navigation_count(LOGIN), 0);
    }

    #[tokio::test]
    async fn test_expired_session_is_not_reused() {
        let h = harness(2);
        h.store.put(session(NOW - 2 * HOUR_MS));

        let result = h.scraper.run(params(2, 2)).await.unwrap();

        assert!(result.success);
        assert_eq!(h.browser.submissions(), 1);
        let saved = h.store.get("alice").unwrap();
        assert_eq!(saved.saved_at, NOW);
        assert!(saved.cookies.iter().any(|c| c.value != "token-old"));
    }

    #[tokio::test]
    async fn test_failed_login_fails_batch_and_closes_pages() {
        let h = harness(3);
        h.browser.set_fixture(LOGIN, FakePageFixture::new("Scheduled maintenance"));

        let err = h.scraper.run(params(3, 2)).await.unwrap_err();

        assert!(matches!(err, ScrapeError::Login { .. }), "{:?}", err);
        assert!(h.detail.extracted().is_empty());
        assert_eq!(h.browser.pages_closed(), 2);
        assert_eq!(h.browser.contexts_closed(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_batch_fails_unclaimed_tasks() {
        let h = harness(3);
        let params = params(3, 2);
        params.cancel.cancel();

        let result = h.scraper.run(params).await.unwrap();

        assert_eq!(result.failed, 3);
        assert!(result
            .failed_tasks
            .iter()
            .all(|t| t.error.as_deref() == Some(BATCH_CANCELLED)));
        assert!(h.detail.extracted().is_empty());
    }

    #[tokio::test]
    async fn test_progress_ends_with_finished_snapshot() {
        let h = harness(3);
        h.scraper.run(params(3, 2)).await.unwrap();

        let snapshots = h.progress.snapshots();
        assert_eq!(snapshots.first().unwrap().phase, "login");
        let last = snapshots.last().unwrap();
        assert_eq!(last.phase, "finished");
        assert_eq!(last.progress.percentage, 100.0);
        assert_eq!(last.progress.completed, 3);
    }

    #[tokio::test]
    async fn test_slow_progress_endpoint_does_not_stall_workers() {
        let h = harness_with_report_delay(3, Duration::from_millis(200));

        let extraction_time = async {
            let started = std::time::Instant::now();
            while h.detail.extracted().len() < 3 && started.elapsed() < Duration::from_secs(5) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            started.elapsed()
        };
        let (result, extraction_time) = tokio::join!(h.scraper.run(params(3, 1)), extraction_time);

        let result = result.unwrap();
        assert_eq!(result.completed, 3);
        // Three awaited pushes would already cost 600ms before the first extraction
        assert!(
            extraction_time < Duration::from_millis(400),
            "extractions took {:?}",
            extraction_time
        );

        // login, scraping, two per task, finished; all delivered in order before run returns
        let snapshots = h.progress.snapshots();
        assert_eq!(snapshots.len(), 9);
        assert_eq!(snapshots.first().unwrap().phase, "login");
        assert_eq!(snapshots.last().unwrap().phase, "finished");
    }

    #[tokio::test]
    async fn test_request_budget_caps_targets() {
        let h = harness(5);
        let mut params = params(5, 2);
        params.options.max_requests = Some(2);
        params.options.max_results = Some(4);

        let result = h.scraper.run(params).await.unwrap();

        assert_eq!((result.total, result.completed), (2, 2));
        assert_eq!(h.detail.extracted().len(), 2);
        for i in 2..5 {
            assert_eq!(h.browser.navigation_count(&merchant(i)), 0);
        }
    }

    #[derive(Default)]
    struct Tally {
        completed: Mutex<Vec<String>>,
        failed: Mutex<Vec<String>>,
    }

    impl BatchObserver for Tally {
        fn on_task_completed(&self, task: &MerchantTask) {
            assert_eq!(task.status, MerchantTaskStatus::Completed);
            self.completed.lock().unwrap().push(task.id.clone());
        }

        fn on_task_failed(&self, task: &MerchantTask) {
            self.failed.lock().unwrap().push(task.id.clone());
        }
    }

    #[tokio::test]
    async fn test_observer_sees_each_terminal_task() {
        let h = harness(4);
        h.detail.fail_for(merchant(1));
        let tally = Arc::new(Tally::default());
        let mut params = params(4, 2);
        params.observer = Some(tally.clone());

        h.scraper.run(params).await.unwrap();

        assert_eq!(tally.completed.lock().unwrap().len(), 3);
        assert_eq!(*tally.failed.lock().unwrap(), vec!["task-1".to_string()]);
    }
}
