//! Composition root
//!
//! Wires adapters into the core services and owns the process lifecycle:
//! migrate, recover, serve, schedule, then drain on Ctrl+C.

use crate::config::DaemonConfig;
use crate::extract::{SelectorDetailHandler, SelectorListingHandler};
use anyhow::{Context, Result};
use scrapeflow_api_rpc::{RpcHandler, RpcServer, RpcServerConfig};
use scrapeflow_core::application::{
    shutdown_channel, BatchMerchantScraper, CaptchaHandler, ExecutionLoggerFactory, JobScheduler,
    ListingCrawler, LoginHandler, ManualCaptchaSolver, MerchantPortalScraper, SessionManager,
    SiteRegistry, TaskExecutor, TaskQueueManager,
};
use scrapeflow_core::port::{
    BrowserLauncher, CaptchaMode, CaptchaSolver, LogMirror, NoopProgressReporter,
    ProgressReporter, SessionStore, SystemTimeProvider, TimeProvider, UuidProvider,
};
use scrapeflow_infra_browser::{ChromeConfig, ChromeLauncher};
use scrapeflow_infra_sqlite::{
    create_pool, run_migrations, SqliteExecutionRepository, SqliteItemRepository,
    SqliteJobDefinitionRepository, SqliteLogSink, SqliteSessionStore,
};
use scrapeflow_infra_system::{
    FileLogMirror, FileSessionStore, HttpProgressReporter, TwoCaptchaSolver,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const SCHEDULER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

fn captcha_solver(config: &DaemonConfig) -> Arc<dyn CaptchaSolver> {
    let settings = &config.captcha;
    match settings.mode {
        CaptchaMode::Manual => Arc::new(ManualCaptchaSolver::new(Duration::from_secs(
            settings.manual_timeout_secs,
        ))),
        CaptchaMode::Automated => Arc::new(TwoCaptchaSolver::new(
            settings.solver_url.clone(),
            settings.api_key.clone(),
            Duration::from_secs(settings.automated_timeout_secs),
        )),
    }
}

fn progress_reporter(config: &DaemonConfig) -> Result<Arc<dyn ProgressReporter>> {
    Ok(match &config.progress.base_url {
        Some(url) => Arc::new(
            HttpProgressReporter::new(url.clone(), Duration::from_secs(config.progress.timeout_secs))
                .context("progress reporter")?,
        ),
        None => {
            info!("No progress endpoint configured, progress is not pushed");
            Arc::new(NoopProgressReporter)
        }
    })
}

pub async fn run(config: DaemonConfig) -> Result<()> {
    // 1. Database
    let url = config.database_url();
    if let Some(parent) = url
        .strip_prefix("sqlite://")
        .map(PathBuf::from)
        .and_then(|p| p.parent().map(PathBuf::from))
    {
        std::fs::create_dir_all(&parent)
            .with_context(|| format!("cannot create database directory {}", parent.display()))?;
    }
    info!(database = %url, "Initializing database...");
    let pool = create_pool(&url).await.context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    // 2. Adapters
    let time: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let executions = Arc::new(SqliteExecutionRepository::new(pool.clone()));
    let jobs = Arc::new(SqliteJobDefinitionRepository::new(pool.clone()));
    let items = Arc::new(SqliteItemRepository::new(pool.clone(), time.clone()));
    let log_sink = Arc::new(SqliteLogSink::new(pool.clone()));
    let mirror = config
        .log_mirror_dir()
        .map(|dir| Arc::new(FileLogMirror::new(dir)) as Arc<dyn LogMirror>);
    let fallback_sessions = config
        .session_dir()
        .map(|dir| Arc::new(FileSessionStore::new(dir)) as Arc<dyn SessionStore>);

    let launcher: Arc<dyn BrowserLauncher> = Arc::new(ChromeLauncher::new(ChromeConfig {
        headless: config.browser.headless,
        executable: config.browser.executable.as_deref().map(|p| crate::config::expand(p).into()),
        extra_args: config.browser.extra_args.clone(),
        ..ChromeConfig::default()
    }));

    let (shutdown_tx, shutdown) = shutdown_channel();

    // 3. Site scrapers
    let sessions = Arc::new(SessionManager::new(
        Arc::new(SqliteSessionStore::new(pool.clone())),
        fallback_sessions,
        config.session_max_age(),
        time.clone(),
    ));
    let captcha = Arc::new(CaptchaHandler::new(
        captcha_solver(&config),
        config.captcha.detection.clone(),
    ));
    let login = Arc::new(LoginHandler::new(config.merchant_portal.clone(), captcha));
    let batch = Arc::new(
        BatchMerchantScraper::new(
            launcher.clone(),
            sessions,
            login,
            Arc::new(SelectorDetailHandler::new(config.extraction.clone())),
            progress_reporter(&config)?,
            time.clone(),
        )
        .with_navigation_timeout(config.navigation_timeout()),
    );
    let registry = SiteRegistry::new()
        .register(Arc::new(MerchantPortalScraper::new(batch, shutdown.clone())))
        .register(Arc::new(
            ListingCrawler::new(
                launcher,
                Arc::new(SelectorListingHandler::new(config.extraction.clone())),
                shutdown.clone(),
            )
            .with_navigation_timeout(config.navigation_timeout()),
        ));
    info!(sites = ?registry.sites(), "Site scrapers registered");

    // 4. Queue
    let executor = Arc::new(TaskExecutor::new(
        executions.clone(),
        jobs.clone(),
        items,
        Arc::new(registry),
        ExecutionLoggerFactory::new(log_sink.clone(), mirror, time.clone()),
        time.clone(),
    ));
    let queue = TaskQueueManager::new(
        executions.clone(),
        jobs.clone(),
        executor,
        Arc::new(UuidProvider),
        time.clone(),
    )
    .with_limits(config.queue.max_concurrency, config.shutdown_grace())
    .context("queue limits")?;

    info!("Running crash recovery...");
    let recovered = queue.initialize().await.context("queue initialization failed")?;
    info!(
        resumed = recovered.backlog.len(),
        interrupted = recovered.interrupted.len(),
        "Crash recovery completed"
    );

    // 5. Control surface
    let rpc_handle = RpcServer::new(
        RpcServerConfig {
            host: config.rpc.host.clone(),
            port: config.rpc.port,
        },
        RpcHandler::new(queue.clone(), executions.clone(), log_sink),
    )
    .start()
    .await
    .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    // 6. Scheduler
    let scheduler = config.scheduler.enabled.then(|| {
        let scheduler = JobScheduler::new(
            jobs,
            executions,
            queue.clone(),
            time,
            Duration::from_secs(config.scheduler.tick_secs),
        );
        tokio::spawn(scheduler.run(shutdown.clone()))
    });

    info!(
        max_concurrency = config.queue.max_concurrency,
        rpc_port = config.rpc.port,
        "System ready, press Ctrl+C to shut down"
    );

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await.context("signal handler")?;
    info!("Shutdown signal received");

    shutdown_tx.shutdown();
    if let Some(handle) = scheduler {
        if tokio::time::timeout(SCHEDULER_STOP_TIMEOUT, handle).await.is_err() {
            warn!("Scheduler did not stop in time");
        }
    }
    let report = queue.shutdown().await;
    if !report.abandoned.is_empty() {
        error!(abandoned = ?report.abandoned, "Executions abandoned, recovery marks them FAILED on next start");
    }

    if let Err(e) = rpc_handle.stop() {
        warn!(error = %e, "RPC server already stopped");
    }
    rpc_handle.stopped().await;
    pool.close().await;

    info!(still_queued = report.still_queued, "Shutdown complete");
    Ok(())
}
