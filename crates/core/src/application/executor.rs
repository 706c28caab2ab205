// TaskExecutor - runs exactly one queued execution to completion

use crate::application::best_effort::best_effort;
use crate::application::logging::ExecutionLoggerFactory;
use crate::application::registry::SiteRegistry;
use crate::application::taxonomy::TaxonomyBuilder;
use crate::domain::{
    ExecutionId, ExecutionMetrics, ExecutionRecord, ExecutionStatus, JobDefinition, LogLevel,
    ScrapedItem,
};
use crate::error::{AppError, Result};
use crate::port::{
    ExecutionLog, ExecutionRepository, ItemRepository, JobDefinitionRepository, ScrapeOptions,
    ScrapeRequest, TimeProvider,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

pub struct TaskExecutor {
    executions: Arc<dyn ExecutionRepository>,
    jobs: Arc<dyn JobDefinitionRepository>,
    items: Arc<dyn ItemRepository>,
    registry: Arc<SiteRegistry>,
    loggers: ExecutionLoggerFactory,
    time_provider: Arc<dyn TimeProvider>,
}

impl TaskExecutor {
    pub fn new(
        executions: Arc<dyn ExecutionRepository>,
        jobs: Arc<dyn JobDefinitionRepository>,
        items: Arc<dyn ItemRepository>,
        registry: Arc<SiteRegistry>,
        loggers: ExecutionLoggerFactory,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            executions,
            jobs,
            items,
            registry,
            loggers,
            time_provider,
        }
    }

    /// Run one QUEUED execution and persist its terminal state
    ///
    /// Scrape failures are recorded on the execution and returned as `Ok`
    /// with status FAILED. `Err` means the record itself could not be
    /// loaded or written.
    pub async fn execute_task(&self, execution_id: &ExecutionId) -> Result<ExecutionRecord> {
        let mut execution = match self.executions.find_by_id(execution_id).await? {
            Some(e) => e,
            None => {
                error!(execution_id = %execution_id, "Execution record missing, cannot run");
                return Err(AppError::NotFound(format!("execution {}", execution_id)));
            }
        };

        let job = match self.jobs.find_by_id(&execution.job_definition_id).await? {
            Some(job) => job,
            None => {
                let message = format!("job definition {} not found", execution.job_definition_id);
                error!(execution_id = %execution_id, "{}", message);
                execution.fail(self.time_provider.now_millis(), &message, None)?;
                self.executions.update(&execution).await?;
                return Ok(execution);
            }
        };

        if execution.status != ExecutionStatus::Queued {
            return Err(AppError::InvalidState(format!(
                "execution {} is {}, expected QUEUED",
                execution_id, execution.status
            )));
        }
        execution.start(self.time_provider.now_millis())?;
        self.executions.update(&execution).await?;

        let logger = self.loggers.for_execution(execution_id, job.verbose);
        logger
            .log(
                LogLevel::Info,
                "Execution started",
                Some(json!({
                    "jobDefinitionId": job.id,
                    "site": job.site_key,
                    "trigger": execution.trigger_type,
                    "startUrls": job.start_urls.len(),
                })),
            )
            .await;
        info!(execution_id = %execution_id, job_definition_id = %job.id, site = %job.site_key, "Execution started");

        match self.run(&execution, &job, logger.clone()).await {
            Ok(metrics) => {
                logger
                    .log(
                        LogLevel::Info,
                        "Execution completed",
                        Some(json!({
                            "itemsFound": metrics.items_found,
                            "itemsSaved": metrics.items_saved,
                            "itemsFailed": metrics.items_failed,
                        })),
                    )
                    .await;
                info!(
                    execution_id = %execution_id,
                    items_found = metrics.items_found,
                    items_saved = metrics.items_saved,
                    items_failed = metrics.items_failed,
                    "Execution completed"
                );
                execution.complete(self.time_provider.now_millis(), metrics)?;
            }
            Err(e) => {
                let message = e.to_string();
                logger
                    .log(LogLevel::Error, &format!("Execution failed: {}", message), None)
                    .await;
                error!(execution_id = %execution_id, error = %message, "Execution failed");
                execution.fail(self.time_provider.now_millis(), &message, Some(&e.chain()))?;
            }
        }

        self.executions.update(&execution).await?;
        Ok(execution)
    }

    async fn run(
        &self,
        execution: &ExecutionRecord,
        job: &JobDefinition,
        logger: Arc<dyn ExecutionLog>,
    ) -> Result<ExecutionMetrics> {
        let (site, scraper) = self.registry.resolve(&job.site_key)?;
        if job.start_urls.is_empty() {
            return Err(AppError::Validation(format!(
                "job definition {} has no start URLs",
                job.id
            )));
        }

        let options = ScrapeOptions::normalized(&job.limits);
        logger
            .log(
                LogLevel::Debug,
                "Resolved scraper",
                Some(json!({
                    "site": site.as_str(),
                    "concurrency": options.concurrency,
                    "maxRequests": options.max_requests,
                    "maxPages": options.max_pages,
                    "maxResults": options.max_results,
                })),
            )
            .await;

        let request = ScrapeRequest {
            execution_id: execution.id.clone(),
            site,
            start_urls: job.start_urls.clone(),
            credentials: job.credentials.clone(),
            options: options.clone(),
            logger: logger.clone(),
        };
        let mut items = scraper.scrape(request).await?;
        if let Some(cap) = options.max_results {
            items.truncate(cap as usize);
        }

        self.persist_items(&mut items, logger.as_ref()).await
    }

    async fn persist_items(
        &self,
        items: &mut [ScrapedItem],
        logger: &dyn ExecutionLog,
    ) -> Result<ExecutionMetrics> {
        let mut metrics = ExecutionMetrics::found(items.len() as u64);
        let mut taxonomy = TaxonomyBuilder::new();

        for item in items.iter_mut() {
            for category in taxonomy.assign(item) {
                best_effort("category upsert", self.items.upsert_category(&category)).await;
            }
            match self.items.upsert_item(item).await {
                Ok(_) => metrics.record_saved(),
                Err(e) => {
                    let message = format!("{}: {}", item.url, e);
                    logger
                        .log(LogLevel::Warn, "Failed to save item", Some(json!({ "error": message })))
                        .await;
                    metrics.record_failure(message);
                }
            }
        }
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobDefinition, SiteKey, TriggerType};
    use crate::port::execution_repository::mocks::InMemoryExecutionRepository;
    use crate::port::item_repository::mocks::InMemoryItemRepository;
    use crate::port::job_definition_repository::mocks::InMemoryJobDefinitionRepository;
    use crate::port::log_sink::mocks::MemoryLogSink;
    use crate::port::site_scraper::mocks::{StubBehavior, StubScraper};
    use crate::port::time_provider::mocks::ManualClock;
    use crate::port::{BrowserError, ScrapeError};
    use std::time::Duration;

    struct Harness {
        executions: Arc<InMemoryExecutionRepository>,
        items: Arc<InMemoryItemRepository>,
        logs: Arc<MemoryLogSink>,
        scraper: Arc<StubScraper>,
        executor: TaskExecutor,
    }

    fn harness(job: JobDefinition) -> Harness {
        let executions = Arc::new(InMemoryExecutionRepository::new());
        let items = Arc::new(InMemoryItemRepository::new());
        let logs = Arc::new(MemoryLogSink::new());
        let scraper = Arc::new(StubScraper::items(SiteKey::ProductCatalog, Duration::ZERO));
        let clock = Arc::new(ManualClock::new(5_000));
        let executor = TaskExecutor::new(
            executions.clone(),
            Arc::new(InMemoryJobDefinitionRepository::with([job])),
            items.clone(),
            Arc::new(SiteRegistry::new().register(scraper.clone())),
            ExecutionLoggerFactory::new(logs.clone(), None, clock.clone()),
            clock,
        );
        Harness {
            executions,
            items,
            logs,
            scraper,
            executor,
        }
    }

    fn catalog_job(urls: &[&str]) -> JobDefinition {
        JobDefinition::new(
            "job-1",
            "Catalog",
            SiteKey::ProductCatalog,
            urls.iter().map(|u| u.to_string()).collect(),
            0,
        )
    }

    fn queued(h: &Harness) -> ExecutionId {
        h.executions
            .seed(ExecutionRecord::new("exec-1", "job-1", TriggerType::Manual, 1_000));
        "exec-1".to_string()
    }

    #[tokio::test]
    async fn test_success_persists_items_and_metrics() {
        let h = harness(catalog_job(&[
            "https://shop.test/tools/saw-1",
            "https://shop.test/tools/drill-2",
        ]));
        let id = queued(&h);

        let record = h.executor.execute_task(&id).await.unwrap();

        assert_eq!(record.status, ExecutionStatus::Completed);
        let metrics = record.metrics.unwrap();
        assert_eq!(metrics.items_found, 2);
        assert_eq!(metrics.items_saved, 2);
        assert_eq!(h.items.items().len(), 2);
        assert_eq!(h.items.categories().len(), 1);
        assert_eq!(
            h.executions.statuses_of(&id),
            vec![ExecutionStatus::Running, ExecutionStatus::Completed]
        );
        assert!(h
            .logs
            .messages_for(&id)
            .contains(&"Execution completed".to_string()));
    }

    #[tokio::test]
    async fn test_rescrape_overwrites_instead_of_duplicating() {
        let h = harness(catalog_job(&["https://shop.test/a/1"]));
        let id = queued(&h);
        h.executor.execute_task(&id).await.unwrap();

        h.executions
            .seed(ExecutionRecord::new("exec-2", "job-1", TriggerType::Manual, 2_000));
        h.executor.execute_task(&"exec-2".to_string()).await.unwrap();

        assert_eq!(h.items.items().len(), 1);
    }

    #[tokio::test]
    async fn test_item_save_failures_are_counted_not_fatal() {
        let h = harness(catalog_job(&["https://shop.test/a/1", "https://shop.test/a/2"]));
        h.items.reject_url("https://shop.test/a/2");
        let id = queued(&h);

        let record = h.executor.execute_task(&id).await.unwrap();

        assert_eq!(record.status, ExecutionStatus::Completed);
        let metrics = record.metrics.unwrap();
        assert_eq!(metrics.items_saved, 1);
        assert_eq!(metrics.items_failed, 1);
        assert!(metrics.errors[0].starts_with("https://shop.test/a/2"));
    }

    #[tokio::test]
    async fn test_scrape_error_marks_failed_with_chain() {
        let h = harness(catalog_job(&["https://shop.test/a/1"]));
        h.scraper
            .set_behavior(StubBehavior::Fail(ScrapeError::Browser(BrowserError::Timeout {
                what: "navigation to https://shop.test/a/1".to_string(),
                timeout_ms: 30_000,
            })));
        let id = queued(&h);

        let record = h.executor.execute_task(&id).await.unwrap();

        assert_eq!(record.status, ExecutionStatus::Failed);
        assert!(record.error_message.unwrap().contains("30000ms"));
        assert!(record.error_stack.unwrap().contains("caused by"));
    }

    #[tokio::test]
    async fn test_unsupported_site_fails_execution() {
        let mut job = catalog_job(&["https://shop.test/a/1"]);
        job.site_key = "merchant_portal".to_string();
        let h = harness(job);
        let id = queued(&h);

        let record = h.executor.execute_task(&id).await.unwrap();
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert!(record.error_message.unwrap().contains("Unsupported site"));
        assert!(h.scraper.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_record_errors_loudly() {
        let h = harness(catalog_job(&["https://shop.test/a/1"]));
        let err = h
            .executor
            .execute_task(&"exec-404".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_log_sink_outage_does_not_abort_scrape() {
        let h = harness(catalog_job(&["https://shop.test/a/1"]));
        h.logs.set_failing(true);
        let id = queued(&h);

        let record = h.executor.execute_task(&id).await.unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
    }
}
