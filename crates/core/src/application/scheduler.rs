// Interval Scheduler
// Enqueues enabled job definitions whose fixed interval has elapsed

use crate::application::queue::TaskQueueManager;
use crate::application::shutdown::ShutdownToken;
use crate::domain::{ExecutionRecord, JobDefinition, TriggerType};
use crate::error::Result;
use crate::port::{ExecutionRepository, JobDefinitionRepository, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

pub struct JobScheduler {
    jobs: Arc<dyn JobDefinitionRepository>,
    executions: Arc<dyn ExecutionRepository>,
    queue: TaskQueueManager,
    time_provider: Arc<dyn TimeProvider>,
    tick_interval: Duration,
}

impl JobScheduler {
    pub fn new(
        jobs: Arc<dyn JobDefinitionRepository>,
        executions: Arc<dyn ExecutionRepository>,
        queue: TaskQueueManager,
        time_provider: Arc<dyn TimeProvider>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            jobs,
            executions,
            queue,
            time_provider,
            tick_interval,
        }
    }

    /// Scheduler loop; spawn it and stop it with the shutdown token
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(tick_secs = self.tick_interval.as_secs(), "Job scheduler started");
        let mut tick = interval(self.tick_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Job scheduler stopped");
                    return;
                }
                _ = tick.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "Scheduler tick failed");
                    }
                }
            }
        }
    }

    /// One pass over the enabled definitions
    ///
    /// A job with no execution yet is due immediately. Jobs that still have
    /// a QUEUED or RUNNING execution are skipped.
    pub async fn tick(&self) -> Result<Vec<ExecutionRecord>> {
        let now = self.time_provider.now_millis();
        let mut enqueued = Vec::new();

        for job in self.jobs.list_enabled().await? {
            let Some(schedule) = &job.schedule else {
                continue;
            };
            match self.is_due(&job, schedule.interval_ms(), now).await {
                Ok(false) => {}
                Ok(true) => match self.queue.enqueue(&job.id, TriggerType::Scheduled).await {
                    Ok(record) => {
                        info!(
                            job_id = %job.id,
                            execution_id = %record.id,
                            interval_minutes = schedule.interval_minutes,
                            "Scheduled execution enqueued"
                        );
                        enqueued.push(record);
                    }
                    Err(e) => warn!(job_id = %job.id, error = %e, "Scheduled enqueue rejected"),
                },
                Err(e) => warn!(job_id = %job.id, error = %e, "Cannot evaluate schedule"),
            }
        }
        Ok(enqueued)
    }

    async fn is_due(&self, job: &JobDefinition, interval_ms: i64, now: i64) -> Result<bool> {
        if self.executions.has_active_for_job(&job.id).await? {
            debug!(job_id = %job.id, "Job still active, not scheduling");
            return Ok(false);
        }
        Ok(match self.executions.latest_for_job(&job.id).await? {
            Some(last) => now - last.created_at >= interval_ms,
            None => true,
        })
    }
}
