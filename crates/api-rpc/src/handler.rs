//! RPC Method Handlers

use crate::error::to_rpc_error;
use crate::types::{
    ConcurrencyRequest, EnqueueRequest, EnqueueResponse, ExecutionRequest, ExecutionResponse,
    StatsRequest, StatsResponse, TailLogsRequest, TailLogsResponse, MAX_TAIL_LINES,
};
use jsonrpsee::types::ErrorObjectOwned;
use scrapeflow_core::application::{QueueStats, TaskQueueManager};
use scrapeflow_core::domain::ExecutionStatus;
use scrapeflow_core::error::AppError;
use scrapeflow_core::port::{ExecutionRepository, LogSink};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    queue: TaskQueueManager,
    executions: Arc<dyn ExecutionRepository>,
    logs: Arc<dyn LogSink>,
    start_time: Instant,
}

impl RpcHandler {
    pub fn new(
        queue: TaskQueueManager,
        executions: Arc<dyn ExecutionRepository>,
        logs: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            queue,
            executions,
            logs,
            start_time: Instant::now(),
        }
    }

    /// executions.enqueue.v1
    pub async fn enqueue(&self, params: EnqueueRequest) -> Result<EnqueueResponse, ErrorObjectOwned> {
        let record = self
            .queue
            .enqueue(&params.job_definition_id, params.trigger_type)
            .await
            .map_err(to_rpc_error)?;
        Ok(EnqueueResponse {
            execution_id: record.id,
            status: record.status,
        })
    }

    /// executions.get.v1
    pub async fn get(&self, params: ExecutionRequest) -> Result<ExecutionResponse, ErrorObjectOwned> {
        let execution = self
            .executions
            .find_by_id(&params.execution_id)
            .await
            .map_err(to_rpc_error)?
            .ok_or_else(|| {
                to_rpc_error(AppError::NotFound(format!("execution {}", params.execution_id)))
            })?;
        Ok(ExecutionResponse { execution })
    }

    /// executions.cancel.v1
    pub async fn cancel(&self, params: ExecutionRequest) -> Result<ExecutionResponse, ErrorObjectOwned> {
        let execution = self
            .queue
            .cancel(&params.execution_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(ExecutionResponse { execution })
    }

    /// logs.tail.v1
    pub async fn tail_logs(&self, params: TailLogsRequest) -> Result<TailLogsResponse, ErrorObjectOwned> {
        let lines = params.lines.clamp(1, MAX_TAIL_LINES);
        let entries = self
            .logs
            .tail(&params.execution_id, lines)
            .await
            .map_err(to_rpc_error)?;
        debug!(execution_id = %params.execution_id, returned = entries.len(), "Tailed logs");
        Ok(TailLogsResponse {
            execution_id: params.execution_id,
            entries,
        })
    }

    /// admin.stats.v1
    pub async fn stats(&self, _params: StatsRequest) -> Result<StatsResponse, ErrorObjectOwned> {
        let count = |status| async move {
            self.executions
                .count_by_status(status)
                .await
                .map_err(to_rpc_error)
        };

        Ok(StatsResponse {
            queue: self.queue.stats(),
            queued_executions: count(ExecutionStatus::Queued).await?,
            running_executions: count(ExecutionStatus::Running).await?,
            completed_executions: count(ExecutionStatus::Completed).await?,
            failed_executions: count(ExecutionStatus::Failed).await?,
            cancelled_executions: count(ExecutionStatus::Cancelled).await?,
            uptime_seconds: self.start_time.elapsed().as_secs(),
        })
    }

    /// admin.concurrency.v1
    pub async fn set_concurrency(&self, params: ConcurrencyRequest) -> Result<QueueStats, ErrorObjectOwned> {
        self.queue
            .set_max_concurrency(params.max_concurrency)
            .map_err(to_rpc_error)?;
        Ok(self.queue.stats())
    }
}
