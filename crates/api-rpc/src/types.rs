//! RPC Request/Response Types
//!
//! Parameters are named objects in camelCase.

use scrapeflow_core::application::QueueStats;
use scrapeflow_core::domain::{ExecutionRecord, ExecutionStatus, LogEntry, TriggerType};
use serde::{Deserialize, Serialize};

/// executions.enqueue.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    pub job_definition_id: String,
    #[serde(default = "default_trigger")]
    pub trigger_type: TriggerType,
}

fn default_trigger() -> TriggerType {
    TriggerType::Api
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResponse {
    pub execution_id: String,
    pub status: ExecutionStatus,
}

/// executions.get.v1 / executions.cancel.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub execution_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResponse {
    pub execution: ExecutionRecord,
}

/// logs.tail.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TailLogsRequest {
    pub execution_id: String,
    #[serde(default = "default_lines")]
    pub lines: usize,
}

fn default_lines() -> usize {
    50
}

/// Hard cap on `lines`
pub const MAX_TAIL_LINES: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TailLogsResponse {
    pub execution_id: String,
    pub entries: Vec<LogEntry>,
}

/// admin.stats.v1 (no parameters)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub queue: QueueStats,
    pub queued_executions: i64,
    pub running_executions: i64,
    pub completed_executions: i64,
    pub failed_executions: i64,
    pub cancelled_executions: i64,
    pub uptime_seconds: u64,
}

/// admin.concurrency.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcurrencyRequest {
    pub max_concurrency: usize,
}
