// Execution Record Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::job_definition::JobDefinitionId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Execution ID (UUID v4)
pub type ExecutionId = String;

/// Maximum stored length of a failure message (chars)
pub const MAX_ERROR_MESSAGE_CHARS: usize = 2000;

/// Maximum stored length of a failure stack / source chain (chars)
pub const MAX_ERROR_STACK_CHARS: usize = 4000;

/// Number of per-item errors kept in execution metrics
pub const MAX_METRIC_ERRORS: usize = 5;

/// Execution lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Queued => "QUEUED",
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Completed => "COMPLETED",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Cancelled => "CANCELLED",
        }
    }

    /// COMPLETED, FAILED and CANCELLED never change again
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "QUEUED" => Ok(ExecutionStatus::Queued),
            "RUNNING" => Ok(ExecutionStatus::Running),
            "COMPLETED" => Ok(ExecutionStatus::Completed),
            "FAILED" => Ok(ExecutionStatus::Failed),
            "CANCELLED" => Ok(ExecutionStatus::Cancelled),
            other => Err(DomainError::UnknownVariant {
                kind: "execution status",
                value: other.to_string(),
            }),
        }
    }
}

/// What caused an execution to be enqueued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    Manual,
    Scheduled,
    Api,
}

impl TriggerType {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerType::Manual => "MANUAL",
            TriggerType::Scheduled => "SCHEDULED",
            TriggerType::Api => "API",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "MANUAL" => Ok(TriggerType::Manual),
            "SCHEDULED" => Ok(TriggerType::Scheduled),
            "API" => Ok(TriggerType::Api),
            other => Err(DomainError::UnknownVariant {
                kind: "trigger type",
                value: other.to_string(),
            }),
        }
    }
}

/// Counters stored on a finished execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub items_found: u64,
    pub items_saved: u64,
    pub items_failed: u64,
    /// First few per-item errors, in the order they happened
    pub errors: Vec<String>,
}

impl ExecutionMetrics {
    pub fn found(items_found: u64) -> Self {
        Self {
            items_found,
            ..Self::default()
        }
    }

    pub fn record_saved(&mut self) {
        self.items_saved += 1;
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.items_failed += 1;
        if self.errors.len() < MAX_METRIC_ERRORS {
            self.errors.push(error.into());
        }
    }
}

/// One run of a job definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: ExecutionId,
    pub job_definition_id: JobDefinitionId,
    pub trigger_type: TriggerType,
    pub status: ExecutionStatus,

    pub created_at: i64, // epoch ms
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,

    pub metrics: Option<ExecutionMetrics>,
    pub error_message: Option<String>,
    pub error_stack: Option<String>,
}

impl ExecutionRecord {
    /// Create a new QUEUED record
    ///
    /// ID and timestamp are injected so tests stay deterministic.
    pub fn new(
        id: impl Into<String>,
        job_definition_id: impl Into<String>,
        trigger_type: TriggerType,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            job_definition_id: job_definition_id.into(),
            trigger_type,
            status: ExecutionStatus::Queued,
            created_at,
            started_at: None,
            finished_at: None,
            metrics: None,
            error_message: None,
            error_stack: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// QUEUED -> RUNNING
    pub fn start(&mut self, now_millis: i64) -> Result<()> {
        self.require(ExecutionStatus::Queued, ExecutionStatus::Running)?;
        self.status = ExecutionStatus::Running;
        self.started_at = Some(now_millis);
        Ok(())
    }

    /// RUNNING -> COMPLETED
    pub fn complete(&mut self, now_millis: i64, metrics: ExecutionMetrics) -> Result<()> {
        self.require(ExecutionStatus::Running, ExecutionStatus::Completed)?;
        self.status = ExecutionStatus::Completed;
        self.finished_at = Some(now_millis);
        self.metrics = Some(metrics);
        Ok(())
    }

    /// QUEUED | RUNNING -> FAILED, with bounded message and stack
    pub fn fail(&mut self, now_millis: i64, message: &str, stack: Option<&str>) -> Result<()> {
        if self.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: ExecutionStatus::Failed.to_string(),
            });
        }
        self.status = ExecutionStatus::Failed;
        self.finished_at = Some(now_millis);
        self.error_message = Some(truncate_chars(message, MAX_ERROR_MESSAGE_CHARS));
        self.error_stack = stack.map(|s| truncate_chars(s, MAX_ERROR_STACK_CHARS));
        Ok(())
    }

    /// QUEUED -> CANCELLED
    pub fn cancel(&mut self, now_millis: i64) -> Result<()> {
        self.require(ExecutionStatus::Queued, ExecutionStatus::Cancelled)?;
        self.status = ExecutionStatus::Cancelled;
        self.finished_at = Some(now_millis);
        Ok(())
    }

    fn require(&self, expected: ExecutionStatus, to: ExecutionStatus) -> Result<()> {
        if self.status != expected {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }
}

/// Truncate to at most `max` chars without splitting a UTF-8 sequence
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((byte_idx, _)) => s[..byte_idx].to_string(),
        None => s.to_string(),
    }
}
