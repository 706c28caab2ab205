// Merchant Batch Domain Models
//
// MerchantTask lives only for one batch run; BatchProgress and BatchResult
// are always recomputed from the task set.

use crate::domain::item::ScrapedItem;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a worker inside one batch
pub type WorkerId = usize;

/// One merchant detail page to scrape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantTarget {
    pub merchant_id: String,
    pub name: String,
    pub url: String,
}

impl MerchantTarget {
    /// Derive id and name from the last path segment of the URL
    pub fn from_url(url: &str) -> Self {
        let segment = url::Url::parse(url)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut segs| segs.rfind(|s| !s.is_empty()).map(str::to_string))
            })
            .unwrap_or_else(|| url.to_string());
        Self {
            merchant_id: segment.clone(),
            name: segment,
            url: url.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MerchantTaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl MerchantTaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, MerchantTaskStatus::Completed | MerchantTaskStatus::Failed)
    }
}

impl fmt::Display for MerchantTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MerchantTaskStatus::Pending => "PENDING",
            MerchantTaskStatus::Running => "RUNNING",
            MerchantTaskStatus::Completed => "COMPLETED",
            MerchantTaskStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantTask {
    pub id: String,
    pub target: MerchantTarget,
    pub status: MerchantTaskStatus,
    /// Never incremented: tasks are not retried automatically
    pub retry_count: u32,
    pub claimed_by: Option<WorkerId>,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub result: Option<ScrapedItem>,
    pub error: Option<String>,
}

impl MerchantTask {
    pub fn new(index: usize, target: MerchantTarget) -> Self {
        Self {
            id: format!("task-{}", index),
            target,
            status: MerchantTaskStatus::Pending,
            retry_count: 0,
            claimed_by: None,
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
        }
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

/// Snapshot of a running batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub running: usize,
    pub pending: usize,
    pub percentage: f64,
    pub elapsed_ms: i64,
    /// Advisory only
    pub estimated_remaining_ms: Option<i64>,
}

impl BatchProgress {
    pub fn compute<'a, I>(tasks: I, elapsed_ms: i64, workers: usize) -> Self
    where
        I: IntoIterator<Item = &'a MerchantTask>,
    {
        let (mut total, mut completed, mut failed, mut running, mut pending) = (0, 0, 0, 0, 0);
        for task in tasks {
            total += 1;
            match task.status {
                MerchantTaskStatus::Pending => pending += 1,
                MerchantTaskStatus::Running => running += 1,
                MerchantTaskStatus::Completed => completed += 1,
                MerchantTaskStatus::Failed => failed += 1,
            }
        }

        let processed = completed + failed;
        let percentage = if total == 0 {
            100.0
        } else {
            (processed as f64 / total as f64 * 1000.0).round() / 10.0
        };
        let remaining = total - processed;
        let estimated_remaining_ms = if processed == 0 {
            None
        } else {
            let per_task = elapsed_ms as f64 / processed as f64;
            Some((per_task * remaining as f64 / workers.max(1) as f64).round() as i64)
        };

        Self {
            total,
            completed,
            failed,
            running,
            pending,
            percentage,
            elapsed_ms,
            estimated_remaining_ms,
        }
    }
}

/// Aggregated outcome of one batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub success: bool,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Completion order, not input order
    pub completed_tasks: Vec<MerchantTask>,
    pub failed_tasks: Vec<MerchantTask>,
    pub total_time_ms: i64,
    pub avg_time_per_task_ms: i64,
}
