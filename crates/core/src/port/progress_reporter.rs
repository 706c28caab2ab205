// Progress Channel Port
//
// Fire-and-forget: callers log failures and move on.

use crate::domain::{BatchProgress, ExecutionId};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// JSON body pushed after every batch state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub execution_id: ExecutionId,
    /// Short phase label: "login", "scraping", "finished"
    pub phase: String,
    pub progress: BatchProgress,
    pub message: Option<String>,
    pub timestamp: i64,
}

#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report(&self, snapshot: &ProgressSnapshot) -> Result<()>;
}

/// Used when no progress endpoint is configured
pub struct NoopProgressReporter;

#[async_trait]
impl ProgressReporter for NoopProgressReporter {
    async fn report(&self, _snapshot: &ProgressSnapshot) -> Result<()> {
        Ok(())
    }
}

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingProgressReporter {
        snapshots: Mutex<Vec<ProgressSnapshot>>,
        failing: AtomicBool,
    }

    impl RecordingProgressReporter {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every report errors (still recorded)
        pub fn failing() -> Self {
            let reporter = Self::default();
            reporter.failing.store(true, Ordering::SeqCst);
            reporter
        }

        pub fn snapshots(&self) -> Vec<ProgressSnapshot> {
            self.snapshots.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProgressReporter for RecordingProgressReporter {
        async fn report(&self, snapshot: &ProgressSnapshot) -> Result<()> {
            self.snapshots.lock().unwrap().push(snapshot.clone());
            if self.failing.load(Ordering::SeqCst) {
                return Err(crate::AppError::Persistence(
                    "progress endpoint unreachable".to_string(),
                ));
            }
            Ok(())
        }
    }
}
