// Crash recovery of execution records
//
// The queue lives in memory; after a crash it is rebuilt from storage.
// QUEUED records are resumed by the queue manager. RUNNING records belong to
// a process that no longer exists and are failed here.

use crate::application::constants::INTERRUPTED_BY_RESTART;
use crate::domain::{ExecutionId, ExecutionRecord, ExecutionStatus};
use crate::port::{ExecutionRepository, TimeProvider};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// What `RecoveryService::recover` found in storage
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// RUNNING records marked FAILED
    pub interrupted: Vec<ExecutionId>,
    /// QUEUED records, oldest first
    pub backlog: Vec<ExecutionId>,
}

pub struct RecoveryService {
    executions: Arc<dyn ExecutionRepository>,
    time_provider: Arc<dyn TimeProvider>,
}

impl RecoveryService {
    pub fn new(
        executions: Arc<dyn ExecutionRepository>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            executions,
            time_provider,
        }
    }

    /// Fail orphaned RUNNING records and list the QUEUED backlog
    ///
    /// `live` holds ids this process is running right now; they are left alone.
    /// Nothing may start while this runs, or a fresh RUNNING record looks orphaned.
    pub async fn recover(&self, live: &HashSet<ExecutionId>) -> crate::error::Result<RecoveryReport> {
        let mut report = RecoveryReport::default();

        let running = self.executions.find_by_status(ExecutionStatus::Running).await?;
        for mut record in running {
            if live.contains(&record.id) {
                continue;
            }
            warn!(
                execution_id = %record.id,
                job_definition_id = %record.job_definition_id,
                started_at = ?record.started_at,
                "Found RUNNING execution from a previous process, marking FAILED"
            );
            self.fail_interrupted(&mut record)?;
            self.executions.update(&record).await?;
            report.interrupted.push(record.id);
        }

        let queued = self.executions.find_by_status(ExecutionStatus::Queued).await?;
        report.backlog = queued.into_iter().map(|r| r.id).collect();

        info!(
            interrupted = report.interrupted.len(),
            backlog = report.backlog.len(),
            "Execution recovery complete"
        );
        Ok(report)
    }

    fn fail_interrupted(&self, record: &mut ExecutionRecord) -> crate::error::Result<()> {
        let now = self.time_provider.now_millis();
        record.fail(now, INTERRUPTED_BY_RESTART, None)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TriggerType;
    use crate::port::execution_repository::mocks::InMemoryExecutionRepository;
    use crate::port::time_provider::mocks::ManualClock;

    fn record(id: &str, created_at: i64) -> ExecutionRecord {
        ExecutionRecord::new(id, "job-1", TriggerType::Manual, created_at)
    }

    #[tokio::test]
    async fn test_running_records_are_failed_and_queued_listed_in_order() {
        let repo = Arc::new(InMemoryExecutionRepository::new());
        let mut orphan = record("exec-orphan", 100);
        orphan.start(150).unwrap();
        repo.seed(orphan);
        repo.seed(record("exec-b", 300));
        repo.seed(record("exec-a", 200));

        let service = RecoveryService::new(repo.clone(), Arc::new(ManualClock::new(1000)));
        let report = service.recover(&HashSet::new()).await.unwrap();

        assert_eq!(report.interrupted, vec!["exec-orphan".to_string()]);
        assert_eq!(report.backlog, vec!["exec-a".to_string(), "exec-b".to_string()]);

        let failed = repo.get("exec-orphan").unwrap();
        assert_eq!(failed.status, ExecutionStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some(INTERRUPTED_BY_RESTART));
        assert_eq!(failed.finished_at, Some(1000));
    }

    #[tokio::test]
    async fn test_live_executions_are_not_touched() {
        let repo = Arc::new(InMemoryExecutionRepository::new());
        let mut live = record("exec-live", 100);
        live.start(150).unwrap();
        repo.seed(live);

        let service = RecoveryService::new(repo.clone(), Arc::new(ManualClock::new(1000)));
        let ids: HashSet<_> = ["exec-live".to_string()].into_iter().collect();
        let report = service.recover(&ids).await.unwrap();

        assert!(report.interrupted.is_empty());
        assert_eq!(repo.get("exec-live").unwrap().status, ExecutionStatus::Running);
    }
}
