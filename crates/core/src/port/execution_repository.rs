// Execution Repository Port (Interface)

use crate::domain::{ExecutionId, ExecutionRecord, ExecutionStatus, JobDefinitionId};
use crate::error::Result;
use async_trait::async_trait;

/// Durable store of execution records
///
/// Queue membership is re-derived from this store after a crash.
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Insert a new execution
    async fn insert(&self, execution: &ExecutionRecord) -> Result<()>;

    /// Find execution by ID
    async fn find_by_id(&self, id: &ExecutionId) -> Result<Option<ExecutionRecord>>;

    /// Overwrite status, timestamps, metrics and error fields
    async fn update(&self, execution: &ExecutionRecord) -> Result<()>;

    /// All executions in a status, oldest first; same-millisecond ties in insertion order
    async fn find_by_status(&self, status: ExecutionStatus) -> Result<Vec<ExecutionRecord>>;

    /// Count executions in a status
    async fn count_by_status(&self, status: ExecutionStatus) -> Result<i64>;

    /// True if the job has a QUEUED or RUNNING execution
    async fn has_active_for_job(&self, job_definition_id: &JobDefinitionId) -> Result<bool>;

    /// Most recently created execution of a job (last inserted on ties)
    async fn latest_for_job(
        &self,
        job_definition_id: &JobDefinitionId,
    ) -> Result<Option<ExecutionRecord>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory execution store that remembers every status it has seen
    #[derive(Default)]
    pub struct InMemoryExecutionRepository {
        records: Mutex<HashMap<ExecutionId, ExecutionRecord>>,
        history: Mutex<Vec<(ExecutionId, ExecutionStatus)>>,
        inserted: Mutex<Vec<ExecutionId>>,
    }

    impl InMemoryExecutionRepository {
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed a record without going through `insert` (simulates pre-crash state)
        pub fn seed(&self, execution: ExecutionRecord) {
            self.note_inserted(&execution.id);
            self.records
                .lock()
                .unwrap()
                .insert(execution.id.clone(), execution);
        }

        pub fn get(&self, id: &str) -> Option<ExecutionRecord> {
            self.records.lock().unwrap().get(id).cloned()
        }

        pub fn len(&self) -> usize {
            self.records.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        /// Every (id, status) written via insert/update, in write order
        pub fn history(&self) -> Vec<(ExecutionId, ExecutionStatus)> {
            self.history.lock().unwrap().clone()
        }

        /// Statuses one execution passed through
        pub fn statuses_of(&self, id: &str) -> Vec<ExecutionStatus> {
            self.history
                .lock()
                .unwrap()
                .iter()
                .filter(|(eid, _)| eid == id)
                .map(|(_, s)| *s)
                .collect()
        }

        fn note_inserted(&self, id: &ExecutionId) {
            let mut inserted = self.inserted.lock().unwrap();
            if !inserted.contains(id) {
                inserted.push(id.clone());
            }
        }

        /// (created_at, insertion position) sort key
        fn order_key(&self, execution: &ExecutionRecord) -> (i64, usize) {
            let position = self
                .inserted
                .lock()
                .unwrap()
                .iter()
                .position(|id| id == &execution.id)
                .unwrap_or(usize::MAX);
            (execution.created_at, position)
        }

        fn record(&self, execution: &ExecutionRecord) {
            self.history
                .lock()
                .unwrap()
                .push((execution.id.clone(), execution.status));
            self.records
                .lock()
                .unwrap()
                .insert(execution.id.clone(), execution.clone());
        }
    }

    #[async_trait]
    impl ExecutionRepository for InMemoryExecutionRepository {
        async fn insert(&self, execution: &ExecutionRecord) -> Result<()> {
            self.note_inserted(&execution.id);
            self.record(execution);
            Ok(())
        }

        async fn find_by_id(&self, id: &ExecutionId) -> Result<Option<ExecutionRecord>> {
            Ok(self.get(id))
        }

        async fn update(&self, execution: &ExecutionRecord) -> Result<()> {
            if !self.records.lock().unwrap().contains_key(&execution.id) {
                return Err(crate::AppError::NotFound(execution.id.clone()));
            }
            self.record(execution);
            Ok(())
        }

        async fn find_by_status(&self, status: ExecutionStatus) -> Result<Vec<ExecutionRecord>> {
            let mut found: Vec<_> = self
                .records
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.status == status)
                .cloned()
                .collect();
            found.sort_by_key(|r| self.order_key(r));
            Ok(found)
        }

        async fn count_by_status(&self, status: ExecutionStatus) -> Result<i64> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.status == status)
                .count() as i64)
        }

        async fn has_active_for_job(&self, job_definition_id: &JobDefinitionId) -> Result<bool> {
            Ok(self.records.lock().unwrap().values().any(|r| {
                &r.job_definition_id == job_definition_id
                    && matches!(r.status, ExecutionStatus::Queued | ExecutionStatus::Running)
            }))
        }

        async fn latest_for_job(
            &self,
            job_definition_id: &JobDefinitionId,
        ) -> Result<Option<ExecutionRecord>> {
            let candidates: Vec<_> = self
                .records
                .lock()
                .unwrap()
                .values()
                .filter(|r| &r.job_definition_id == job_definition_id)
                .cloned()
                .collect();
            Ok(candidates.into_iter().max_by_key(|r| self.order_key(r)))
        }
    }
}
