// SQLite ExecutionRepository Implementation

use crate::error::{corrupt_row, map_sqlx_error};
use async_trait::async_trait;
use scrapeflow_core::domain::{
    ExecutionId, ExecutionMetrics, ExecutionRecord, ExecutionStatus, JobDefinitionId, TriggerType,
};
use scrapeflow_core::error::{AppError, Result};
use scrapeflow_core::port::ExecutionRepository;
use sqlx::SqlitePool;

pub struct SqliteExecutionRepository {
    pool: SqlitePool,
}

impl SqliteExecutionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn metrics_json(execution: &ExecutionRecord) -> Result<Option<String>> {
    Ok(match &execution.metrics {
        Some(m) => Some(serde_json::to_string(m)?),
        None => None,
    })
}

#[async_trait]
impl ExecutionRepository for SqliteExecutionRepository {
    async fn insert(&self, execution: &ExecutionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO executions (
                id, job_definition_id, trigger_type, status,
                created_at, started_at, finished_at,
                metrics, error_message, error_stack
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&execution.id)
        .bind(&execution.job_definition_id)
        .bind(execution.trigger_type.as_str())
        .bind(execution.status.as_str())
        .bind(execution.created_at)
        .bind(execution.started_at)
        .bind(execution.finished_at)
        .bind(metrics_json(execution)?)
        .bind(&execution.error_message)
        .bind(&execution.error_stack)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &ExecutionId) -> Result<Option<ExecutionRecord>> {
        let row = sqlx::query_as::<_, ExecutionRow>("SELECT * FROM executions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(ExecutionRow::into_record).transpose()
    }

    async fn update(&self, execution: &ExecutionRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE executions
            SET status = ?, started_at = ?, finished_at = ?,
                metrics = ?, error_message = ?, error_stack = ?
            WHERE id = ?
            "#,
        )
        .bind(execution.status.as_str())
        .bind(execution.started_at)
        .bind(execution.finished_at)
        .bind(metrics_json(execution)?)
        .bind(&execution.error_message)
        .bind(&execution.error_stack)
        .bind(&execution.id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Execution {} not found",
                execution.id
            )));
        }
        Ok(())
    }

    async fn find_by_status(&self, status: ExecutionStatus) -> Result<Vec<ExecutionRecord>> {
        let rows: Vec<ExecutionRow> = sqlx::query_as(
            r#"
            SELECT * FROM executions
            WHERE status = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(ExecutionRow::into_record).collect()
    }

    async fn count_by_status(&self, status: ExecutionStatus) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM executions WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn has_active_for_job(&self, job_definition_id: &JobDefinitionId) -> Result<bool> {
        let active: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM executions
            WHERE job_definition_id = ? AND status IN ('QUEUED', 'RUNNING')
            "#,
        )
        .bind(job_definition_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(active > 0)
    }

    async fn latest_for_job(
        &self,
        job_definition_id: &JobDefinitionId,
    ) -> Result<Option<ExecutionRecord>> {
        let row = sqlx::query_as::<_, ExecutionRow>(
            r#"
            SELECT * FROM executions
            WHERE job_definition_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(job_definition_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(ExecutionRow::into_record).transpose()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ExecutionRow {
    id: String,
    job_definition_id: String,
    trigger_type: String,
    status: String,
    created_at: i64,
    started_at: Option<i64>,
    finished_at: Option<i64>,
    metrics: Option<String>,
    error_message: Option<String>,
    error_stack: Option<String>,
}

impl ExecutionRow {
    fn into_record(self) -> Result<ExecutionRecord> {
        let status: ExecutionStatus = self
            .status
            .parse()
            .map_err(|e| corrupt_row("executions", &self.id, e))?;
        let trigger_type: TriggerType = self
            .trigger_type
            .parse()
            .map_err(|e| corrupt_row("executions", &self.id, e))?;
        let metrics = match self.metrics.as_deref() {
            Some(json) => Some(
                serde_json::from_str::<ExecutionMetrics>(json)
                    .map_err(|e| corrupt_row("executions", &self.id, e))?,
            ),
            None => None,
        };

        Ok(ExecutionRecord {
            id: self.id,
            job_definition_id: self.job_definition_id,
            trigger_type,
            status,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            metrics,
            error_message: self.error_message,
            error_stack: self.error_stack,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::test_pool;

    fn record(id: &str, job: &str, created_at: i64) -> ExecutionRecord {
        ExecutionRecord::new(id, job, TriggerType::Api, created_at)
    }

    #[tokio::test]
    async fn test_insert_find_update() {
        let repo = SqliteExecutionRepository::new(test_pool().await);
        let mut rec = record("exec-1", "job-1", 1000);
        repo.insert(&rec).await.unwrap();

        rec.start(1100).unwrap();
        let mut metrics = ExecutionMetrics::found(3);
        metrics.record_saved();
        metrics.record_failure("https://shop.test/p/1: constraint");
        rec.complete(1200, metrics).unwrap();
        repo.update(&rec).await.unwrap();

        let found = repo.find_by_id(&rec.id).await.unwrap().unwrap();
        assert_eq!(found, rec);
    }

    #[tokio::test]
    async fn test_update_missing_record_is_not_found() {
        let repo = SqliteExecutionRepository::new(test_pool().await);
        let err = repo.update(&record("ghost", "job-1", 0)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_status_queries() {
        let repo = SqliteExecutionRepository::new(test_pool().await);
        repo.insert(&record("exec-b", "job-1", 2000)).await.unwrap();
        repo.insert(&record("exec-a", "job-1", 1000)).await.unwrap();
        let mut running = record("exec-c", "job-2", 500);
        running.start(600).unwrap();
        repo.insert(&running).await.unwrap();

        let queued: Vec<_> = repo
            .find_by_status(ExecutionStatus::Queued)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(queued, vec!["exec-a", "exec-b"]);
        assert_eq!(repo.count_by_status(ExecutionStatus::Running).await.unwrap(), 1);
        assert_eq!(repo.count_by_status(ExecutionStatus::Failed).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_same_millisecond_keeps_insertion_order() {
        let repo = SqliteExecutionRepository::new(test_pool().await);
        for id in ["exec-c", "exec-a", "exec-b"] {
            repo.insert(&record(id, "job-1", 1000)).await.unwrap();
        }

        let queued: Vec<_> = repo
            .find_by_status(ExecutionStatus::Queued)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(queued, vec!["exec-c", "exec-a", "exec-b"]);
        assert_eq!(
            repo.latest_for_job(&"job-1".to_string()).await.unwrap().unwrap().id,
            "exec-b"
        );
    }

    #[tokio::test]
    async fn test_job_activity_and_latest() {
        let repo = SqliteExecutionRepository::new(test_pool().await);
        let job = "job-1".to_string();
        assert!(!repo.has_active_for_job(&job).await.unwrap());
        assert!(repo.latest_for_job(&job).await.unwrap().is_none());

        let mut old = record("exec-1", &job, 1000);
        old.start(1001).unwrap();
        old.fail(1002, "boom", None).unwrap();
        repo.insert(&old).await.unwrap();
        assert!(!repo.has_active_for_job(&job).await.unwrap());

        repo.insert(&record("exec-2", &job, 5000)).await.unwrap();
        assert!(repo.has_active_for_job(&job).await.unwrap());
        assert_eq!(repo.latest_for_job(&job).await.unwrap().unwrap().id, "exec-2");
    }

    #[tokio::test]
    async fn test_unknown_status_is_reported_as_corrupt() {
        let pool = test_pool().await;
        sqlx::query(
            "INSERT INTO executions (id, job_definition_id, trigger_type, status, created_at) \
             VALUES ('old', 'job-1', 'MANUAL', 'DONE', 0)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let repo = SqliteExecutionRepository::new(pool);
        let err = repo.find_by_id(&"old".to_string()).await.unwrap_err();
        assert!(err.to_string().contains("Corrupt executions row old"));
    }
}
