// SQLite LogSink - durable per-execution log

use crate::error::{corrupt_row, map_sqlx_error};
use async_trait::async_trait;
use scrapeflow_core::domain::{ExecutionId, LogEntry, LogLevel};
use scrapeflow_core::error::Result;
use scrapeflow_core::port::LogSink;
use sqlx::SqlitePool;

pub struct SqliteLogSink {
    pool: SqlitePool,
}

impl SqliteLogSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogSink for SqliteLogSink {
    async fn write(&self, entry: &LogEntry) -> Result<()> {
        let context = match &entry.context {
            Some(value) => Some(serde_json::to_string(value)?),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO execution_logs (execution_id, level, message, context, timestamp)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.execution_id)
        .bind(entry.level.as_str())
        .bind(&entry.message)
        .bind(context)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn tail(&self, execution_id: &ExecutionId, limit: usize) -> Result<Vec<LogEntry>> {
        let rows: Vec<LogRow> = sqlx::query_as(
            r#"
            SELECT * FROM (
                SELECT * FROM execution_logs
                WHERE execution_id = ?
                ORDER BY id DESC
                LIMIT ?
            ) ORDER BY id ASC
            "#,
        )
        .bind(execution_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(LogRow::into_entry).collect()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LogRow {
    id: i64,
    execution_id: String,
    level: String,
    message: String,
    context: Option<String>,
    timestamp: i64,
}

impl LogRow {
    fn into_entry(self) -> Result<LogEntry> {
        let id = self.id.to_string();
        let level: LogLevel = self
            .level
            .parse()
            .map_err(|e| corrupt_row("execution_logs", &id, e))?;
        let context: Option<serde_json::Value> = self
            .context
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| corrupt_row("execution_logs", &id, e))?;

        Ok(LogEntry {
            execution_id: self.execution_id,
            level,
            message: self.message,
            context,
            timestamp: self.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::test_pool;
    use serde_json::json;

    fn entry(execution_id: &str, message: &str, ts: i64) -> LogEntry {
        LogEntry {
            execution_id: execution_id.to_string(),
            level: LogLevel::Info,
            message: message.to_string(),
            context: None,
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn test_tail_returns_last_entries_oldest_first() {
        let sink = SqliteLogSink::new(test_pool().await);
        for i in 0..5 {
            sink.write(&entry("exec-1", &format!("step {}", i), i)).await.unwrap();
        }
        sink.write(&entry("exec-2", "other", 9)).await.unwrap();

        let tail = sink.tail(&"exec-1".to_string(), 3).await.unwrap();
        let messages: Vec<_> = tail.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["step 2", "step 3", "step 4"]);
    }

    #[tokio::test]
    async fn test_context_and_level_survive_storage() {
        let sink = SqliteLogSink::new(test_pool().await);
        let mut e = entry("exec-1", "Merchant task failed", 7);
        e.level = LogLevel::Warn;
        e.context = Some(json!({ "taskId": "task-3" }));
        sink.write(&e).await.unwrap();

        let stored = sink.tail(&"exec-1".to_string(), 10).await.unwrap();
        assert_eq!(stored, vec![e]);
    }
}
