// Execution Log Ports
//
// LogSink is the durable per-execution log, LogMirror the optional
// per-execution file, ExecutionLog the handle scrapers write through.

use crate::domain::{ExecutionId, LogEntry, LogLevel};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Durable store of log entries keyed by execution id
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn write(&self, entry: &LogEntry) -> Result<()>;

    /// Last `limit` entries of an execution, oldest first
    async fn tail(&self, execution_id: &ExecutionId, limit: usize) -> Result<Vec<LogEntry>>;
}

/// Append-only per-execution file mirror (verbose jobs only)
#[async_trait]
pub trait LogMirror: Send + Sync {
    async fn append(&self, entry: &LogEntry) -> Result<()>;
}

/// Logging handle bound to one execution
///
/// Implementations never fail: sink errors are swallowed.
#[async_trait]
pub trait ExecutionLog: Send + Sync {
    async fn log(&self, level: LogLevel, message: &str, context: Option<Value>);

    async fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message, None).await
    }

    async fn info(&self, message: &str) {
        self.log(LogLevel::Info, message, None).await
    }

    async fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message, None).await
    }

    async fn error(&self, message: &str) {
        self.log(LogLevel::Error, message, None).await
    }
}

/// Discards everything
pub struct NullExecutionLog;

#[async_trait]
impl ExecutionLog for NullExecutionLog {
    async fn log(&self, _level: LogLevel, _message: &str, _context: Option<Value>) {}
}

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// In-memory sink / mirror; `set_failing(true)` makes every write error
    #[derive(Default)]
    pub struct MemoryLogSink {
        entries: Mutex<Vec<LogEntry>>,
        failing: AtomicBool,
    }

    impl MemoryLogSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn entries(&self) -> Vec<LogEntry> {
            self.entries.lock().unwrap().clone()
        }

        pub fn messages_for(&self, execution_id: &str) -> Vec<String> {
            self.entries
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.execution_id == execution_id)
                .map(|e| e.message.clone())
                .collect()
        }

        fn push(&self, entry: &LogEntry) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(crate::AppError::Persistence("log sink unavailable".to_string()));
            }
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    #[async_trait]
    impl LogSink for MemoryLogSink {
        async fn write(&self, entry: &LogEntry) -> Result<()> {
            self.push(entry)
        }

        async fn tail(&self, execution_id: &ExecutionId, limit: usize) -> Result<Vec<LogEntry>> {
            let entries: Vec<_> = self
                .entries
                .lock()
                .unwrap()
                .iter()
                .filter(|e| &e.execution_id == execution_id)
                .cloned()
                .collect();
            let skip = entries.len().saturating_sub(limit);
            Ok(entries.into_iter().skip(skip).collect())
        }
    }

    #[async_trait]
    impl LogMirror for MemoryLogSink {
        async fn append(&self, entry: &LogEntry) -> Result<()> {
            self.push(entry)
        }
    }
}
