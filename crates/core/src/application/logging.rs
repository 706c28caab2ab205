// Per-execution logging
//
// Every entry goes to three places: a tracing event (process diagnostics),
// the durable log sink, and for verbose jobs the per-execution file mirror.
// The last two are best-effort.

use crate::application::best_effort::best_effort;
use crate::domain::{ExecutionId, LogEntry, LogLevel};
use crate::port::{ExecutionLog, LogMirror, LogSink, TimeProvider};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Builds one `ExecutionLogger` per execution
#[derive(Clone)]
pub struct ExecutionLoggerFactory {
    sink: Arc<dyn LogSink>,
    mirror: Option<Arc<dyn LogMirror>>,
    time_provider: Arc<dyn TimeProvider>,
}

impl ExecutionLoggerFactory {
    pub fn new(
        sink: Arc<dyn LogSink>,
        mirror: Option<Arc<dyn LogMirror>>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            sink,
            mirror,
            time_provider,
        }
    }

    pub fn for_execution(&self, execution_id: &ExecutionId, verbose: bool) -> Arc<ExecutionLogger> {
        Arc::new(ExecutionLogger {
            execution_id: execution_id.clone(),
            sink: self.sink.clone(),
            mirror: if verbose { self.mirror.clone() } else { None },
            time_provider: self.time_provider.clone(),
        })
    }
}

pub struct ExecutionLogger {
    execution_id: ExecutionId,
    sink: Arc<dyn LogSink>,
    mirror: Option<Arc<dyn LogMirror>>,
    time_provider: Arc<dyn TimeProvider>,
}

impl ExecutionLogger {
    pub fn execution_id(&self) -> &ExecutionId {
        &self.execution_id
    }

    fn trace(&self, level: LogLevel, message: &str, context: Option<&Value>) {
        let id = &self.execution_id;
        match level {
            LogLevel::Debug => debug!(execution_id = %id, context = ?context, "{}", message),
            LogLevel::Info => info!(execution_id = %id, context = ?context, "{}", message),
            LogLevel::Warn => warn!(execution_id = %id, context = ?context, "{}", message),
            LogLevel::Error => error!(execution_id = %id, context = ?context, "{}", message),
        }
    }
}

#[async_trait]
impl ExecutionLog for ExecutionLogger {
    async fn log(&self, level: LogLevel, message: &str, context: Option<Value>) {
        self.trace(level, message, context.as_ref());

        let entry = LogEntry {
            execution_id: self.execution_id.clone(),
            level,
            message: message.to_string(),
            context,
            timestamp: self.time_provider.now_millis(),
        };
        best_effort("log sink write", self.sink.write(&entry)).await;
        if let Some(mirror) = &self.mirror {
            best_effort("log file mirror", mirror.append(&entry)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::log_sink::mocks::MemoryLogSink;
    use crate::port::time_provider::mocks::ManualClock;

    #[tokio::test]
    async fn test_verbose_mirrors_entries() {
        let sink = Arc::new(MemoryLogSink::new());
        let mirror = Arc::new(MemoryLogSink::new());
        let factory = ExecutionLoggerFactory::new(
            sink.clone(),
            Some(mirror.clone() as Arc<dyn LogMirror>),
            Arc::new(ManualClock::new(42)),
        );

        let quiet = factory.for_execution(&"exec-1".to_string(), false);
        quiet.info("not mirrored").await;
        let verbose = factory.for_execution(&"exec-2".to_string(), true);
        verbose
            .log(LogLevel::Warn, "mirrored", Some(serde_json::json!({"n": 1})))
            .await;

        assert_eq!(sink.entries().len(), 2);
        let mirrored = mirror.entries();
        assert_eq!(mirrored.len(), 1);
        assert_eq!(mirrored[0].execution_id, "exec-2");
        assert_eq!(mirrored[0].timestamp, 42);
    }

    #[tokio::test]
    async fn test_sink_failures_are_swallowed() {
        let sink = Arc::new(MemoryLogSink::new());
        sink.set_failing(true);
        let factory = ExecutionLoggerFactory::new(sink.clone(), None, Arc::new(ManualClock::new(0)));

        factory
            .for_execution(&"exec-1".to_string(), true)
            .error("still fine")
            .await;
        assert!(sink.entries().is_empty());
    }
}
