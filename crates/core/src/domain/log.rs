// Execution Log Entry

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::error::DomainError;
use crate::domain::execution::ExecutionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            other => Err(DomainError::UnknownVariant {
                kind: "log level",
                value: other.to_string(),
            }),
        }
    }
}

/// One structured entry in an execution's durable log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub execution_id: ExecutionId,
    pub level: LogLevel,
    pub message: String,
    pub context: Option<serde_json::Value>,
    pub timestamp: i64, // epoch ms
}

impl LogEntry {
    /// Single-line rendering used by the per-execution log file
    pub fn to_line(&self) -> String {
        let ts = chrono::DateTime::from_timestamp_millis(self.timestamp)
            .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
            .unwrap_or_else(|| self.timestamp.to_string());
        match &self.context {
            Some(ctx) => format!("{} [{}] {} {}", ts, self.level, self.message, ctx),
            None => format!("{} [{}] {}", ts, self.level, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_line_includes_context() {
        let entry = LogEntry {
            execution_id: "exec-1".to_string(),
            level: LogLevel::Warn,
            message: "slow page".to_string(),
            context: Some(serde_json::json!({"ms": 1200})),
            timestamp: 0,
        };
        assert_eq!(
            entry.to_line(),
            r#"1970-01-01T00:00:00.000Z [WARN] slow page {"ms":1200}"#
        );
    }
}
