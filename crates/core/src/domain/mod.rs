// Domain Layer - Pure business logic and entities

pub mod error;
pub mod execution;
pub mod item;
pub mod job_definition;
pub mod log;
pub mod login;
pub mod merchant;
pub mod session;
pub mod site;

// Re-exports
pub use error::DomainError;
pub use execution::{
    truncate_chars, ExecutionId, ExecutionMetrics, ExecutionRecord, ExecutionStatus, TriggerType,
};
pub use item::{Category, ScrapedItem, UpsertOutcome};
pub use job_definition::{Credentials, JobDefinition, JobDefinitionId, Schedule, ScrapeLimits};
pub use log::{LogEntry, LogLevel};
pub use login::{LoginFailureKind, LoginOutcome, LoginState};
pub use merchant::{
    BatchProgress, BatchResult, MerchantTarget, MerchantTask, MerchantTaskStatus, WorkerId,
};
pub use session::{OriginStorage, SessionCookie, SessionState};
pub use site::SiteKey;
