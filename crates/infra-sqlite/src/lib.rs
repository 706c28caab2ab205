// Scrapeflow Infrastructure - SQLite Adapter
// Implements: JobDefinitionRepository, ExecutionRepository, ItemRepository,
// LogSink, SessionStore (primary)

mod connection;
mod error;
mod execution_repository;
mod item_repository;
mod job_definition_repository;
mod log_sink;
mod migration;
mod session_store;

pub use connection::create_pool;
pub use execution_repository::SqliteExecutionRepository;
pub use item_repository::SqliteItemRepository;
pub use job_definition_repository::SqliteJobDefinitionRepository;
pub use log_sink::SqliteLogSink;
pub use migration::run_migrations;
pub use session_store::SqliteSessionStore;

// Note: sqlx::Error conversion goes through error::map_sqlx_error
// (orphan rule: cannot implement From<sqlx::Error> for AppError here)
