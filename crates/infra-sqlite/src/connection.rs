// SQLite Connection Pool Setup

use crate::error::map_sqlx_error;
use scrapeflow_core::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

/// Create a pool for `database_url` (`sqlite://path` or `sqlite::memory:`)
///
/// File databases get WAL mode and a busy timeout. An in-memory database
/// lives as long as its connection, so it is pinned to a single connection
/// that is never recycled.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    let in_memory = database_url.contains(":memory:");
    let mut options = SqliteConnectOptions::from_str(database_url)
        .map_err(map_sqlx_error)?
        .busy_timeout(Duration::from_secs(5))
        .create_if_missing(true)
        .foreign_keys(true);
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(10)
    };

    pool_options
        .connect_with(options)
        .await
        .map_err(map_sqlx_error)
}

/// In-memory pool with every migration applied
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    crate::run_migrations(&pool).await.unwrap();
    pool
}
