// Migration Runner

use crate::error::map_sqlx_error;
use scrapeflow_core::error::Result;
use sqlx::SqlitePool;
use tracing::info;

const MIGRATIONS: &[(i64, &str, &str)] = &[
    (
        1,
        "Job definitions & executions",
        include_str!("../migrations/001_initial_schema.sql"),
    ),
    (
        2,
        "Items, categories, logs & sessions",
        include_str!("../migrations/002_items_logs_sessions.sql"),
    ),
];

/// Apply every migration newer than the stored schema version
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let table_exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
    )
    .fetch_one(pool)
    .await
    .map_err(map_sqlx_error)?;

    let current_version = if table_exists > 0 {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(pool)
            .await
            .map_err(map_sqlx_error)?;
        max.unwrap_or(0)
    } else {
        0
    };
    info!(current_version = current_version, "Checking database schema");

    for (version, name, sql) in MIGRATIONS {
        if current_version < *version {
            info!(version = version, name = name, "Applying migration");
            apply_migration(pool, sql).await?;
        }
    }
    Ok(())
}

/// Apply one migration file in a transaction
async fn apply_migration(pool: &SqlitePool, sql: &str) -> Result<()> {
    let mut tx = pool.begin().await.map_err(map_sqlx_error)?;

    for statement in sql.split(';') {
        let clean_statement = statement
            .lines()
            .map(|line| match line.find("--") {
                Some(idx) => &line[..idx],
                None => line,
            })
            .collect::<Vec<_>>()
            .join("\n");
        let clean_statement = clean_statement.trim();

        if !clean_statement.is_empty() {
            sqlx::query(clean_statement)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }
    }

    tx.commit().await.map_err(map_sqlx_error)
}
