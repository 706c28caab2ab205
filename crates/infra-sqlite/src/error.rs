// sqlx::Error -> AppError
//
// Lives here because of the orphan rule: core cannot depend on sqlx and this
// crate cannot implement From<sqlx::Error> for AppError.

use scrapeflow_core::error::AppError;

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            // SQLite result codes: https://www.sqlite.org/rescode.html
            match db_err.code() {
                Some(code) => match code.as_ref() {
                    "2067" | "1555" => AppError::Database(format!(
                        "Unique constraint violation: {} ({})",
                        db_err.message(),
                        code
                    )),
                    "5" => AppError::Database(format!(
                        "Database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => AppError::Database(format!("Database full: {}", db_err.message())),
                    other => AppError::Database(format!(
                        "Database error [{}]: {}",
                        other,
                        db_err.message()
                    )),
                },
                None => AppError::Database(format!("Database error: {}", db_err.message())),
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => AppError::Database(format!("Column not found: {}", col)),
        _ => AppError::Database(err.to_string()),
    }
}

/// A stored value that no longer parses into its domain type
pub(crate) fn corrupt_row(table: &str, id: &str, err: impl std::fmt::Display) -> AppError {
    AppError::Database(format!("Corrupt {} row {}: {}", table, id, err))
}
