// SQLite SessionStore - primary store for saved login sessions

use crate::error::{corrupt_row, map_sqlx_error};
use async_trait::async_trait;
use scrapeflow_core::domain::SessionState;
use scrapeflow_core::error::Result;
use scrapeflow_core::port::SessionStore;
use sqlx::SqlitePool;

pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self, identity: &str) -> Result<Option<SessionState>> {
        let state: Option<String> =
            sqlx::query_scalar("SELECT state FROM session_states WHERE identity = ?")
                .bind(identity)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        state
            .map(|json| {
                serde_json::from_str(&json).map_err(|e| corrupt_row("session_states", identity, e))
            })
            .transpose()
    }

    async fn save(&self, state: &SessionState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO session_states (identity, state, saved_at)
            VALUES (?, ?, ?)
            ON CONFLICT(identity) DO UPDATE SET
                state = excluded.state,
                saved_at = excluded.saved_at
            "#,
        )
        .bind(&state.identity)
        .bind(serde_json::to_string(state)?)
        .bind(state.saved_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn remove(&self, identity: &str) -> Result<()> {
        sqlx::query("DELETE FROM session_states WHERE identity = ?")
            .bind(identity)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::test_pool;
    use scrapeflow_core::domain::{OriginStorage, SessionCookie};

    fn state(saved_at: i64) -> SessionState {
        let mut storage = OriginStorage {
            origin: "https://portal.test".to_string(),
            ..OriginStorage::default()
        };
        storage.entries.insert("token".to_string(), "abc".to_string());
        SessionState {
            identity: "alice".to_string(),
            cookies: vec![SessionCookie::new("auth", "t-1", "portal.test")],
            origins: vec![storage],
            saved_at,
        }
    }

    #[tokio::test]
    async fn test_save_load_replace_remove() {
        let store = SqliteSessionStore::new(test_pool().await);
        assert!(store.load("alice").await.unwrap().is_none());

        store.save(&state(1)).await.unwrap();
        store.save(&state(2)).await.unwrap();
        let loaded = store.load("alice").await.unwrap().unwrap();
        assert_eq!(loaded, state(2));

        store.remove("alice").await.unwrap();
        assert!(store.load("alice").await.unwrap().is_none());
    }
}
