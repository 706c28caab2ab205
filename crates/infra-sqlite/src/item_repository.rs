// SQLite ItemRepository Implementation
// Items are keyed by (url, source); categories by full path slug.

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use scrapeflow_core::domain::{Category, ScrapedItem, UpsertOutcome};
use scrapeflow_core::error::Result;
use scrapeflow_core::port::{ItemRepository, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct SqliteItemRepository {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteItemRepository {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }
}

#[async_trait]
impl ItemRepository for SqliteItemRepository {
    async fn upsert_item(&self, item: &ScrapedItem) -> Result<UpsertOutcome> {
        let now = self.time_provider.now_millis();
        let breadcrumbs = serde_json::to_string(&item.breadcrumbs)?;
        let data = serde_json::to_string(&item.data)?;

        // Existence check and write must see the same snapshot
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE url = ? AND source = ?")
                .bind(&item.url)
                .bind(&item.source)
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO items (
                url, source, title, breadcrumbs, category_slug, data, first_seen_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url, source) DO UPDATE SET
                title = excluded.title,
                breadcrumbs = excluded.breadcrumbs,
                category_slug = excluded.category_slug,
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&item.url)
        .bind(&item.source)
        .bind(&item.title)
        .bind(&breadcrumbs)
        .bind(&item.category_slug)
        .bind(&data)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(if existing > 0 {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    async fn upsert_category(&self, category: &Category) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO categories (slug, name, parent_slug, depth)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(slug) DO UPDATE SET
                name = excluded.name,
                parent_slug = excluded.parent_slug,
                depth = excluded.depth
            "#,
        )
        .bind(&category.slug)
        .bind(&category.name)
        .bind(&category.parent_slug)
        .bind(category.depth as i64)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn count_items(&self, source: &str) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE source = ?")
            .bind(source)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}
