// SQLite JobDefinitionRepository Implementation

use crate::error::{corrupt_row, map_sqlx_error};
use async_trait::async_trait;
use scrapeflow_core::domain::{Credentials, JobDefinition, JobDefinitionId, Schedule, ScrapeLimits};
use scrapeflow_core::error::Result;
use scrapeflow_core::port::JobDefinitionRepository;
use sqlx::SqlitePool;

pub struct SqliteJobDefinitionRepository {
    pool: SqlitePool,
}

impl SqliteJobDefinitionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobDefinitionRepository for SqliteJobDefinitionRepository {
    async fn find_by_id(&self, id: &JobDefinitionId) -> Result<Option<JobDefinition>> {
        let row = sqlx::query_as::<_, JobDefinitionRow>("SELECT * FROM job_definitions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobDefinitionRow::into_definition).transpose()
    }

    async fn list_enabled(&self) -> Result<Vec<JobDefinition>> {
        let rows: Vec<JobDefinitionRow> = sqlx::query_as(
            r#"
            SELECT * FROM job_definitions
            WHERE enabled = 1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(JobDefinitionRow::into_definition)
            .collect()
    }

    async fn save(&self, definition: &JobDefinition) -> Result<()> {
        let (username, password) = match &definition.credentials {
            Some(c) => (Some(c.username.as_str()), Some(c.password.as_str())),
            None => (None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO job_definitions (
                id, name, site_key, start_urls, username, password,
                limits, verbose, enabled, schedule_interval_minutes, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                site_key = excluded.site_key,
                start_urls = excluded.start_urls,
                username = excluded.username,
                password = excluded.password,
                limits = excluded.limits,
                verbose = excluded.verbose,
                enabled = excluded.enabled,
                schedule_interval_minutes = excluded.schedule_interval_minutes
            "#,
        )
        .bind(&definition.id)
        .bind(&definition.name)
        .bind(&definition.site_key)
        .bind(serde_json::to_string(&definition.start_urls)?)
        .bind(username)
        .bind(password)
        .bind(serde_json::to_string(&definition.limits)?)
        .bind(definition.verbose)
        .bind(definition.enabled)
        .bind(definition.schedule.as_ref().map(|s| s.interval_minutes as i64))
        .bind(definition.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct JobDefinitionRow {
    id: String,
    name: String,
    site_key: String,
    start_urls: String,
    username: Option<String>,
    password: Option<String>,
    limits: String,
    verbose: bool,
    enabled: bool,
    schedule_interval_minutes: Option<i64>,
    created_at: i64,
}

impl JobDefinitionRow {
    fn into_definition(self) -> Result<JobDefinition> {
        let start_urls: Vec<String> = serde_json::from_str(&self.start_urls)
            .map_err(|e| corrupt_row("job_definitions", &self.id, e))?;
        let limits: ScrapeLimits = serde_json::from_str(&self.limits)
            .map_err(|e| corrupt_row("job_definitions", &self.id, e))?;
        let credentials = match (self.username, self.password) {
            (Some(username), Some(password)) => Some(Credentials { username, password }),
            _ => None,
        };
        let schedule = self
            .schedule_interval_minutes
            .filter(|m| *m > 0)
            .map(|m| Schedule {
                interval_minutes: m as u32,
            });

        Ok(JobDefinition {
            id: self.id,
            name: self.name,
            site_key: self.site_key,
            start_urls,
            credentials,
            limits,
            verbose: self.verbose,
            enabled: self.enabled,
            schedule,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::test_pool;
    use scrapeflow_core::domain::SiteKey;

    fn definition(id: &str, created_at: i64) -> JobDefinition {
        JobDefinition::new(
            id,
            format!("Job {}", id),
            SiteKey::MerchantPortal,
            vec!["https://portal.test/app/merchants/m1".to_string()],
            created_at,
        )
    }

    #[tokio::test]
    async fn test_save_and_find_round_trips_nested_fields() {
        let repo = SqliteJobDefinitionRepository::new(test_pool().await);
        let mut def = definition("job-1", 100);
        def.credentials = Some(Credentials::new("alice", "s3cret"));
        def.limits.concurrency = 5;
        def.limits.max_results = Some(20);
        def.schedule = Some(Schedule { interval_minutes: 30 });
        def.verbose = true;
        repo.save(&def).await.unwrap();

        let found = repo.find_by_id(&"job-1".to_string()).await.unwrap().unwrap();
        assert_eq!(found, def);
        assert!(repo.find_by_id(&"missing".to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_enabled_skips_disabled_and_orders_by_creation() {
        let repo = SqliteJobDefinitionRepository::new(test_pool().await);
        let mut disabled = definition("job-b", 50);
        disabled.enabled = false;
        repo.save(&definition("job-c", 300)).await.unwrap();
        repo.save(&disabled).await.unwrap();
        repo.save(&definition("job-a", 200)).await.unwrap();

        let ids: Vec<_> = repo
            .list_enabled()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["job-a", "job-c"]);
    }

    #[tokio::test]
    async fn test_save_overwrites_existing_definition() {
        let repo = SqliteJobDefinitionRepository::new(test_pool().await);
        let mut def = definition("job-1", 100);
        repo.save(&def).await.unwrap();

        def.enabled = false;
        def.start_urls.push("https://portal.test/app/merchants/m2".to_string());
        repo.save(&def).await.unwrap();

        let found = repo.find_by_id(&def.id).await.unwrap().unwrap();
        assert!(!found.enabled);
        assert_eq!(found.start_urls.len(), 2);
    }
}
