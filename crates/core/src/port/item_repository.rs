// Item & Category Repository Port (Interface)

use crate::domain::{Category, ScrapedItem, UpsertOutcome};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Idempotent on (url, source): re-scraping overwrites
    async fn upsert_item(&self, item: &ScrapedItem) -> Result<UpsertOutcome>;

    /// Idempotent on slug
    async fn upsert_category(&self, category: &Category) -> Result<()>;

    /// Items stored for a source
    async fn count_items(&self, source: &str) -> Result<i64>;
}

pub mod mocks {
    use super::*;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;

    /// In-memory store; URLs listed in `reject_urls` fail to save
    #[derive(Default)]
    pub struct InMemoryItemRepository {
        items: Mutex<HashMap<(String, String), ScrapedItem>>,
        categories: Mutex<BTreeMap<String, Category>>,
        reject_urls: Mutex<Vec<String>>,
    }

    impl InMemoryItemRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reject_url(&self, url: impl Into<String>) {
            self.reject_urls.lock().unwrap().push(url.into());
        }

        pub fn items(&self) -> Vec<ScrapedItem> {
            self.items.lock().unwrap().values().cloned().collect()
        }

        pub fn item(&self, url: &str, source: &str) -> Option<ScrapedItem> {
            self.items
                .lock()
                .unwrap()
                .get(&(url.to_string(), source.to_string()))
                .cloned()
        }

        pub fn categories(&self) -> Vec<Category> {
            self.categories.lock().unwrap().values().cloned().collect()
        }
    }

    #[async_trait]
    impl ItemRepository for InMemoryItemRepository {
        async fn upsert_item(&self, item: &ScrapedItem) -> Result<UpsertOutcome> {
            if self.reject_urls.lock().unwrap().contains(&item.url) {
                return Err(crate::AppError::Database(format!(
                    "constraint violation for {}",
                    item.url
                )));
            }
            let key = (item.url.clone(), item.source.clone());
            let previous = self.items.lock().unwrap().insert(key, item.clone());
            Ok(match previous {
                Some(_) => UpsertOutcome::Updated,
                None => UpsertOutcome::Inserted,
            })
        }

        async fn upsert_category(&self, category: &Category) -> Result<()> {
            self.categories
                .lock()
                .unwrap()
                .insert(category.slug.clone(), category.clone());
            Ok(())
        }

        async fn count_items(&self, source: &str) -> Result<i64> {
            Ok(self
                .items
                .lock()
                .unwrap()
                .keys()
                .filter(|(_, s)| s == source)
                .count() as i64)
        }
    }
}
