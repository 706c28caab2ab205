// Extraction Collaborator Ports
//
// Per-site DOM parsing is supplied from outside the orchestration core.

use crate::domain::{MerchantTask, ScrapedItem};
use crate::port::browser::BrowserPage;
use crate::port::site_scraper::ScrapeError;
use async_trait::async_trait;

/// Extracts one item from an already-loaded merchant detail page
#[async_trait]
pub trait DetailHandler: Send + Sync {
    async fn extract(
        &self,
        page: &dyn BrowserPage,
        task: &MerchantTask,
    ) -> Result<ScrapedItem, ScrapeError>;
}

/// One parsed listing page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPage {
    pub items: Vec<ScrapedItem>,
    /// Next page of the listing, if any
    pub next_url: Option<String>,
}

/// Parses an already-loaded listing page
#[async_trait]
pub trait ListingHandler: Send + Sync {
    async fn parse(&self, page: &dyn BrowserPage, source: &str)
        -> Result<ListingPage, ScrapeError>;
}

pub mod mocks {
    use super::*;
    use crate::domain::WorkerId;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Builds an item from the page title and records which task was extracted
    #[derive(Default)]
    pub struct RecordingDetailHandler {
        extracted: Mutex<Vec<(String, Option<WorkerId>)>>,
        failing_urls: Mutex<Vec<String>>,
    }

    impl RecordingDetailHandler {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_for(&self, url: impl Into<String>) {
            self.failing_urls.lock().unwrap().push(url.into());
        }

        /// (task id, claiming worker) per extraction
        pub fn extracted(&self) -> Vec<(String, Option<WorkerId>)> {
            self.extracted.lock().unwrap().clone()
        }

        /// How many times each task id was extracted
        pub fn claim_counts(&self) -> HashMap<String, usize> {
            let mut counts = HashMap::new();
            for (id, _) in self.extracted.lock().unwrap().iter() {
                *counts.entry(id.clone()).or_insert(0) += 1;
            }
            counts
        }
    }

    #[async_trait]
    impl DetailHandler for RecordingDetailHandler {
        async fn extract(
            &self,
            page: &dyn BrowserPage,
            task: &MerchantTask,
        ) -> Result<ScrapedItem, ScrapeError> {
            self.extracted
                .lock()
                .unwrap()
                .push((task.id.clone(), task.claimed_by));
            if self.failing_urls.lock().unwrap().contains(&task.target.url) {
                return Err(ScrapeError::Extraction(format!(
                    "no merchant profile on {}",
                    task.target.url
                )));
            }
            let title = page.title().await?;
            Ok(ScrapedItem::new(task.target.url.clone(), "merchant_portal")
                .with_title(title)
                .with_data(serde_json::json!({ "merchantId": task.target.merchant_id })))
        }
    }

    /// Serves listing pages from a map of URL -> page
    #[derive(Default)]
    pub struct StaticListingHandler {
        pages: HashMap<String, ListingPage>,
    }

    impl StaticListingHandler {
        pub fn new(pages: impl IntoIterator<Item = (String, ListingPage)>) -> Self {
            Self {
                pages: pages.into_iter().collect(),
            }
        }
    }

    #[async_trait]
    impl ListingHandler for StaticListingHandler {
        async fn parse(
            &self,
            page: &dyn BrowserPage,
            _source: &str,
        ) -> Result<ListingPage, ScrapeError> {
            let url = page.current_url().await?;
            self.pages
                .get(&url)
                .cloned()
                .ok_or_else(|| ScrapeError::Extraction(format!("no listing at {}", url)))
        }
    }
}
