// Scraped Item & Category Domain Models

use serde::{Deserialize, Serialize};

/// One record produced by a site scraper
///
/// Identity is `(url, source)`; re-scraping the same page overwrites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedItem {
    pub url: String,
    /// Site key of the scraper that produced it
    pub source: String,
    pub title: Option<String>,
    /// Breadcrumb path as shown on the page, root first
    #[serde(default)]
    pub breadcrumbs: Vec<String>,
    /// Assigned by the executor's taxonomy pass
    pub category_slug: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ScrapedItem {
    pub fn new(url: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source: source.into(),
            title: None,
            breadcrumbs: Vec::new(),
            category_slug: None,
            data: serde_json::Value::Null,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_breadcrumbs<I, S>(mut self, crumbs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.breadcrumbs = crumbs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Node in the hierarchical category tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Full path slug, e.g. `electronics/phones`
    pub slug: String,
    pub name: String,
    pub parent_slug: Option<String>,
    /// 0 for roots
    pub depth: u32,
}

/// Result of an idempotent upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}
