//! Selector-driven extraction handlers
//!
//! Generic stand-ins for per-site parsers: the merchant detail handler reads a
//! title, a breadcrumb trail and a configurable set of text fields; the
//! listing handler collects item links and the next-page link.

use crate::config::ExtractionConfig;
use async_trait::async_trait;
use scrapeflow_core::domain::{MerchantTask, ScrapedItem, SiteKey};
use scrapeflow_core::port::{
    BrowserPage, DetailHandler, ListingHandler, ListingPage, ScrapeError,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Script returning `[{href, text}]` for every match of `selector`
fn links_script(selector: &str) -> Result<String, ScrapeError> {
    let literal =
        serde_json::to_string(selector).map_err(|e| ScrapeError::Extraction(e.to_string()))?;
    Ok(format!(
        "Array.from(document.querySelectorAll({})).map(el => ({{ \
         href: el.href || el.getAttribute('href') || '', \
         text: (el.innerText || el.textContent || '').trim() }}))",
        literal
    ))
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    text: String,
}

/// Evaluation results from a page without matches (or a driver that returns
/// nothing) parse as an empty list
fn parse_links(value: Value) -> Vec<Link> {
    serde_json::from_value::<Vec<Link>>(value).unwrap_or_default()
}

pub struct SelectorDetailHandler {
    config: ExtractionConfig,
}

impl SelectorDetailHandler {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DetailHandler for SelectorDetailHandler {
    async fn extract(
        &self,
        page: &dyn BrowserPage,
        task: &MerchantTask,
    ) -> Result<ScrapedItem, ScrapeError> {
        let mut item = ScrapedItem::new(task.target.url.clone(), SiteKey::MerchantPortal.as_str());

        item.title = match page.text_of(&self.config.title_selector).await? {
            Some(title) if !title.is_empty() => Some(title),
            _ => Some(page.title().await?).filter(|t| !t.is_empty()),
        };

        let crumbs = page
            .evaluate(&links_script(&self.config.breadcrumb_selector)?)
            .await?;
        item.breadcrumbs = parse_links(crumbs)
            .into_iter()
            .map(|l| l.text)
            .filter(|t| !t.is_empty())
            .collect();

        let mut fields = Map::new();
        for (name, selector) in &self.config.detail_fields {
            if let Some(text) = page.text_of(selector).await? {
                fields.insert(name.clone(), Value::String(text));
            }
        }

        if item.title.is_none() && fields.is_empty() {
            return Err(ScrapeError::Extraction(format!(
                "no content found on {}",
                task.target.url
            )));
        }

        item.data = json!({
            "merchantId": task.target.merchant_id,
            "merchantName": task.target.name,
            "fields": fields,
        });
        Ok(item)
    }
}

pub struct SelectorListingHandler {
    config: ExtractionConfig,
}

impl SelectorListingHandler {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ListingHandler for SelectorListingHandler {
    async fn parse(&self, page: &dyn BrowserPage, source: &str) -> Result<ListingPage, ScrapeError> {
        let links = page
            .evaluate(&links_script(&self.config.listing_item_selector)?)
            .await?;
        let items = parse_links(links)
            .into_iter()
            .filter(|l| !l.href.is_empty())
            .map(|l| {
                let mut item = ScrapedItem::new(l.href, source);
                item.title = Some(l.text).filter(|t| !t.is_empty());
                item
            })
            .collect();

        let next = page
            .evaluate(&links_script(&self.config.listing_next_selector)?)
            .await?;
        let next_url = parse_links(next)
            .into_iter()
            .map(|l| l.href)
            .find(|href| !href.is_empty());

        Ok(ListingPage { items, next_url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrapeflow_core::domain::MerchantTarget;
    use scrapeflow_core::port::browser::mocks::{FakeBrowser, FakePageFixture};
    use scrapeflow_core::port::BrowserLauncher;
    use std::sync::Arc;
    use std::time::Duration;

    const URL: &str = "https://portal.test/merchants/42";

    async fn open(browser: &FakeBrowser, fixture: FakePageFixture) -> Arc<dyn BrowserPage> {
        browser.set_fixture(URL, fixture);
        let ctx = browser.launch().await.unwrap();
        let page = ctx.new_page().await.unwrap();
        page.goto(URL, Duration::from_secs(1)).await.unwrap();
        page
    }

    fn config() -> ExtractionConfig {
        let mut config = ExtractionConfig::default();
        config.detail_fields.insert("phone".to_string(), ".phone".to_string());
        config
    }

    #[tokio::test]
    async fn test_detail_reads_title_and_fields() {
        let browser = FakeBrowser::new();
        let page = open(
            &browser,
            FakePageFixture::new("Merchant 42 | Portal")
                .with_text("h1", "Corner Bakery")
                .with_text(".phone", "555-0100"),
        )
        .await;
        let task = MerchantTask::new(0, MerchantTarget::from_url(URL));

        let item = SelectorDetailHandler::new(config())
            .extract(page.as_ref(), &task)
            .await
            .unwrap();
        assert_eq!(item.url, URL);
        assert_eq!(item.source, "merchant_portal");
        assert_eq!(item.title.as_deref(), Some("Corner Bakery"));
        assert_eq!(item.data["fields"]["phone"], "555-0100");
        assert_eq!(item.data["merchantId"], "42");
    }

    #[tokio::test]
    async fn test_detail_falls_back_to_page_title() {
        let browser = FakeBrowser::new();
        let page = open(&browser, FakePageFixture::new("Merchant 42")).await;
        let task = MerchantTask::new(0, MerchantTarget::from_url(URL));

        let item = SelectorDetailHandler::new(config())
            .extract(page.as_ref(), &task)
            .await
            .unwrap();
        assert_eq!(item.title.as_deref(), Some("Merchant 42"));
    }

    #[tokio::test]
    async fn test_detail_without_content_fails() {
        let browser = FakeBrowser::new();
        let page = open(&browser, FakePageFixture::new("")).await;
        let task = MerchantTask::new(0, MerchantTarget::from_url(URL));

        let err = SelectorDetailHandler::new(config())
            .extract(page.as_ref(), &task)
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Extraction(_)));
    }

    #[test]
    fn test_parse_links() {
        let links = parse_links(json!([
            { "href": "https://shop.test/p/1", "text": "Widget" },
            { "href": "", "text": "broken" }
        ]));
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].text, "Widget");
        assert!(parse_links(Value::Null).is_empty());
    }

    #[tokio::test]
    async fn test_listing_script_embeds_selectors() {
        let browser = FakeBrowser::new();
        let page = open(&browser, FakePageFixture::new("Catalog")).await;

        let listing = SelectorListingHandler::new(ExtractionConfig::default())
            .parse(page.as_ref(), "product_catalog")
            .await
            .unwrap();
        assert!(listing.items.is_empty());
        assert!(listing.next_url.is_none());
        let scripts = browser.scripts();
        assert!(scripts[0].contains(r#""a.product-link""#));
        assert!(scripts[1].contains(r#""a[rel='next']""#));
    }
}
