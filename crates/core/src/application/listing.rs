// ListingCrawler - paginated crawl for catalog sites
//
// Follows `next_url` from each start URL on a single page, bounded by
// max pages, max requests and max results. Parsing is delegated to a
// `ListingHandler`.

use crate::application::batch::random_delay;
use crate::application::best_effort::best_effort;
use crate::application::constants::DEFAULT_NAVIGATION_TIMEOUT;
use crate::application::shutdown::ShutdownToken;
use crate::domain::{LogLevel, ScrapedItem, SiteKey};
use crate::port::{
    BrowserLauncher, BrowserPage, ListingHandler, ScrapeError, ScrapeRequest, SiteScraper,
};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct ListingCrawler {
    launcher: Arc<dyn BrowserLauncher>,
    handler: Arc<dyn ListingHandler>,
    navigation_timeout: Duration,
    shutdown: ShutdownToken,
}

impl ListingCrawler {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        handler: Arc<dyn ListingHandler>,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            launcher,
            handler,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            shutdown,
        }
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    async fn crawl(
        &self,
        page: &dyn BrowserPage,
        request: &ScrapeRequest,
    ) -> Result<Vec<ScrapedItem>, ScrapeError> {
        let options = &request.options;
        let source = request.site.as_str();
        let mut items = Vec::new();
        let mut seen = HashSet::new();
        let mut pages_visited = 0u32;
        let mut requests = 0u32;
        let mut last_error = None;

        'starts: for start in &request.start_urls {
            let mut next = Some(start.clone());
            while let Some(url) = next.take() {
                if self.shutdown.is_shutdown() {
                    return Err(ScrapeError::Cancelled);
                }
                if options.max_pages.is_some_and(|max| pages_visited >= max)
                    || options.max_requests.is_some_and(|max| requests >= max)
                {
                    debug!(pages = pages_visited, requests = requests, "Crawl limit reached");
                    break 'starts;
                }
                if !seen.insert(url.clone()) {
                    debug!(url = %url, "Listing page already visited");
                    break;
                }

                requests += 1;
                if let Err(e) = page.goto(&url, self.navigation_timeout).await {
                    request
                        .logger
                        .log(
                            LogLevel::Warn,
                            "Listing page failed to load",
                            Some(json!({ "url": url, "error": e.to_string() })),
                        )
                        .await;
                    last_error = Some(ScrapeError::from(e));
                    break;
                }
                pages_visited += 1;

                let listing = match self.handler.parse(page, source).await {
                    Ok(listing) => listing,
                    Err(e) => {
                        request
                            .logger
                            .log(
                                LogLevel::Warn,
                                "Listing page could not be parsed",
                                Some(json!({ "url": url, "error": e.to_string() })),
                            )
                            .await;
                        last_error = Some(e);
                        break;
                    }
                };

                request
                    .logger
                    .log(
                        LogLevel::Debug,
                        "Listing page parsed",
                        Some(json!({ "url": url, "items": listing.items.len() })),
                    )
                    .await;
                items.extend(listing.items);

                if let Some(max) = options.max_results {
                    if items.len() >= max as usize {
                        items.truncate(max as usize);
                        break 'starts;
                    }
                }

                next = listing.next_url;
                if next.is_some() {
                    tokio::time::sleep(random_delay(options.min_delay_ms, options.max_delay_ms))
                        .await;
                }
            }
        }

        match last_error {
            Some(e) if items.is_empty() => Err(e),
            _ => {
                info!(
                    execution_id = %request.execution_id,
                    pages = pages_visited,
                    items = items.len(),
                    "Listing crawl finished"
                );
                Ok(items)
            }
        }
    }
}

#[async_trait]
impl SiteScraper for ListingCrawler {
    fn site(&self) -> SiteKey {
        SiteKey::ProductCatalog
    }

    async fn scrape(&self, request: ScrapeRequest) -> Result<Vec<ScrapedItem>, ScrapeError> {
        if request.start_urls.is_empty() {
            return Err(ScrapeError::InvalidRequest("no start URLs".to_string()));
        }
        let context = self.launcher.launch().await?;
        let outcome = match context.new_page().await {
            Ok(page) => {
                let outcome = self.crawl(page.as_ref(), &request).await;
                best_effort("page close", page.close()).await;
                outcome
            }
            Err(e) => Err(e.into()),
        };
        best_effort("browser context close", context.close()).await;
        outcome
    }
}
