// Site key -> scraper resolution
//
// Keys are a closed enum; a job naming an unknown or unregistered site fails
// with UnsupportedSite instead of silently doing nothing.

use crate::domain::SiteKey;
use crate::error::{AppError, Result};
use crate::port::SiteScraper;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default, Clone)]
pub struct SiteRegistry {
    scrapers: HashMap<SiteKey, Arc<dyn SiteScraper>>,
}

impl SiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the scraper for its own site key
    pub fn register(mut self, scraper: Arc<dyn SiteScraper>) -> Self {
        self.scrapers.insert(scraper.site(), scraper);
        self
    }

    pub fn resolve(&self, site_key: &str) -> Result<(SiteKey, Arc<dyn SiteScraper>)> {
        let key: SiteKey = site_key
            .parse()
            .map_err(|_| AppError::UnsupportedSite(site_key.to_string()))?;
        self.scrapers
            .get(&key)
            .map(|s| (key, s.clone()))
            .ok_or_else(|| AppError::UnsupportedSite(format!("{} (no scraper registered)", key)))
    }

    pub fn sites(&self) -> Vec<SiteKey> {
        let mut keys: Vec<_> = self.scrapers.keys().copied().collect();
        keys.sort_by_key(|k| k.as_str());
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::site_scraper::mocks::StubScraper;
    use std::time::Duration;

    #[test]
    fn test_resolve_registered_and_unknown() {
        let registry = SiteRegistry::new().register(Arc::new(StubScraper::items(
            SiteKey::MerchantPortal,
            Duration::ZERO,
        )));

        let (key, _) = registry.resolve("merchant_portal").unwrap();
        assert_eq!(key, SiteKey::MerchantPortal);

        assert!(matches!(
            registry.resolve("product_catalog"),
            Err(AppError::UnsupportedSite(_))
        ));
        assert!(matches!(
            registry.resolve("merchant_portl"),
            Err(AppError::UnsupportedSite(_))
        ));
    }
}
