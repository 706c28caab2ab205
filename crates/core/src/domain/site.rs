// Supported target sites
//
// Closed set: adding a site means adding a variant here and registering one
// SiteScraper implementation for it in the daemon.

use crate::domain::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteKey {
    /// Authenticated merchant portal: many small per-merchant detail pages
    MerchantPortal,
    /// Public product catalog: paginated listing crawl
    ProductCatalog,
}

impl SiteKey {
    pub const ALL: [SiteKey; 2] = [SiteKey::MerchantPortal, SiteKey::ProductCatalog];

    pub fn as_str(self) -> &'static str {
        match self {
            SiteKey::MerchantPortal => "merchant_portal",
            SiteKey::ProductCatalog => "product_catalog",
        }
    }
}

impl fmt::Display for SiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SiteKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        SiteKey::ALL
            .into_iter()
            .find(|key| key.as_str() == normalized)
            .ok_or_else(|| DomainError::UnsupportedSite(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_dashes_and_case() {
        assert_eq!(
            "Merchant-Portal".parse::<SiteKey>().unwrap(),
            SiteKey::MerchantPortal
        );
        assert_eq!(
            " product_catalog ".parse::<SiteKey>().unwrap(),
            SiteKey::ProductCatalog
        );
    }

    #[test]
    fn test_parse_rejects_typos() {
        let err = "merchant_portl".parse::<SiteKey>().unwrap_err();
        assert_eq!(err, DomainError::UnsupportedSite("merchant_portl".to_string()));
    }
}
