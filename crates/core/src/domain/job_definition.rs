// Job Definition Domain Model
//
// Owned by external storage; the core only reads it.

use crate::domain::error::DomainError;
use crate::domain::site::SiteKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Job definition ID
pub type JobDefinitionId = String;

/// Login credentials for an authenticated site
///
/// `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Stable key for session persistence
    pub fn identity(&self) -> String {
        self.username.trim().to_lowercase()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &format_args!("<{} chars>", self.password.len()))
            .finish()
    }
}

/// Per-job concurrency and volume limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeLimits {
    /// Worker pages inside one execution
    pub concurrency: usize,
    pub max_requests: Option<u32>,
    pub max_pages: Option<u32>,
    pub max_results: Option<u32>,
    /// Randomized pause between tasks of one worker
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ScrapeLimits {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_requests: None,
            max_pages: None,
            max_results: None,
            min_delay_ms: 1000,
            max_delay_ms: 3000,
        }
    }
}

/// Fixed-interval schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub interval_minutes: u32,
}

impl Schedule {
    pub fn interval_ms(&self) -> i64 {
        i64::from(self.interval_minutes) * 60 * 1000
    }
}

/// What to scrape and how
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub id: JobDefinitionId,
    pub name: String,
    /// Raw site key as stored; resolved against `SiteKey` at execution time
    pub site_key: String,
    pub start_urls: Vec<String>,
    pub credentials: Option<Credentials>,
    pub limits: ScrapeLimits,
    /// Mirror execution logs to a per-execution file
    pub verbose: bool,
    pub enabled: bool,
    pub schedule: Option<Schedule>,
    pub created_at: i64,
}

impl JobDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        site: SiteKey,
        start_urls: Vec<String>,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            site_key: site.as_str().to_string(),
            start_urls,
            credentials: None,
            limits: ScrapeLimits::default(),
            verbose: false,
            enabled: true,
            schedule: None,
            created_at,
        }
    }

    pub fn site(&self) -> Result<SiteKey, DomainError> {
        self.site_key.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials::new("Alice@Example.com", "hunter22");
        let printed = format!("{:?}", creds);
        assert!(printed.contains("Alice@Example.com"));
        assert!(!printed.contains("hunter22"));
        assert!(printed.contains("<8 chars>"));
    }

    #[test]
    fn test_identity_is_normalized() {
        let creds = Credentials::new("  Alice@Example.com ", "pw");
        assert_eq!(creds.identity(), "alice@example.com");
    }

    #[test]
    fn test_unknown_site_key_surfaces_at_resolution() {
        let mut job = JobDefinition::new("job-1", "Test", SiteKey::MerchantPortal, vec![], 0);
        assert_eq!(job.site().unwrap(), SiteKey::MerchantPortal);

        job.site_key = "legacy_shop".to_string();
        assert!(matches!(job.site(), Err(DomainError::UnsupportedSite(_))));
    }
}
