// Session State Domain Model
//
// Serialized authentication artifacts for skip-login reuse.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Browser cookie, stored in a driver-neutral shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Epoch seconds; None for session cookies
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    pub same_site: Option<String>,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: "/".to_string(),
            expires: None,
            http_only: false,
            secure: false,
            same_site: None,
        }
    }
}

/// Local storage of one origin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginStorage {
    pub origin: String,
    pub entries: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Credential identity the session belongs to
    pub identity: String,
    pub cookies: Vec<SessionCookie>,
    #[serde(default)]
    pub origins: Vec<OriginStorage>,
    pub saved_at: i64, // epoch ms
}

impl SessionState {
    pub fn age_ms(&self, now_millis: i64) -> i64 {
        now_millis - self.saved_at
    }

    /// Usable only while age < max age
    pub fn is_expired(&self, now_millis: i64, max_age_ms: i64) -> bool {
        self.age_ms(now_millis) >= max_age_ms
    }
}
