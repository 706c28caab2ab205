// SessionManager - persist and restore authenticated sessions
//
// Sessions are keyed by credential identity. Reads try the primary store,
// then the fallback; writes go to the primary and fall back on error.
// Nothing here ever fails the calling scrape.

use crate::application::best_effort::best_effort;
use crate::domain::SessionState;
use crate::port::{BrowserContext, BrowserPage, SessionStore, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct SessionManager {
    primary: Arc<dyn SessionStore>,
    fallback: Option<Arc<dyn SessionStore>>,
    max_age: Duration,
    time_provider: Arc<dyn TimeProvider>,
}

impl SessionManager {
    pub fn new(
        primary: Arc<dyn SessionStore>,
        fallback: Option<Arc<dyn SessionStore>>,
        max_age: Duration,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            primary,
            fallback,
            max_age,
            time_provider,
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    fn stores(&self) -> impl Iterator<Item = &Arc<dyn SessionStore>> {
        std::iter::once(&self.primary).chain(self.fallback.iter())
    }

    /// A usable session for `identity`, or None when absent or too old
    pub async fn load_session_state(&self, identity: &str) -> Option<SessionState> {
        let now = self.time_provider.now_millis();
        let max_age_ms = self.max_age.as_millis() as i64;

        for store in self.stores() {
            let state = match store.load(identity).await {
                Ok(Some(state)) => state,
                Ok(None) => continue,
                Err(e) => {
                    warn!(store = store.name(), error = %e, "Session store read failed");
                    continue;
                }
            };
            if state.is_expired(now, max_age_ms) {
                info!(
                    store = store.name(),
                    age_ms = state.age_ms(now),
                    max_age_ms = max_age_ms,
                    "Saved session expired, discarding"
                );
                best_effort("expired session removal", store.remove(identity)).await;
                continue;
            }
            debug!(store = store.name(), cookies = state.cookies.len(), "Session restored");
            return Some(state);
        }
        None
    }

    /// Snapshot cookies (and `page`'s local storage) and persist them
    ///
    /// Returns whether any store accepted the write.
    pub async fn save_session_state(
        &self,
        context: &dyn BrowserContext,
        page: Option<&dyn BrowserPage>,
        identity: &str,
    ) -> bool {
        let cookies = match context.cookies().await {
            Ok(cookies) => cookies,
            Err(e) => {
                warn!(error = %e, "Cannot read cookies, session not saved");
                return false;
            }
        };
        let mut origins = Vec::new();
        if let Some(page) = page {
            if let Some(storage) = best_effort("local storage snapshot", page.local_storage()).await {
                if !storage.entries.is_empty() {
                    origins.push(storage);
                }
            }
        }

        let state = SessionState {
            identity: identity.to_string(),
            cookies,
            origins,
            saved_at: self.time_provider.now_millis(),
        };

        for store in self.stores() {
            match store.save(&state).await {
                Ok(()) => {
                    info!(store = store.name(), cookies = state.cookies.len(), "Session saved");
                    return true;
                }
                Err(e) => warn!(store = store.name(), error = %e, "Session save failed"),
            }
        }
        false
    }

    /// Put restored cookies into `context`; must run before any navigation
    pub async fn apply_cookies(&self, context: &dyn BrowserContext, state: &SessionState) -> bool {
        best_effort("session cookie restore", context.add_cookies(&state.cookies))
            .await
            .is_some()
    }

    /// Restore local storage for the origin `page` is currently on
    pub async fn apply_local_storage(&self, page: &dyn BrowserPage, state: &SessionState) {
        let Some(current) = best_effort("current url", page.current_url()).await else {
            return;
        };
        let origin = url::Url::parse(&current)
            .map(|u| u.origin().ascii_serialization())
            .unwrap_or_default();
        for storage in state.origins.iter().filter(|s| s.origin == origin) {
            best_effort("local storage restore", page.set_local_storage(storage)).await;
        }
    }
}
