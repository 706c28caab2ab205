// Session Store Port

use crate::domain::SessionState;
use crate::error::Result;
use async_trait::async_trait;

/// Backing store for session state, keyed by credential identity
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, identity: &str) -> Result<Option<SessionState>>;

    async fn save(&self, state: &SessionState) -> Result<()>;

    async fn remove(&self, identity: &str) -> Result<()>;

    /// Short label for logs
    fn name(&self) -> &'static str;
}

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemorySessionStore {
        states: Mutex<HashMap<String, SessionState>>,
        failing: AtomicBool,
        saves: AtomicUsize,
    }

    impl InMemorySessionStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every operation errors
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn put(&self, state: SessionState) {
            self.states
                .lock()
                .unwrap()
                .insert(state.identity.clone(), state);
        }

        pub fn get(&self, identity: &str) -> Option<SessionState> {
            self.states.lock().unwrap().get(identity).cloned()
        }

        pub fn save_count(&self) -> usize {
            self.saves.load(Ordering::SeqCst)
        }

        fn check(&self) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(crate::AppError::Persistence("session store offline".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl SessionStore for InMemorySessionStore {
        async fn load(&self, identity: &str) -> Result<Option<SessionState>> {
            self.check()?;
            Ok(self.get(identity))
        }

        async fn save(&self, state: &SessionState) -> Result<()> {
            self.check()?;
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.put(state.clone());
            Ok(())
        }

        async fn remove(&self, identity: &str) -> Result<()> {
            self.check()?;
            self.states.lock().unwrap().remove(identity);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "memory"
        }
    }
}
