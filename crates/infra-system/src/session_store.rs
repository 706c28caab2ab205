// File SessionStore - fallback store, one JSON file per identity

use async_trait::async_trait;
use scrapeflow_core::domain::SessionState;
use scrapeflow_core::error::{AppError, Result};
use scrapeflow_core::port::SessionStore;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Identities are e-mail addresses or user names; keep file names portable
    fn path_for(&self, identity: &str) -> PathBuf {
        let safe: String = identity
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("session-{}.json", safe))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, identity: &str) -> Result<Option<SessionState>> {
        let path = self.path_for(identity);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let state: SessionState = serde_json::from_slice(&bytes)?;
        if state.identity != identity {
            // Two identities sanitized to the same file name
            debug!(path = %path.display(), "Session file belongs to another identity");
            return Ok(None);
        }
        Ok(Some(state))
    }

    async fn save(&self, state: &SessionState) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&state.identity);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            AppError::Persistence(format!("cannot replace {}: {}", path.display(), e))
        })?;
        Ok(())
    }

    async fn remove(&self, identity: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(identity)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrapeflow_core::domain::SessionCookie;

    fn state(identity: &str) -> SessionState {
        SessionState {
            identity: identity.to_string(),
            cookies: vec![SessionCookie::new("auth", "t-1", "portal.test")],
            origins: Vec::new(),
            saved_at: 1_000,
        }
    }

    #[tokio::test]
    async fn test_round_trip_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("sessions"));

        assert!(store.load("alice@example.com").await.unwrap().is_none());
        store.save(&state("alice@example.com")).await.unwrap();
        assert_eq!(
            store.load("alice@example.com").await.unwrap(),
            Some(state("alice@example.com"))
        );
        assert!(dir
            .path()
            .join("sessions/session-alice_example.com.json")
            .exists());

        tokio_test::assert_ok!(store.remove("alice@example.com").await);
        tokio_test::assert_ok!(store.remove("alice@example.com").await);
        assert!(store.load("alice@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_colliding_file_name_is_not_returned_for_other_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        store.save(&state("a b")).await.unwrap();

        assert!(store.load("a_b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        tokio::fs::write(dir.path().join("session-bob.json"), b"{not json")
            .await
            .unwrap();

        assert!(matches!(
            store.load("bob").await.unwrap_err(),
            AppError::Serialization(_)
        ));
    }
}
