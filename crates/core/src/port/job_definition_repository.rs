// Job Definition Repository Port (Interface)

use crate::domain::{JobDefinition, JobDefinitionId};
use crate::error::Result;
use async_trait::async_trait;

/// Read access to job definitions (owned by external storage)
#[async_trait]
pub trait JobDefinitionRepository: Send + Sync {
    async fn find_by_id(&self, id: &JobDefinitionId) -> Result<Option<JobDefinition>>;

    /// Enabled definitions, any schedule
    async fn list_enabled(&self) -> Result<Vec<JobDefinition>>;

    /// Insert or replace (seeding and tests)
    async fn save(&self, definition: &JobDefinition) -> Result<()>;
}

pub mod mocks {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryJobDefinitionRepository {
        definitions: Mutex<BTreeMap<JobDefinitionId, JobDefinition>>,
    }

    impl InMemoryJobDefinitionRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(definitions: impl IntoIterator<Item = JobDefinition>) -> Self {
            let repo = Self::new();
            for def in definitions {
                repo.definitions.lock().unwrap().insert(def.id.clone(), def);
            }
            repo
        }
    }

    #[async_trait]
    impl JobDefinitionRepository for InMemoryJobDefinitionRepository {
        async fn find_by_id(&self, id: &JobDefinitionId) -> Result<Option<JobDefinition>> {
            Ok(self.definitions.lock().unwrap().get(id).cloned())
        }

        async fn list_enabled(&self) -> Result<Vec<JobDefinition>> {
            Ok(self
                .definitions
                .lock()
                .unwrap()
                .values()
                .filter(|d| d.enabled)
                .cloned()
                .collect())
        }

        async fn save(&self, definition: &JobDefinition) -> Result<()> {
            self.definitions
                .lock()
                .unwrap()
                .insert(definition.id.clone(), definition.clone());
            Ok(())
        }
    }
}
