use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;

use crate::{
    domain::entities::knowledge_base::OwnerId,
    ports::index_state_repository::{IndexStateRepository, IndexStateRepositoryError},
};

/// Index state kept in memory, for tests and runs without a database
///
/// Every knowledge base is known: one never marked indexed is simply unindexed.
#[derive(Default)]
pub struct IndexStateInMemoryRepository {
    embedding_ids: Mutex<HashMap<OwnerId, String>>,
}

impl IndexStateInMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn embedding_ids(&self) -> std::sync::MutexGuard<'_, HashMap<OwnerId, String>> {
        self.embedding_ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl IndexStateRepository for IndexStateInMemoryRepository {
    async fn embedding_id(
        &self,
        owner_id: OwnerId,
    ) -> Result<Option<String>, IndexStateRepositoryError> {
        Ok(self.embedding_ids().get(&owner_id).cloned())
    }

    async fn mark_indexed(
        &self,
        owner_id: OwnerId,
        embedding_id: &str,
    ) -> Result<(), IndexStateRepositoryError> {
        self.embedding_ids().insert(owner_id, embedding_id.to_string());
        Ok(())
    }

    async fn mark_unindexed(&self, owner_id: OwnerId) -> Result<(), IndexStateRepositoryError> {
        self.embedding_ids().remove(&owner_id);
        Ok(())
    }
}
