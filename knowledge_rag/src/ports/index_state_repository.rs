use async_trait::async_trait;
use common::helper::error_chain_fmt;

use crate::domain::entities::knowledge_base::OwnerId;

/// Relational record of whether a knowledge base has been indexed.
///
/// Owned by the profile management layer: a non-null `embedding_id` means indexed.
#[async_trait]
pub trait IndexStateRepository: Send + Sync {
    async fn embedding_id(&self, owner_id: OwnerId)
        -> Result<Option<String>, IndexStateRepositoryError>;

    async fn mark_indexed(
        &self,
        owner_id: OwnerId,
        embedding_id: &str,
    ) -> Result<(), IndexStateRepositoryError>;

    async fn mark_unindexed(&self, owner_id: OwnerId) -> Result<(), IndexStateRepositoryError>;
}

#[derive(thiserror::Error)]
pub enum IndexStateRepositoryError {
    #[error(transparent)]
    DBError(#[from] sqlx::Error),
    #[error("Knowledge base {0} not found")]
    KnowledgeBaseNotFound(OwnerId),
}

impl std::fmt::Debug for IndexStateRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
