use async_trait::async_trait;
use common::helper::error_chain_fmt;

use crate::domain::entities::{
    embedding_point::{Embeddings, Kind, Payload, ScoredPoint},
    knowledge_base::OwnerId,
};

/// Partitioned nearest neighbors store: one collection for each `Kind`, and inside a
/// collection the points are scoped to their owner with the `owner_id` payload key.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Creates the collections of every kind if they do not exist yet
    ///
    /// Idempotent: a collection created meanwhile by another process counts as a success.
    async fn ensure_collections(&self, dimension: u64) -> Result<(), VectorIndexError>;

    /// Appends a point with a fresh id. The payload is decorated with `owner_id`,
    /// `local_id` and `kind`.
    async fn upsert(
        &self,
        kind: Kind,
        owner_id: OwnerId,
        local_id: &str,
        vector: Embeddings,
        payload: Payload,
    ) -> Result<(), VectorIndexError>;

    /// Up to `limit` points of `kind` belonging to `owner_id`, by descending similarity.
    ///
    /// No match is an empty list, not an error.
    async fn search(
        &self,
        kind: Kind,
        query_vector: &[f32],
        owner_id: OwnerId,
        limit: u64,
    ) -> Result<Vec<ScoredPoint>, VectorIndexError>;

    /// Removes the points of `owner_id` from every collection.
    ///
    /// Best effort: a failure on one collection is logged and the other collections
    /// are still processed.
    async fn delete_by_owner(&self, owner_id: OwnerId) -> Result<(), VectorIndexError>;
}

#[derive(thiserror::Error)]
pub enum VectorIndexError {
    #[error("Error from Qdrant: {0}")]
    QdrantError(String),
    #[error("Error from Qdrant config: {0}")]
    QdrantConfigurationError(String),
    #[error("Collection {0} does not exist")]
    CollectionNotFound(String),
    #[error("Vector dimension {actual} does not match the collection dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl std::fmt::Debug for VectorIndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
