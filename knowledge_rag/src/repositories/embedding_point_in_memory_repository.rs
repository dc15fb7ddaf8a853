use std::{
    collections::{HashMap, HashSet},
    sync::RwLock,
};

use async_trait::async_trait;
use tracing::info;

use crate::{
    domain::{
        entities::{
            embedding_point::{EmbeddingPoint, Embeddings, Kind, Payload, ScoredPoint},
            knowledge_base::OwnerId,
        },
        services::embeddings::cosine_similarity,
    },
    ports::vector_index::{VectorIndex, VectorIndexError},
};

/// Process-local vector index, scoring points by cosine similarity with a linear scan
///
/// Holds the points in memory only: used by tests, and to run without a Qdrant instance.
#[derive(Default)]
pub struct EmbeddingPointInMemoryRepository {
    collections: RwLock<HashMap<Kind, Collection>>,
}

struct Collection {
    dimension: usize,
    points: Vec<EmbeddingPoint>,
}

impl EmbeddingPointInMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points currently stored for `kind`, all owners included
    pub fn points(&self, kind: Kind) -> Vec<EmbeddingPoint> {
        self.read()
            .get(&kind)
            .map(|collection| collection.points.clone())
            .unwrap_or_default()
    }

    /// Number of points of `owner_id` in the collection of `kind`
    pub fn count(&self, kind: Kind, owner_id: OwnerId) -> usize {
        self.read()
            .get(&kind)
            .map(|collection| {
                collection
                    .points
                    .iter()
                    .filter(|point| point.owner_id() == Some(owner_id))
                    .count()
            })
            .unwrap_or_default()
    }

    // Every write is a single push or retain, so a poisoned lock still holds consistent collections
    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Kind, Collection>> {
        self.collections
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Kind, Collection>> {
        self.collections
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl VectorIndex for EmbeddingPointInMemoryRepository {
    #[tracing::instrument(name = "Initializing the in-memory collections", skip(self))]
    async fn ensure_collections(&self, dimension: u64) -> Result<(), VectorIndexError> {
        let mut collections = self.write();

        for kind in Kind::ALL {
            if collections.contains_key(&kind) {
                info!("Collection {} already exists", kind.collection_name());
                continue;
            }

            collections.insert(
                kind,
                Collection {
                    dimension: dimension as usize,
                    points: vec![],
                },
            );
        }

        Ok(())
    }

    #[tracing::instrument(name = "Saving an embedding point in memory", skip(self, vector, payload))]
    async fn upsert(
        &self,
        kind: Kind,
        owner_id: OwnerId,
        local_id: &str,
        vector: Embeddings,
        payload: Payload,
    ) -> Result<(), VectorIndexError> {
        let mut collections = self.write();
        let collection = collections
            .get_mut(&kind)
            .ok_or_else(|| VectorIndexError::CollectionNotFound(kind.collection_name().into()))?;

        if vector.len() != collection.dimension {
            return Err(VectorIndexError::DimensionMismatch {
                expected: collection.dimension,
                actual: vector.len(),
            });
        }

        collection
            .points
            .push(EmbeddingPoint::new(kind, owner_id, local_id, vector, payload));

        Ok(())
    }

    #[tracing::instrument(name = "Searching embedding points in memory", skip(self, query_vector))]
    async fn search(
        &self,
        kind: Kind,
        query_vector: &[f32],
        owner_id: OwnerId,
        limit: u64,
    ) -> Result<Vec<ScoredPoint>, VectorIndexError> {
        let collections = self.read();
        let collection = collections
            .get(&kind)
            .ok_or_else(|| VectorIndexError::CollectionNotFound(kind.collection_name().into()))?;

        if query_vector.len() != collection.dimension {
            return Err(VectorIndexError::DimensionMismatch {
                expected: collection.dimension,
                actual: query_vector.len(),
            });
        }

        let mut hits: Vec<ScoredPoint> = collection
            .points
            .iter()
            .filter(|point| point.owner_id() == Some(owner_id))
            .map(|point| ScoredPoint {
                score: cosine_similarity(query_vector, &point.vector),
                payload: point.payload.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit as usize);

        Ok(hits)
    }

    #[tracing::instrument(name = "Deleting the embedding points of an owner in memory", skip(self))]
    async fn delete_by_owner(&self, owner_id: OwnerId) -> Result<(), VectorIndexError> {
        let mut collections = self.write();

        let mut cleaned_kinds = HashSet::new();
        for (kind, collection) in collections.iter_mut() {
            let before = collection.points.len();
            collection
                .points
                .retain(|point| point.owner_id() != Some(owner_id));

            if collection.points.len() != before {
                cleaned_kinds.insert(*kind);
            }
        }

        info!(?cleaned_kinds, "Deleted embedding points");
        Ok(())
    }
}
