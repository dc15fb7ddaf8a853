use std::time::Duration;

use common::helper::error_chain_fmt;
use tokio::time::timeout;
use tracing::info;

use crate::{
    domain::{
        entities::{
            embedding_point::{Kind, ScoredPoint},
            knowledge_base::OwnerId,
            retrieved_context::{RetrievalLimits, RetrievedContext},
            timeouts::Timeouts,
        },
        services::embeddings::{EmbeddingsService, EmbeddingsServiceError},
    },
    ports::vector_index::{VectorIndex, VectorIndexError},
};

/// Retrieval fails as a whole: no partial context is ever returned
#[derive(thiserror::Error)]
pub enum RetrievalError {
    #[error(transparent)]
    EmbeddingsServiceError(#[from] EmbeddingsServiceError),
    #[error(transparent)]
    VectorIndexError(#[from] VectorIndexError),
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },
}

impl std::fmt::Debug for RetrievalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Finds the entries of a knowledge base most similar to a question.
///
/// The raw question is encoded once, then the four collections are searched concurrently,
/// each with its own limit. Hits are neither re-ranked nor deduplicated across kinds.
#[tracing::instrument(
    name = "Retrieving context for a question",
    skip(embeddings_service, vector_index, timeouts)
)]
pub async fn execute(
    embeddings_service: &dyn EmbeddingsService,
    vector_index: &dyn VectorIndex,
    timeouts: &Timeouts,
    question: &str,
    owner_id: OwnerId,
    limits: &RetrievalLimits,
) -> Result<RetrievedContext, RetrievalError> {
    let query_vector = timeout(timeouts.embedding, embeddings_service.encode(question))
        .await
        .map_err(|_| RetrievalError::Timeout {
            operation: "Encoding the question".into(),
            timeout: timeouts.embedding,
        })??;

    let query_vector = query_vector.as_slice();
    let search = move |kind: Kind| {
        search_kind(
            vector_index,
            timeouts.vector_index,
            kind,
            query_vector,
            owner_id,
            limits.limit(kind),
        )
    };

    let (experiences, projects, skills, qa_pairs) = futures::try_join!(
        search(Kind::WorkExperience),
        search(Kind::Project),
        search(Kind::Skill),
        search(Kind::Qa),
    )?;

    let retrieved = RetrievedContext {
        experiences,
        projects,
        skills,
        qa_pairs,
    };

    info!(counts = ?retrieved.counts(), "Retrieved context");
    Ok(retrieved)
}

async fn search_kind(
    vector_index: &dyn VectorIndex,
    search_timeout: Duration,
    kind: Kind,
    query_vector: &[f32],
    owner_id: OwnerId,
    limit: u64,
) -> Result<Vec<ScoredPoint>, RetrievalError> {
    let hits = timeout(
        search_timeout,
        vector_index.search(kind, query_vector, owner_id, limit),
    )
    .await
    .map_err(|_| RetrievalError::Timeout {
        operation: format!("Searching {}", kind.collection_name()),
        timeout: search_timeout,
    })??;

    Ok(hits)
}
