use std::time::Duration;

use common::helper::error_chain_fmt;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::{
    domain::{
        entities::{
            embedding_point::{Embeddings, Kind, Payload},
            knowledge_base::{
                KnowledgeBaseSnapshot, OwnerId, Project, QaPair, Record, Skill, WorkExperience,
            },
            retrieved_context::IndexReport,
            timeouts::Timeouts,
        },
        services::embeddings::{EmbeddingsService, EmbeddingsServiceError},
    },
    ports::vector_index::{VectorIndex, VectorIndexError},
};

/// Error for a single knowledge base entry. The entry is skipped, indexing goes on.
#[derive(thiserror::Error)]
pub enum ItemIndexingError {
    #[error("Malformed {0} record")]
    MalformedRecord(Kind),
    #[error("Failed to build the payload: {0}")]
    PayloadError(#[from] serde_json::Error),
    #[error(transparent)]
    EmbeddingsServiceError(#[from] EmbeddingsServiceError),
    #[error(transparent)]
    VectorIndexError(#[from] VectorIndexError),
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
}

impl std::fmt::Debug for ItemIndexingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

#[derive(thiserror::Error)]
pub enum IndexKnowledgeBaseError {
    #[error("Failed to clear the previous embeddings of knowledge base {owner_id}")]
    ClearingError {
        owner_id: OwnerId,
        #[source]
        source: VectorIndexError,
    },
    #[error("Clearing the previous embeddings of knowledge base {owner_id} timed out after {timeout:?}")]
    ClearingTimeout { owner_id: OwnerId, timeout: Duration },
}

impl std::fmt::Debug for IndexKnowledgeBaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// A knowledge base entry that can be encoded
enum Entry<'a> {
    WorkExperience(&'a WorkExperience),
    Project(&'a Project),
    Skill(&'a Skill),
    QaPair(QaPair),
}

impl Entry<'_> {
    /// The stored payload: the record attributes, before decoration by the vector index
    fn payload(&self) -> Result<Payload, serde_json::Error> {
        match self {
            Entry::WorkExperience(experience) => to_payload(experience),
            Entry::Project(project) => to_payload(project),
            Entry::Skill(Skill::Name(name)) => {
                let mut payload = Map::new();
                payload.insert("skill".into(), JsonValue::from(name.as_str()));
                Ok(payload)
            }
            Entry::Skill(Skill::Detailed(skill)) => to_payload(skill),
            Entry::QaPair(qa_pair) => to_payload(qa_pair),
        }
    }

    async fn encode(
        &self,
        embeddings_service: &dyn EmbeddingsService,
    ) -> Result<Embeddings, EmbeddingsServiceError> {
        match self {
            Entry::WorkExperience(experience) => {
                embeddings_service.encode_work_experience(experience).await
            }
            Entry::Project(project) => embeddings_service.encode_project(project).await,
            Entry::Skill(skill) => embeddings_service.encode_skill(skill).await,
            Entry::QaPair(qa_pair) => embeddings_service.encode_qa_pair(qa_pair).await,
        }
    }
}

/// Every entry of the snapshot with its kind and its position in its list,
/// `None` standing for a malformed entry
fn entries(snapshot: &KnowledgeBaseSnapshot) -> Vec<(Kind, usize, Option<Entry<'_>>)> {
    fn valid<T>(record: &Record<T>) -> Option<&T> {
        match record {
            Record::Valid(record) => Some(record),
            Record::Malformed(_) => None,
        }
    }

    let experiences = snapshot
        .work_experience
        .iter()
        .enumerate()
        .map(|(position, record)| {
            (Kind::WorkExperience, position, valid(record).map(Entry::WorkExperience))
        });
    let projects = snapshot
        .projects
        .iter()
        .enumerate()
        .map(|(position, record)| (Kind::Project, position, valid(record).map(Entry::Project)));
    let skills = snapshot
        .skills
        .iter()
        .enumerate()
        .map(|(position, record)| (Kind::Skill, position, valid(record).map(Entry::Skill)));
    let qa_pairs = snapshot
        .qa_pairs()
        .enumerate()
        .map(|(position, qa_pair)| (Kind::Qa, position, Some(Entry::QaPair(qa_pair))));

    experiences
        .chain(projects)
        .chain(skills)
        .chain(qa_pairs)
        .collect()
}

/// Indexes a knowledge base snapshot: each entry is encoded then saved in the collection of its kind.
///
/// The previous points of the owner are deleted first, so the index mirrors the last snapshot.
/// An entry that cannot be indexed (malformed, encoding or saving failure, timeout)
/// is logged and skipped: the report tells how many entries of each kind were attempted.
#[tracing::instrument(
    name = "Indexing a knowledge base",
    skip(embeddings_service, vector_index, timeouts, snapshot)
)]
pub async fn execute(
    embeddings_service: &dyn EmbeddingsService,
    vector_index: &dyn VectorIndex,
    timeouts: &Timeouts,
    owner_id: OwnerId,
    snapshot: &KnowledgeBaseSnapshot,
) -> Result<IndexReport, IndexKnowledgeBaseError> {
    timeout(timeouts.vector_index, vector_index.delete_by_owner(owner_id))
        .await
        .map_err(|_| IndexKnowledgeBaseError::ClearingTimeout {
            owner_id,
            timeout: timeouts.vector_index,
        })?
        .map_err(|source| IndexKnowledgeBaseError::ClearingError { owner_id, source })?;

    let mut report = IndexReport::default();

    for (kind, position, entry) in entries(snapshot) {
        let local_id = kind.local_id(position);

        let result = match entry {
            Some(entry) => {
                index_entry(
                    embeddings_service,
                    vector_index,
                    timeouts,
                    owner_id,
                    &local_id,
                    kind,
                    &entry,
                )
                .await
            }
            None => Err(ItemIndexingError::MalformedRecord(kind)),
        };

        match result {
            Ok(()) => report.kind_mut(kind).record_success(),
            Err(error) => {
                warn!(?error, %kind, %local_id, "Skipping knowledge base entry");
                report.kind_mut(kind).record_failure();
            }
        }
    }

    info!(?report, "Indexed knowledge base");
    Ok(report)
}

async fn index_entry(
    embeddings_service: &dyn EmbeddingsService,
    vector_index: &dyn VectorIndex,
    timeouts: &Timeouts,
    owner_id: OwnerId,
    local_id: &str,
    kind: Kind,
    entry: &Entry<'_>,
) -> Result<(), ItemIndexingError> {
    let payload = entry.payload()?;

    let vector = timeout(timeouts.embedding, entry.encode(embeddings_service))
        .await
        .map_err(|_| ItemIndexingError::Timeout {
            operation: "Encoding",
            timeout: timeouts.embedding,
        })??;

    timeout(
        timeouts.vector_index,
        vector_index.upsert(kind, owner_id, local_id, vector, payload),
    )
    .await
    .map_err(|_| ItemIndexingError::Timeout {
        operation: "Saving to the vector index",
        timeout: timeouts.vector_index,
    })??;

    Ok(())
}

fn to_payload<T: Serialize>(record: &T) -> Result<Payload, serde_json::Error> {
    match serde_json::to_value(record)? {
        JsonValue::Object(payload) => Ok(payload),
        _ => Err(<serde_json::Error as serde::ser::Error>::custom(
            "a record must serialize to an object",
        )),
    }
}
