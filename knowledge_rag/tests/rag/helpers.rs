use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use common::telemetry::{get_tracing_subscriber, init_tracing_subscriber};
use knowledge_rag::{
    domain::{
        entities::{
            embedding_point::{Embeddings, Kind, Payload, ScoredPoint},
            knowledge_base::{KnowledgeBaseSnapshot, OwnerId},
            timeouts::Timeouts,
        },
        services::{
            embeddings::{EmbeddingsService, EmbeddingsServiceError},
            hashing_embedding::HashingEmbeddingsService,
            rag_service::RagService,
        },
    },
    ports::{
        index_state_repository::IndexStateRepository,
        text_generator::{GenerationError, TextGenerator},
        vector_index::{VectorIndex, VectorIndexError},
    },
    repositories::{
        embedding_point_in_memory_repository::EmbeddingPointInMemoryRepository,
        index_state_in_memory_repository::IndexStateInMemoryRepository,
    },
};
use once_cell::sync::Lazy;
use serde_json::Value as JsonValue;

pub const DIMENSION: usize = 384;

// Ensures that the `tracing` stack is only initialized once using `once_cell`
static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "rag_tests".to_string();

    // We cannot assign the output of `get_tracing_subscriber` to a variable based on the value of `TEST_LOG`
    // because the sink is part of the type returned by `get_tracing_subscriber`, therefore they are not the
    // same type. The easiest is to have 2 code branches: one with `stdout`, and one `sink`.
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber =
            get_tracing_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_tracing_subscriber(subscriber).expect("Failed to set up tracing");
    } else {
        let subscriber =
            get_tracing_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_tracing_subscriber(subscriber).expect("Failed to set up tracing");
    };
});

/// A RAG service over in-memory adapters, with handles to inspect them
pub struct TestApp {
    pub rag_service: RagService,
    pub vector_index: Arc<EmbeddingPointInMemoryRepository>,
    pub index_state_repository: Arc<IndexStateInMemoryRepository>,
}

impl TestApp {
    pub async fn index(&self, owner_id: OwnerId, knowledge_base: JsonValue) {
        let snapshot = snapshot(knowledge_base);
        self.rag_service
            .index(owner_id, &snapshot)
            .await
            .expect("Failed to index the knowledge base");
    }

    /// Local ids of the points of `owner_id` stored for `kind`, sorted
    pub fn local_ids(&self, kind: Kind, owner_id: OwnerId) -> Vec<String> {
        let mut local_ids: Vec<String> = self
            .vector_index
            .points(kind)
            .into_iter()
            .filter(|point| point.owner_id() == Some(owner_id))
            .filter_map(|point| {
                point
                    .payload
                    .get("local_id")
                    .and_then(JsonValue::as_str)
                    .map(str::to_string)
            })
            .collect();
        local_ids.sort();
        local_ids
    }

    pub async fn embedding_id(&self, owner_id: OwnerId) -> Option<String> {
        self.index_state_repository
            .embedding_id(owner_id)
            .await
            .expect("Failed to read the index state")
    }
}

pub fn snapshot(knowledge_base: JsonValue) -> KnowledgeBaseSnapshot {
    serde_json::from_value(knowledge_base).expect("Invalid knowledge base snapshot")
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(
        Arc::new(HashingEmbeddingsService::new(DIMENSION)),
        None,
        Timeouts::default(),
    )
    .await
}

/// Builds the test app
///
/// # Parameters
/// - `failing_kind`: searches on this kind fail, as if its collection were unreachable
pub async fn spawn_app_with(
    embeddings_service: Arc<dyn EmbeddingsService>,
    failing_kind: Option<Kind>,
    timeouts: Timeouts,
) -> TestApp {
    Lazy::force(&TRACING);

    let vector_index = Arc::new(EmbeddingPointInMemoryRepository::new());
    let index_state_repository = Arc::new(IndexStateInMemoryRepository::new());

    let service_vector_index: Arc<dyn VectorIndex> = match failing_kind {
        Some(kind) => Arc::new(FailingVectorIndex {
            inner: vector_index.clone(),
            failing_kind: kind,
        }),
        None => vector_index.clone(),
    };

    let rag_service = RagService::new(
        embeddings_service,
        service_vector_index,
        index_state_repository.clone(),
        timeouts,
    );
    rag_service
        .ensure_collections()
        .await
        .expect("Failed to create the collections");

    TestApp {
        rag_service,
        vector_index,
        index_state_repository,
    }
}

/// Text generator answering with a fixed text, and keeping every call it received
pub struct RecordingTextGenerator {
    answer: String,
    pub calls: Mutex<Vec<GenerationCall>>,
}

#[derive(Debug, Clone)]
pub struct GenerationCall {
    pub prompt: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl RecordingTextGenerator {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            calls: Mutex::new(vec![]),
        }
    }

    pub fn calls(&self) -> Vec<GenerationCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for RecordingTextGenerator {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, GenerationError> {
        self.calls.lock().unwrap().push(GenerationCall {
            prompt: prompt.to_string(),
            system_prompt: system_prompt.to_string(),
            temperature,
            max_tokens,
        });
        Ok(self.answer.clone())
    }
}

/// Hashed embeddings, produced after a delay
pub struct SlowEmbeddingsService {
    pub inner: HashingEmbeddingsService,
    pub delay: Duration,
}

#[async_trait]
impl EmbeddingsService for SlowEmbeddingsService {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn encode_batch(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Embeddings>, EmbeddingsServiceError> {
        tokio::time::sleep(self.delay).await;
        self.inner.encode_batch(texts).await
    }
}

/// Hashed embeddings, except for the texts containing `marker` which make the model fail
pub struct FlakyEmbeddingsService {
    pub inner: HashingEmbeddingsService,
    pub marker: String,
}

#[async_trait]
impl EmbeddingsService for FlakyEmbeddingsService {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn encode_batch(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Embeddings>, EmbeddingsServiceError> {
        if texts.iter().any(|text| text.contains(&self.marker)) {
            return Err(EmbeddingsServiceError::ModelError("Model crashed".into()));
        }
        self.inner.encode_batch(texts).await
    }
}

struct FailingVectorIndex {
    inner: Arc<EmbeddingPointInMemoryRepository>,
    failing_kind: Kind,
}

#[async_trait]
impl VectorIndex for FailingVectorIndex {
    async fn ensure_collections(&self, dimension: u64) -> Result<(), VectorIndexError> {
        self.inner.ensure_collections(dimension).await
    }

    async fn upsert(
        &self,
        kind: Kind,
        owner_id: OwnerId,
        local_id: &str,
        vector: Embeddings,
        payload: Payload,
    ) -> Result<(), VectorIndexError> {
        self.inner
            .upsert(kind, owner_id, local_id, vector, payload)
            .await
    }

    async fn search(
        &self,
        kind: Kind,
        query_vector: &[f32],
        owner_id: OwnerId,
        limit: u64,
    ) -> Result<Vec<ScoredPoint>, VectorIndexError> {
        if kind == self.failing_kind {
            return Err(VectorIndexError::QdrantError(format!(
                "Collection {} is unreachable",
                kind.collection_name()
            )));
        }
        self.inner.search(kind, query_vector, owner_id, limit).await
    }

    async fn delete_by_owner(&self, owner_id: OwnerId) -> Result<(), VectorIndexError> {
        self.inner.delete_by_owner(owner_id).await
    }
}
