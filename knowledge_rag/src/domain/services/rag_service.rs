use std::{sync::Arc, time::Duration};

use common::helper::error_chain_fmt;
use tokio::time::timeout;
use tracing::info;

use super::{context_builder::build_context, embeddings::EmbeddingsService, helpers::excerpt};
use crate::{
    domain::{
        entities::{
            knowledge_base::{KnowledgeBaseSnapshot, OwnerId},
            retrieved_context::{Answer, AnswerRequest, IndexReport, RetrievalLimits, RetrievedContext},
            timeouts::Timeouts,
        },
        use_cases::{
            index_knowledge_base::{self, IndexKnowledgeBaseError},
            retrieve_context::{self, RetrievalError},
        },
    },
    ports::{
        index_state_repository::{IndexStateRepository, IndexStateRepositoryError},
        text_generator::{GenerationError, TextGenerator},
        vector_index::{VectorIndex, VectorIndexError},
    },
};

pub const SYSTEM_PROMPT: &str = "You are a professional career advisor answering job application questions.

Use the provided relevant context from the candidate's background to craft a specific, compelling answer.

Guidelines:
- Keep answers concise (2-3 sentences)
- Reference specific experiences when relevant
- Be honest and authentic
- Show enthusiasm for the role";

pub const ANSWER_TEMPERATURE: f32 = 0.7;
pub const ANSWER_MAX_TOKENS: u32 = 300;
/// Characters of the context sent back with an answer
pub const CONTEXT_EXCERPT_MAX_CHARS: usize = 500;

#[derive(thiserror::Error)]
pub enum RagServiceError {
    #[error("Knowledge base {0} is not indexed, it must be indexed first")]
    NotIndexed(OwnerId),
    #[error(transparent)]
    IndexKnowledgeBaseError(#[from] IndexKnowledgeBaseError),
    #[error(transparent)]
    RetrievalError(#[from] RetrievalError),
    #[error(transparent)]
    GenerationError(#[from] GenerationError),
    #[error(transparent)]
    IndexStateRepositoryError(#[from] IndexStateRepositoryError),
    #[error(transparent)]
    VectorIndexError(#[from] VectorIndexError),
    #[error("Deleting the embeddings of knowledge base {owner_id} timed out after {timeout:?}")]
    DeletionTimeout { owner_id: OwnerId, timeout: Duration },
}

impl std::fmt::Debug for RagServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Token written in the index state of an indexed knowledge base
pub fn embedding_id(owner_id: OwnerId) -> String {
    format!("indexed_{}", owner_id)
}

/// Grounds answers to job application questions on the content of a knowledge base
///
/// Keeps the vector index and the recorded index state of each knowledge base consistent:
/// a knowledge base is searchable only after it has been indexed, until it is deleted.
pub struct RagService {
    embeddings_service: Arc<dyn EmbeddingsService>,
    vector_index: Arc<dyn VectorIndex>,
    index_state_repository: Arc<dyn IndexStateRepository>,
    timeouts: Timeouts,
}

impl RagService {
    pub fn new(
        embeddings_service: Arc<dyn EmbeddingsService>,
        vector_index: Arc<dyn VectorIndex>,
        index_state_repository: Arc<dyn IndexStateRepository>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            embeddings_service,
            vector_index,
            index_state_repository,
            timeouts,
        }
    }

    /// Creates the collections of the vector index, sized for the embeddings model
    pub async fn ensure_collections(&self) -> Result<(), RagServiceError> {
        self.vector_index
            .ensure_collections(self.embeddings_service.dimension() as u64)
            .await?;
        Ok(())
    }

    pub async fn is_indexed(&self, owner_id: OwnerId) -> Result<bool, RagServiceError> {
        Ok(self
            .index_state_repository
            .embedding_id(owner_id)
            .await?
            .is_some())
    }

    /// Indexes the snapshot of a knowledge base, replacing what was indexed for it before,
    /// then records the knowledge base as indexed
    #[tracing::instrument(name = "RAG indexing", skip(self, snapshot))]
    pub async fn index(
        &self,
        owner_id: OwnerId,
        snapshot: &KnowledgeBaseSnapshot,
    ) -> Result<IndexReport, RagServiceError> {
        // Fails early for an unknown knowledge base
        self.index_state_repository.embedding_id(owner_id).await?;

        let report = index_knowledge_base::execute(
            self.embeddings_service.as_ref(),
            self.vector_index.as_ref(),
            &self.timeouts,
            owner_id,
            snapshot,
        )
        .await?;

        self.index_state_repository
            .mark_indexed(owner_id, &embedding_id(owner_id))
            .await?;

        Ok(report)
    }

    #[tracing::instrument(name = "RAG search", skip(self))]
    pub async fn search(
        &self,
        question: &str,
        owner_id: OwnerId,
        limits: &RetrievalLimits,
    ) -> Result<RetrievedContext, RagServiceError> {
        self.ensure_indexed(owner_id).await?;

        let retrieved = retrieve_context::execute(
            self.embeddings_service.as_ref(),
            self.vector_index.as_ref(),
            &self.timeouts,
            question,
            owner_id,
            limits,
        )
        .await?;

        Ok(retrieved)
    }

    /// Answers a question with the generator, grounded on the most relevant entries
    /// of the knowledge base
    #[tracing::instrument(name = "RAG answer", skip(self, generator))]
    pub async fn answer(
        &self,
        request: &AnswerRequest,
        generator: &dyn TextGenerator,
    ) -> Result<Answer, RagServiceError> {
        let retrieved = self
            .search(&request.question, request.owner_id, &RetrievalLimits::default())
            .await?;

        let context = build_context(&retrieved);
        let prompt = build_user_prompt(request, &context);

        let answer = generator
            .generate(&prompt, SYSTEM_PROMPT, ANSWER_TEMPERATURE, ANSWER_MAX_TOKENS)
            .await?;

        info!(counts = ?retrieved.counts(), "Generated an answer");

        Ok(Answer {
            answer,
            retrieval_counts: retrieved.counts(),
            context_excerpt: excerpt(&context, CONTEXT_EXCERPT_MAX_CHARS),
        })
    }

    /// Removes the embeddings of a knowledge base and records it as not indexed
    #[tracing::instrument(name = "RAG deletion", skip(self))]
    pub async fn delete(&self, owner_id: OwnerId) -> Result<(), RagServiceError> {
        timeout(
            self.timeouts.vector_index,
            self.vector_index.delete_by_owner(owner_id),
        )
        .await
        .map_err(|_| RagServiceError::DeletionTimeout {
            owner_id,
            timeout: self.timeouts.vector_index,
        })??;

        self.index_state_repository.mark_unindexed(owner_id).await?;

        info!("Deleted the embeddings of the knowledge base");
        Ok(())
    }

    async fn ensure_indexed(&self, owner_id: OwnerId) -> Result<(), RagServiceError> {
        if !self.is_indexed(owner_id).await? {
            return Err(RagServiceError::NotIndexed(owner_id));
        }
        Ok(())
    }
}

/// The question, the job it is asked for, then the retrieved context
pub fn build_user_prompt(request: &AnswerRequest, context: &str) -> String {
    let mut blocks = vec![format!("Question: {}", request.question)];

    let job_lines: Vec<String> = [("Job", &request.job_title), ("Company", &request.company)]
        .into_iter()
        .filter_map(|(label, value)| value.as_ref().map(|value| format!("{}: {}", label, value)))
        .collect();
    if !job_lines.is_empty() {
        blocks.push(job_lines.join("\n"));
    }

    blocks.push(format!("Relevant Background Context:\n{}", context));
    blocks.push(
        "Based on the above context, provide a compelling answer to the question:".to_string(),
    );

    blocks.join("\n\n")
}
