use std::sync::Arc;

use qdrant_client::prelude::{QdrantClient, QdrantClientConfig};
use secrecy::ExposeSecret;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::info;

#[cfg(feature = "huggingface")]
use crate::domain::services::huggingface_embedding::HuggingFaceEmbeddingsService;
use crate::{
    commands::execute_command,
    configuration::{
        DatabaseSettings, EmbeddingsProvider, EmbeddingsSettings, QdrantSettings, Settings,
    },
    domain::{
        entities::{knowledge_base::OwnerId, timeouts::Timeouts},
        services::{
            embeddings::{EmbeddingsService, EmbeddingsServiceError},
            hashing_embedding::HashingEmbeddingsService,
            rag_service::{RagService, RagServiceError},
        },
    },
    ports::{
        index_state_repository::IndexStateRepository,
        text_generator::{GenerationError, TextGenerator},
        vector_index::{VectorIndex, VectorIndexError},
    },
    repositories::{
        embedding_point_in_memory_repository::EmbeddingPointInMemoryRepository,
        embedding_point_qdrant_repository::EmbeddingPointQdrantRepository,
        index_state_in_memory_repository::IndexStateInMemoryRepository,
        index_state_postgres_repository::IndexStatePostgresRepository,
        ollama_text_generator::OllamaTextGenerator,
    },
};

/// Holds the RAG service built from the settings, and the generator used to answer questions
pub struct Application {
    rag_service: RagService,
    text_generator: Arc<dyn TextGenerator>,
    default_owner_id: OwnerId,
}

impl Application {
    #[tracing::instrument(name = "Building RAG application")]
    pub async fn build(settings: Settings) -> Result<Self, ApplicationError> {
        let embeddings_service = get_embeddings_service(&settings.embeddings)?;

        let vector_index: Arc<dyn VectorIndex> = match &settings.qdrant {
            Some(qdrant_settings) => Arc::new(EmbeddingPointQdrantRepository::try_new(
                get_qdrant_client(qdrant_settings)?,
                &qdrant_settings.collection_prefix,
                &qdrant_settings.collection_distance,
            )?),
            None => {
                info!("No Qdrant settings, embeddings are kept in memory");
                Arc::new(EmbeddingPointInMemoryRepository::new())
            }
        };

        let index_state_repository: Arc<dyn IndexStateRepository> = match &settings.database {
            Some(database_settings) => Arc::new(IndexStatePostgresRepository::new(
                get_connection_pool(database_settings),
            )),
            None => {
                info!("No database settings, index states are kept in memory");
                Arc::new(IndexStateInMemoryRepository::new())
            }
        };

        let rag_service = RagService::new(
            embeddings_service,
            vector_index,
            index_state_repository,
            Timeouts::from(&settings.timeouts),
        );
        rag_service.ensure_collections().await?;

        let text_generator = Arc::new(OllamaTextGenerator::try_new(
            &settings.ollama.base_url,
            &settings.ollama.model,
            settings.ollama.timeout(),
        )?);

        Ok(Self {
            rag_service,
            text_generator,
            default_owner_id: settings.application.default_owner_id,
        })
    }

    pub fn with_text_generator(mut self, text_generator: Arc<dyn TextGenerator>) -> Self {
        self.text_generator = text_generator;
        self
    }

    /// Runs the application until stopped: commands are read from stdin, one JSON object by line,
    /// and each response is written to stdout on its own line
    ///
    /// self is moved in order for the application not to drop out of scope
    pub async fn run_until_stopped(self) -> Result<(), ApplicationError> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await?;

        info!("👋 Bye!");
        Ok(())
    }

    /// Executes the commands read from `input` until its end, writing the responses to `output`
    pub async fn serve<R, W>(&self, input: R, mut output: W) -> Result<(), ApplicationError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let response = execute_command(
                &self.rag_service,
                self.text_generator.as_ref(),
                self.default_owner_id,
                &line,
            )
            .await;

            output.write_all(response.to_string().as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }

        Ok(())
    }
}

/// Set up the embeddings service chosen in the configuration
pub fn get_embeddings_service(
    settings: &EmbeddingsSettings,
) -> Result<Arc<dyn EmbeddingsService>, ApplicationError> {
    match settings.provider {
        EmbeddingsProvider::Hashing => Ok(Arc::new(HashingEmbeddingsService::new(
            settings.dimension,
        ))),
        #[cfg(feature = "huggingface")]
        EmbeddingsProvider::Huggingface => Ok(Arc::new(HuggingFaceEmbeddingsService::try_new(
            &settings.model,
        )?)),
        #[cfg(not(feature = "huggingface"))]
        EmbeddingsProvider::Huggingface => Err(ApplicationError::MissingFeature("huggingface")),
    }
}

/// Set up a client to Qdrant
pub fn get_qdrant_client(config: &QdrantSettings) -> Result<QdrantClient, ApplicationError> {
    let mut qdrant_config = QdrantClientConfig::from_url(&config.get_grpc_base_url());
    if let Some(api_key) = &config.api_key {
        qdrant_config.api_key = Some(api_key.expose_secret().to_string());
    }

    QdrantClient::new(Some(qdrant_config)).map_err(|e| ApplicationError::QdrantError(e.to_string()))
}

/// Lazily connects to Postgres: the first query opens the connection
pub fn get_connection_pool(settings: &DatabaseSettings) -> PgPool {
    PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(2))
        .connect_lazy_with(settings.with_db())
}

#[derive(thiserror::Error, Debug)]
pub enum ApplicationError {
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error("Error from Qdrant: {0}")]
    QdrantError(String),
    #[error("The `{0}` feature is needed by the configured embeddings provider")]
    MissingFeature(&'static str),
    #[error(transparent)]
    EmbeddingsServiceError(#[from] EmbeddingsServiceError),
    #[error(transparent)]
    VectorIndexError(#[from] VectorIndexError),
    #[error(transparent)]
    RagServiceError(#[from] RagServiceError),
    #[error(transparent)]
    GenerationError(#[from] GenerationError),
}
