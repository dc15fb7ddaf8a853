use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};

use crate::{
    domain::entities::knowledge_base::OwnerId,
    ports::index_state_repository::{IndexStateRepository, IndexStateRepositoryError},
};

/// Index state kept in the `embedding_id` column of the `knowledge_base` table
///
/// The table itself belongs to the profile management layer: only this column is written.
pub struct IndexStatePostgresRepository {
    pg_pool: PgPool,
}

impl IndexStatePostgresRepository {
    pub fn new(pg_pool: PgPool) -> Self {
        Self { pg_pool }
    }

    #[tracing::instrument(name = "Updating the embedding id of a knowledge base", skip(self))]
    async fn set_embedding_id(
        &self,
        owner_id: OwnerId,
        embedding_id: Option<&str>,
    ) -> Result<(), IndexStateRepositoryError> {
        let result = sqlx::query(
            r#"
    UPDATE knowledge_base
    SET embedding_id = $1, updated_at = $2
    WHERE id = $3
            "#,
        )
        .bind(embedding_id)
        .bind(Utc::now())
        .bind(owner_id)
        .execute(&self.pg_pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(IndexStateRepositoryError::KnowledgeBaseNotFound(owner_id));
        }

        Ok(())
    }
}

#[async_trait]
impl IndexStateRepository for IndexStatePostgresRepository {
    #[tracing::instrument(name = "Fetching the embedding id of a knowledge base", skip(self))]
    async fn embedding_id(
        &self,
        owner_id: OwnerId,
    ) -> Result<Option<String>, IndexStateRepositoryError> {
        let row = sqlx::query(
            r#"
    SELECT embedding_id FROM knowledge_base WHERE id = $1
            "#,
        )
        .bind(owner_id)
        .fetch_optional(&self.pg_pool)
        .await?
        .ok_or(IndexStateRepositoryError::KnowledgeBaseNotFound(owner_id))?;

        Ok(row.try_get("embedding_id")?)
    }

    async fn mark_indexed(
        &self,
        owner_id: OwnerId,
        embedding_id: &str,
    ) -> Result<(), IndexStateRepositoryError> {
        self.set_embedding_id(owner_id, Some(embedding_id)).await
    }

    async fn mark_unindexed(&self, owner_id: OwnerId) -> Result<(), IndexStateRepositoryError> {
        self.set_embedding_id(owner_id, None).await
    }
}
