use claims::{assert_matches, assert_none, assert_ok};
use knowledge_rag::domain::{
    entities::{embedding_point::Kind, retrieved_context::RetrievalLimits},
    services::rag_service::RagServiceError,
};
use serde_json::json;

use crate::helpers::spawn_app;

#[tokio::test]
async fn deleting_removes_every_embedding_of_the_owner_and_marks_it_unindexed() {
    // Arrange
    let app = spawn_app().await;
    let knowledge_base = json!({
        "work_experience": [{"title": "Backend Engineer"}],
        "projects": [{"name": "Compiler"}],
        "skills": ["Rust"],
        "qa_pairs": {"Why us?": "Your mission"}
    });
    app.index(1, knowledge_base.clone()).await;
    app.index(2, knowledge_base).await;

    // Act
    assert_ok!(app.rag_service.delete(1).await);

    // Assert
    for kind in Kind::ALL {
        assert_eq!(app.vector_index.count(kind, 1), 0);
        assert_eq!(app.vector_index.count(kind, 2), 1);
    }
    assert_none!(app.embedding_id(1).await);
    assert_eq!(app.embedding_id(2).await.as_deref(), Some("indexed_2"));

    let result = app
        .rag_service
        .search("Backend Engineer", 1, &RetrievalLimits::default())
        .await;
    assert_matches!(result, Err(RagServiceError::NotIndexed(1)));
}

#[tokio::test]
async fn deleting_a_knowledge_base_never_indexed_succeeds() {
    // Arrange
    let app = spawn_app().await;

    // Act
    assert_ok!(app.rag_service.delete(3).await);

    // Assert
    assert_none!(app.embedding_id(3).await);
}

#[tokio::test]
async fn a_deleted_knowledge_base_can_be_indexed_again() {
    // Arrange
    let app = spawn_app().await;
    app.index(4, json!({"skills": ["Rust"]})).await;
    assert_ok!(app.rag_service.delete(4).await);

    // Act
    app.index(4, json!({"skills": ["Go"]})).await;

    // Assert
    let retrieved = assert_ok!(
        app.rag_service
            .search("Go", 4, &RetrievalLimits::default())
            .await
    );
    assert_eq!(retrieved.skills.len(), 1);
    assert_eq!(retrieved.skills[0].payload_str("skill"), Some("Go"));
}
