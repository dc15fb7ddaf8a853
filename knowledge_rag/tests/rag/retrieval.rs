use std::{sync::Arc, time::Duration};

use claims::{assert_matches, assert_ok};
use knowledge_rag::domain::{
    entities::{
        embedding_point::Kind,
        retrieved_context::{RetrievalLimits, RetrievedContext},
        timeouts::Timeouts,
    },
    services::{
        context_builder::build_context,
        embeddings::{cosine_similarity, work_experience_text},
        hashing_embedding::HashingEmbeddingsService,
        rag_service::RagServiceError,
    },
    use_cases::retrieve_context::RetrievalError,
};
use serde_json::json;

use crate::helpers::{spawn_app, spawn_app_with, SlowEmbeddingsService, DIMENSION};

fn limits(max_experiences: u64, max_projects: u64, max_skills: u64) -> RetrievalLimits {
    RetrievalLimits {
        max_experiences,
        max_projects,
        max_skills,
    }
}

#[tokio::test]
async fn searching_with_an_experience_title_ranks_that_experience_first() {
    // Arrange
    let app = spawn_app().await;
    app.index(
        1,
        json!({
            "work_experience": [
                {"title": "Product Designer", "company": "Globex", "description": "Drew wireframes"},
                {"title": "Backend Engineer", "company": "Acme", "description": "Built APIs"},
                {"title": "Data Scientist", "company": "Initech", "description": "Trained models"}
            ]
        }),
    )
    .await;

    // Act
    let retrieved = assert_ok!(
        app.rag_service
            .search("Backend Engineer", 1, &limits(3, 2, 5))
            .await
    );

    // Assert
    assert_eq!(retrieved.experiences.len(), 3);
    assert_eq!(retrieved.experiences[0].payload_str("title"), Some("Backend Engineer"));
    assert!(retrieved
        .experiences
        .windows(2)
        .all(|pair| pair[0].score >= pair[1].score));
}

#[tokio::test]
async fn backend_engineer_scenario() {
    // Arrange
    let app = spawn_app().await;
    let experience = json!({"title": "Backend Engineer", "company": "Acme", "description": "Built APIs"});
    app.index(
        42,
        json!({
            "work_experience": [experience.clone()],
            "projects": [],
            "skills": ["Python"],
            "qa_pairs": {}
        }),
    )
    .await;

    // Act
    let retrieved = assert_ok!(
        app.rag_service
            .search("backend engineer roles", 42, &limits(3, 2, 5))
            .await
    );

    // Assert
    assert_eq!(retrieved.experiences.len(), 1);
    let hit = &retrieved.experiences[0];
    assert_eq!(hit.payload_str("title"), Some("Backend Engineer"));
    assert_eq!(hit.payload_str("company"), Some("Acme"));

    let embedder = HashingEmbeddingsService::new(DIMENSION);
    let document = embedder.embed(&work_experience_text(
        &serde_json::from_value(experience).unwrap(),
    ));
    let control_score = cosine_similarity(
        &embedder.embed("watercolor painting techniques"),
        &document,
    );
    assert!(hit.score > control_score);

    assert_eq!(retrieved.skills.len(), 1);
    assert_eq!(retrieved.skills[0].payload_str("skill"), Some("Python"));
    assert!(build_context(&retrieved).starts_with(
        "Relevant Work Experience:\n- Backend Engineer at Acme (relevance: "
    ));
}

#[tokio::test]
async fn searching_never_returns_the_entries_of_another_owner() {
    // Arrange
    let app = spawn_app().await;
    app.index(
        1,
        json!({
            "work_experience": [{"title": "Backend Engineer", "company": "Acme"}],
            "skills": ["Rust"],
            "qa_pairs": {"Why backend?": "I like APIs"}
        }),
    )
    .await;
    app.index(
        2,
        json!({
            "work_experience": [{"title": "Backend Engineer", "company": "Globex"}],
            "projects": [{"name": "Backend rewrite"}],
            "skills": ["Rust", "Go"],
            "qa_pairs": {"Why backend?": "Scalability"}
        }),
    )
    .await;

    // Act
    let retrieved = assert_ok!(
        app.rag_service
            .search("Backend Engineer Rust", 1, &limits(10, 10, 10))
            .await
    );

    // Assert
    let hits = retrieved
        .experiences
        .iter()
        .chain(&retrieved.projects)
        .chain(&retrieved.skills)
        .chain(&retrieved.qa_pairs);
    for hit in hits {
        assert_eq!(hit.payload["owner_id"], json!(1));
    }
    assert!(retrieved.projects.is_empty());
    assert_eq!(retrieved.skills.len(), 1);
}

#[tokio::test]
async fn searching_an_indexed_but_empty_knowledge_base_returns_empty_lists() {
    // Arrange
    let app = spawn_app().await;
    app.index(5, json!({})).await;

    // Act
    let retrieved = assert_ok!(
        app.rag_service
            .search("anything", 5, &RetrievalLimits::default())
            .await
    );

    // Assert
    assert_eq!(retrieved, RetrievedContext::default());
    assert_eq!(build_context(&retrieved), "");
}

#[tokio::test]
async fn searching_a_knowledge_base_never_indexed_is_rejected() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let result = app
        .rag_service
        .search("anything", 404, &RetrievalLimits::default())
        .await;

    // Assert
    assert_matches!(result, Err(RagServiceError::NotIndexed(404)));
}

#[tokio::test]
async fn each_kind_has_its_own_limit_and_qa_pairs_are_limited_to_two() {
    // Arrange
    let app = spawn_app().await;
    app.index(
        8,
        json!({
            "work_experience": [{"title": "A"}, {"title": "B"}, {"title": "C"}, {"title": "D"}],
            "projects": [{"name": "P1"}, {"name": "P2"}, {"name": "P3"}],
            "skills": ["S1", "S2", "S3", "S4", "S5", "S6", "S7"],
            "qa_pairs": {"Q1": "A1", "Q2": "A2", "Q3": "A3", "Q4": "A4"}
        }),
    )
    .await;

    // Act
    let retrieved = assert_ok!(
        app.rag_service
            .search("question", 8, &limits(2, 1, 6))
            .await
    );

    // Assert
    let counts = retrieved.counts();
    assert_eq!(counts.num_experiences, 2);
    assert_eq!(counts.num_projects, 1);
    assert_eq!(counts.num_skills, 6);
    assert_eq!(counts.num_qa_pairs, 2);
}

#[tokio::test]
async fn a_failing_search_fails_the_whole_retrieval() {
    // Arrange
    let app = spawn_app_with(
        Arc::new(HashingEmbeddingsService::new(DIMENSION)),
        Some(Kind::Project),
        Timeouts::default(),
    )
    .await;
    app.index(
        6,
        json!({"work_experience": [{"title": "Backend Engineer"}], "projects": [{"name": "API"}]}),
    )
    .await;

    // Act
    let result = app
        .rag_service
        .search("Backend Engineer", 6, &RetrievalLimits::default())
        .await;

    // Assert
    assert_matches!(
        result,
        Err(RagServiceError::RetrievalError(RetrievalError::VectorIndexError(_)))
    );
}

#[tokio::test]
async fn an_embedding_timeout_fails_the_retrieval() {
    // Arrange
    let app = spawn_app_with(
        Arc::new(SlowEmbeddingsService {
            inner: HashingEmbeddingsService::new(DIMENSION),
            delay: Duration::from_millis(500),
        }),
        None,
        Timeouts {
            embedding: Duration::from_millis(20),
            vector_index: Duration::from_secs(5),
        },
    )
    .await;
    app.index(6, json!({})).await;

    // Act
    let result = app
        .rag_service
        .search("Backend Engineer", 6, &RetrievalLimits::default())
        .await;

    // Assert
    assert_matches!(
        result,
        Err(RagServiceError::RetrievalError(RetrievalError::Timeout { .. }))
    );
}
