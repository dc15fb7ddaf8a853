use std::sync::Arc;

use knowledge_rag::{
    configuration::{
        ApplicationSettings, EmbeddingsProvider, EmbeddingsSettings, OllamaSettings, Settings,
        TimeoutsSettings,
    },
    startup::Application,
};
use serde_json::{json, Value as JsonValue};

use crate::helpers::{RecordingTextGenerator, DIMENSION};

/// Settings running everything in memory, with hashed embeddings
fn in_memory_settings() -> Settings {
    Settings {
        application: ApplicationSettings {
            default_owner_id: 1,
        },
        embeddings: EmbeddingsSettings {
            provider: EmbeddingsProvider::Hashing,
            model: "all-mini-lm-l6-v2".into(),
            dimension: DIMENSION,
        },
        qdrant: None,
        database: None,
        timeouts: TimeoutsSettings {
            embedding_milliseconds: 5000,
            vector_index_milliseconds: 5000,
        },
        ollama: OllamaSettings {
            base_url: "http://localhost:11434".into(),
            model: "llama3.2".into(),
            timeout_milliseconds: 1000,
        },
    }
}

async fn run_commands(commands: &[&str]) -> Vec<JsonValue> {
    let application = Application::build(in_memory_settings())
        .await
        .expect("Failed to build the application")
        .with_text_generator(Arc::new(RecordingTextGenerator::new("Generated answer")));

    let input = commands.join("\n");
    let mut output = Vec::new();
    application
        .serve(input.as_bytes(), &mut output)
        .await
        .expect("Failed to serve the commands");

    String::from_utf8(output)
        .expect("Responses are not UTF-8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("A response is not JSON"))
        .collect()
}

#[tokio::test]
async fn commands_are_executed_in_order_with_one_response_per_line() {
    // Act
    let responses = run_commands(&[
        r#"{"command": "index", "owner_id": 42, "knowledge_base": {"work_experience": [{"title": "Backend Engineer", "company": "Acme"}], "skills": ["Python", 3]}}"#,
        r#"{"command": "search", "owner_id": 42, "question": "backend engineer roles", "max_experiences": 1}"#,
        "",
        r#"{"command": "answer", "owner_id": 42, "question": "Why Acme?", "company": "Acme"}"#,
        r#"{"command": "delete", "owner_id": 42}"#,
        r#"{"command": "search", "owner_id": 42, "question": "backend engineer roles"}"#,
    ])
    .await;

    // Assert
    assert_eq!(responses.len(), 5);

    assert_eq!(responses[0]["success"], json!(true));
    assert_eq!(
        responses[0]["message"],
        json!("Successfully indexed knowledge base 42")
    );
    assert_eq!(
        responses[0]["indexed"],
        json!({"experiences": 1, "projects": 0, "skills": 2, "qa_pairs": 0})
    );
    assert_eq!(responses[0]["report"]["skills"]["failed"], json!(1));

    assert_eq!(responses[1]["success"], json!(true));
    let experiences = responses[1]["retrieved_context"]["experiences"]
        .as_array()
        .unwrap();
    assert_eq!(experiences.len(), 1);
    assert_eq!(experiences[0]["payload"]["title"], json!("Backend Engineer"));

    assert_eq!(responses[2]["success"], json!(true));
    assert_eq!(responses[2]["answer"], json!("Generated answer"));
    assert_eq!(responses[2]["retrieved_context"]["num_experiences"], json!(1));
    assert_eq!(responses[2]["retrieved_context"]["num_skills"], json!(1));

    assert_eq!(
        responses[3],
        json!({"success": true, "message": "Deleted index for knowledge base 42"})
    );

    assert_eq!(responses[4]["success"], json!(false));
    assert_eq!(
        responses[4]["error"],
        json!("Knowledge base 42 is not indexed, it must be indexed first")
    );
}

#[tokio::test]
async fn commands_without_owner_apply_to_the_default_knowledge_base() {
    // Act
    let responses = run_commands(&[
        r#"{"command": "index", "knowledge_base": {"skills": ["Rust"]}}"#,
        r#"{"command": "search", "question": "Rust"}"#,
    ])
    .await;

    // Assert
    assert_eq!(
        responses[0]["message"],
        json!("Successfully indexed knowledge base 1")
    );
    assert_eq!(
        responses[1]["retrieved_context"]["skills"][0]["payload"]["owner_id"],
        json!(1)
    );
}

#[tokio::test]
async fn an_invalid_command_gets_an_error_response_and_the_next_ones_still_run() {
    // Act
    let responses = run_commands(&[
        "not json",
        r#"{"command": "reindex_all"}"#,
        r#"{"command": "delete", "owner_id": 5}"#,
    ])
    .await;

    // Assert
    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0]["success"], json!(false));
    assert!(responses[0]["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid command"));
    assert_eq!(responses[1]["success"], json!(false));
    assert_eq!(responses[2]["success"], json!(true));
}
