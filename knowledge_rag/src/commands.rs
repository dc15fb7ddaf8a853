use common::helper::error_chain_fmt;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{error, info};

use crate::{
    domain::{
        entities::{
            knowledge_base::{KnowledgeBaseSnapshot, OwnerId},
            retrieved_context::{AnswerRequest, RetrievalLimits},
        },
        services::rag_service::{RagService, RagServiceError},
    },
    ports::text_generator::TextGenerator,
};

/// A command read from one line of input, for ex:
/// `{"command": "search", "owner_id": 42, "question": "Why Rust?", "max_skills": 3}`
///
/// Without `owner_id`, commands apply to the default knowledge base.
#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Index {
        owner_id: Option<OwnerId>,
        #[serde(default)]
        knowledge_base: KnowledgeBaseSnapshot,
    },
    Search {
        owner_id: Option<OwnerId>,
        question: String,
        #[serde(flatten)]
        limits: RetrievalLimits,
    },
    Answer {
        owner_id: Option<OwnerId>,
        question: String,
        job_title: Option<String>,
        company: Option<String>,
    },
    Delete {
        owner_id: Option<OwnerId>,
    },
}

impl Command {
    pub fn try_parsing(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[derive(thiserror::Error)]
pub enum CommandError {
    #[error("Invalid command: {0}")]
    InvalidCommand(#[from] serde_json::Error),
    #[error(transparent)]
    RagServiceError(#[from] RagServiceError),
}

impl std::fmt::Debug for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Executes a command line and builds its response.
///
/// Never fails: an error is reported in the response, as `{"success": false, "error": ...}`
#[tracing::instrument(name = "Executing a command", skip(rag_service, generator, line))]
pub async fn execute_command(
    rag_service: &RagService,
    generator: &dyn TextGenerator,
    default_owner_id: OwnerId,
    line: &str,
) -> JsonValue {
    let result = match Command::try_parsing(line) {
        Ok(command) => {
            info!(?command, "Received command");
            execute(rag_service, generator, default_owner_id, command).await
        }
        Err(error) => Err(error.into()),
    };

    match result {
        Ok(response) => response,
        Err(error) => {
            error!(?error, "Failed to execute command");
            json!({
                "success": false,
                "error": error.to_string(),
            })
        }
    }
}

async fn execute(
    rag_service: &RagService,
    generator: &dyn TextGenerator,
    default_owner_id: OwnerId,
    command: Command,
) -> Result<JsonValue, CommandError> {
    let response = match command {
        Command::Index {
            owner_id,
            knowledge_base,
        } => {
            let owner_id = owner_id.unwrap_or(default_owner_id);
            let report = rag_service.index(owner_id, &knowledge_base).await?;

            json!({
                "success": true,
                "message": format!("Successfully indexed knowledge base {}", owner_id),
                "indexed": {
                    "experiences": report.experiences.attempted,
                    "projects": report.projects.attempted,
                    "skills": report.skills.attempted,
                    "qa_pairs": report.qa_pairs.attempted,
                },
                "report": report,
            })
        }
        Command::Search {
            owner_id,
            question,
            limits,
        } => {
            let owner_id = owner_id.unwrap_or(default_owner_id);
            let retrieved = rag_service.search(&question, owner_id, &limits).await?;

            json!({
                "success": true,
                "question": question,
                "retrieved_context": retrieved,
            })
        }
        Command::Answer {
            owner_id,
            question,
            job_title,
            company,
        } => {
            let request = AnswerRequest {
                question,
                owner_id: owner_id.unwrap_or(default_owner_id),
                job_title,
                company,
            };
            let answer = rag_service.answer(&request, generator).await?;

            json!({
                "success": true,
                "question": request.question,
                "answer": answer.answer,
                "retrieved_context": answer.retrieval_counts,
                "context_used": answer.context_excerpt,
            })
        }
        Command::Delete { owner_id } => {
            let owner_id = owner_id.unwrap_or(default_owner_id);
            rag_service.delete(owner_id).await?;

            json!({
                "success": true,
                "message": format!("Deleted index for knowledge base {}", owner_id),
            })
        }
    };

    Ok(response)
}
