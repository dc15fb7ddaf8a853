use async_trait::async_trait;
use common::helper::error_chain_fmt;

use crate::domain::entities::{
    embedding_point::{Embeddings, Kind},
    knowledge_base::{Project, QaPair, Skill, WorkExperience},
};

/// Separator between the segments of a canonical text
const SEGMENT_SEPARATOR: &str = " | ";

/// Generates embeddings from texts
///
/// Implementations are shared between concurrent requests and hold no per-request state.
/// For a given model version, the same text always gives the same vector.
#[async_trait]
pub trait EmbeddingsService: Send + Sync {
    /// Dimension of the generated vectors
    fn dimension(&self) -> usize;

    async fn encode_batch(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Embeddings>, EmbeddingsServiceError>;

    async fn encode(&self, text: &str) -> Result<Embeddings, EmbeddingsServiceError> {
        self.encode_batch(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or(EmbeddingsServiceError::MissingEmbeddings)
    }

    async fn encode_work_experience(
        &self,
        experience: &WorkExperience,
    ) -> Result<Embeddings, EmbeddingsServiceError> {
        let text = non_empty(Kind::WorkExperience, work_experience_text(experience))?;
        self.encode(&text).await
    }

    async fn encode_project(&self, project: &Project) -> Result<Embeddings, EmbeddingsServiceError> {
        let text = non_empty(Kind::Project, project_text(project))?;
        self.encode(&text).await
    }

    async fn encode_skill(&self, skill: &Skill) -> Result<Embeddings, EmbeddingsServiceError> {
        let text = non_empty(Kind::Skill, skill_text(skill))?;
        self.encode(&text).await
    }

    async fn encode_qa_pair(&self, qa_pair: &QaPair) -> Result<Embeddings, EmbeddingsServiceError> {
        let text = non_empty(Kind::Qa, qa_pair_text(qa_pair))?;
        self.encode(&text).await
    }
}

/// `Title: .. | Company: .. | Description: .. | Technologies: a, b`, absent fields omitted
pub fn work_experience_text(experience: &WorkExperience) -> String {
    let mut segments = Segments::default();
    segments.push("Title", experience.title.as_deref());
    segments.push("Company", experience.company.as_deref());
    segments.push("Description", experience.description.as_deref());
    segments.push_list("Technologies", &experience.technologies);
    segments.join()
}

/// `Project: .. | Description: .. | Technologies: a, b`, absent fields omitted
pub fn project_text(project: &Project) -> String {
    let mut segments = Segments::default();
    segments.push("Project", project.name.as_deref());
    segments.push("Description", project.description.as_deref());
    segments.push_list("Technologies", &project.technologies);
    segments.join()
}

/// `Skill: ..`, followed by ` | Proficiency: ..` when known
pub fn skill_text(skill: &Skill) -> String {
    let mut segments = Segments::default();
    segments.push("Skill", skill.name());
    // A proficiency without a skill name describes nothing
    if !segments.is_empty() {
        segments.push("Proficiency", skill.proficiency());
    }
    segments.join()
}

/// `Question: .. | Answer: ..`, or only the question when there is no answer
pub fn qa_pair_text(qa_pair: &QaPair) -> String {
    let mut segments = Segments::default();
    segments.push("Question", Some(qa_pair.question.as_str()));
    if !segments.is_empty() {
        segments.push("Answer", qa_pair.answer.as_deref());
    }
    segments.join()
}

/// Cosine similarity between two vectors
///
/// Returns 0.0 when the dimensions differ or when one of the vectors has a null norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

fn non_empty(kind: Kind, text: String) -> Result<String, EmbeddingsServiceError> {
    if text.is_empty() {
        return Err(EmbeddingsServiceError::NothingToEmbed(kind));
    }
    Ok(text)
}

/// Labelled segments of a canonical text. Empty values never produce a segment.
#[derive(Default)]
struct Segments(Vec<String>);

impl Segments {
    fn push(&mut self, label: &str, value: Option<&str>) {
        if let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) {
            self.0.push(format!("{}: {}", label, value));
        }
    }

    fn push_list(&mut self, label: &str, values: &[String]) {
        let values: Vec<&str> = values
            .iter()
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .collect();

        if !values.is_empty() {
            self.push(label, Some(&values.join(", ")));
        }
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn join(self) -> String {
        self.0.join(SEGMENT_SEPARATOR)
    }
}

#[derive(thiserror::Error)]
pub enum EmbeddingsServiceError {
    #[error("Embeddings model error: {0}")]
    ModelError(String),
    #[error("Nothing to embed from this {0} record")]
    NothingToEmbed(Kind),
    #[error("The embeddings runner is not available anymore")]
    RunnerUnavailable,
    #[error("The embeddings model returned no vector")]
    MissingEmbeddings,
}

impl std::fmt::Debug for EmbeddingsServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
