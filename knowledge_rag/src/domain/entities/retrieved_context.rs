use serde::{Deserialize, Serialize};

use super::{
    embedding_point::{Kind, ScoredPoint},
    knowledge_base::OwnerId,
};

/// Number of similar Q&A pairs retrieved, whatever the other limits
pub const QA_PAIRS_LIMIT: u64 = 2;

/// Maximum number of hits retrieved for each kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrievalLimits {
    pub max_experiences: u64,
    pub max_projects: u64,
    pub max_skills: u64,
}

impl Default for RetrievalLimits {
    fn default() -> Self {
        Self {
            max_experiences: 3,
            max_projects: 2,
            max_skills: 5,
        }
    }
}

impl RetrievalLimits {
    pub fn limit(&self, kind: Kind) -> u64 {
        match kind {
            Kind::WorkExperience => self.max_experiences,
            Kind::Project => self.max_projects,
            Kind::Skill => self.max_skills,
            Kind::Qa => QA_PAIRS_LIMIT,
        }
    }
}

/// Hits for each kind, each list ranked by descending similarity
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RetrievedContext {
    pub experiences: Vec<ScoredPoint>,
    pub projects: Vec<ScoredPoint>,
    pub skills: Vec<ScoredPoint>,
    pub qa_pairs: Vec<ScoredPoint>,
}

impl RetrievedContext {
    pub fn counts(&self) -> RetrievalCounts {
        RetrievalCounts {
            num_experiences: self.experiences.len(),
            num_projects: self.projects.len(),
            num_skills: self.skills.len(),
            num_qa_pairs: self.qa_pairs.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetrievalCounts {
    pub num_experiences: usize,
    pub num_projects: usize,
    pub num_skills: usize,
    pub num_qa_pairs: usize,
}

/// Outcome of indexing the items of one kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct KindReport {
    pub attempted: usize,
    pub indexed: usize,
    pub failed: usize,
}

impl KindReport {
    pub fn record_success(&mut self) {
        self.attempted += 1;
        self.indexed += 1;
    }

    pub fn record_failure(&mut self) {
        self.attempted += 1;
        self.failed += 1;
    }
}

/// Outcome of indexing a knowledge base snapshot
///
/// `attempted` is the count confirmed to callers, `indexed`/`failed` tell which part
/// actually reached the vector index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct IndexReport {
    pub experiences: KindReport,
    pub projects: KindReport,
    pub skills: KindReport,
    pub qa_pairs: KindReport,
}

impl IndexReport {
    pub fn kind_mut(&mut self, kind: Kind) -> &mut KindReport {
        match kind {
            Kind::WorkExperience => &mut self.experiences,
            Kind::Project => &mut self.projects,
            Kind::Skill => &mut self.skills,
            Kind::Qa => &mut self.qa_pairs,
        }
    }

    pub fn total_failed(&self) -> usize {
        self.experiences.failed + self.projects.failed + self.skills.failed + self.qa_pairs.failed
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnswerRequest {
    pub question: String,
    pub owner_id: OwnerId,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
}

/// A generated answer with what grounded it
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Answer {
    pub answer: String,
    pub retrieval_counts: RetrievalCounts,
    /// The assembled context, truncated for display
    pub context_excerpt: String,
}
