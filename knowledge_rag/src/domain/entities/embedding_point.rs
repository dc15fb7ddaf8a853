use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use super::knowledge_base::OwnerId;

pub type Embeddings = Vec<f32>;

/// Payload stored alongside a vector: the original record plus the decoration keys below
pub type Payload = Map<String, JsonValue>;

pub const OWNER_ID_KEY: &str = "owner_id";
pub const LOCAL_ID_KEY: &str = "local_id";
pub const KIND_KEY: &str = "kind";

/// Kind of knowledge base entity. Each kind has its own collection in the vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    WorkExperience,
    Project,
    Skill,
    Qa,
}

impl Kind {
    pub const ALL: [Kind; 4] = [Kind::WorkExperience, Kind::Project, Kind::Skill, Kind::Qa];

    /// Name of the collection holding the points of this kind
    pub fn collection_name(&self) -> &'static str {
        match self {
            Kind::WorkExperience => "work_experiences",
            Kind::Project => "projects",
            Kind::Skill => "skills",
            Kind::Qa => "qa_pairs",
        }
    }

    /// Discriminator written in the `kind` payload key
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::WorkExperience => "work_experience",
            Kind::Project => "project",
            Kind::Skill => "skill",
            Kind::Qa => "qa",
        }
    }

    /// Prefix of the positional local ids: `exp_0`, `proj_3` ...
    pub fn local_id_prefix(&self) -> &'static str {
        match self {
            Kind::WorkExperience => "exp",
            Kind::Project => "proj",
            Kind::Skill => "skill",
            Kind::Qa => "qa",
        }
    }

    pub fn local_id(&self, position: usize) -> String {
        format!("{}_{}", self.local_id_prefix(), position)
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The atomic unit stored in the vector index
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingPoint {
    pub id: Uuid,
    pub vector: Embeddings,
    pub payload: Payload,
}

impl EmbeddingPoint {
    /// Builds a point with a fresh id, decorating the payload with its owner, local id and kind
    pub fn new(
        kind: Kind,
        owner_id: OwnerId,
        local_id: &str,
        vector: Embeddings,
        mut payload: Payload,
    ) -> Self {
        payload.insert(OWNER_ID_KEY.into(), JsonValue::from(owner_id));
        payload.insert(LOCAL_ID_KEY.into(), JsonValue::from(local_id));
        payload.insert(KIND_KEY.into(), JsonValue::from(kind.as_str()));

        Self {
            id: Uuid::new_v4(),
            vector,
            payload,
        }
    }

    pub fn owner_id(&self) -> Option<OwnerId> {
        self.payload.get(OWNER_ID_KEY).and_then(JsonValue::as_i64)
    }
}

/// A search hit: the similarity score and the stored payload
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScoredPoint {
    pub score: f32,
    pub payload: Payload,
}

impl ScoredPoint {
    /// A string attribute of the payload, `None` if absent or not a string
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(JsonValue::as_str)
    }
}
