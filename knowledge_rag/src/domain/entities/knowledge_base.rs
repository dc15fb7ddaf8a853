use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_aux::field_attributes::deserialize_default_from_null;
use serde_json::{Map, Value as JsonValue};

/// Identifier of a knowledge base, used to scope every point of the vector index
pub type OwnerId = i64;

/// Snapshot of a knowledge base, as provided by the profile management layer
///
/// Only the parts used to ground answers are read: the other profile fields
/// (contact details, education, preferences ...) are ignored.
/// A list set to `null` is read as an empty one.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct KnowledgeBaseSnapshot {
    #[serde(default, deserialize_with = "deserialize_default_from_null")]
    pub work_experience: Vec<Record<WorkExperience>>,
    #[serde(default, deserialize_with = "deserialize_default_from_null")]
    pub projects: Vec<Record<Project>>,
    #[serde(default, deserialize_with = "deserialize_default_from_null")]
    pub skills: Vec<Record<Skill>>,
    /// Question -> answer. Ordered by question so positional ids stay stable between runs.
    #[serde(default, deserialize_with = "deserialize_default_from_null")]
    pub qa_pairs: BTreeMap<String, Option<String>>,
}

impl KnowledgeBaseSnapshot {
    pub fn try_parsing(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    pub fn qa_pairs(&self) -> impl Iterator<Item = QaPair> + '_ {
        self.qa_pairs.iter().map(|(question, answer)| QaPair {
            question: question.clone(),
            answer: answer.clone(),
        })
    }
}

/// An entry of one of the knowledge base lists.
///
/// Entries are parsed leniently: one that does not fit the expected record shape is kept
/// as `Malformed` instead of failing the whole snapshot, so only this entry gets skipped.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Record<T> {
    Valid(T),
    Malformed(JsonValue),
}

impl<T> From<T> for Record<T> {
    fn from(record: T) -> Self {
        Self::Valid(record)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct WorkExperience {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_default_from_null",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub technologies: Vec<String>,
    /// Any other attribute (dates, location ...), kept as is in the stored payload
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Project {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_default_from_null",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub technologies: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Skill {
    Name(String),
    Detailed(DetailedSkill),
}

impl Skill {
    /// The skill name, read from `skill` first then `name` for a detailed skill
    pub fn name(&self) -> Option<&str> {
        match self {
            Skill::Name(name) => Some(name.as_str()),
            Skill::Detailed(skill) => skill.skill.as_deref().or(skill.name.as_deref()),
        }
    }

    pub fn proficiency(&self) -> Option<&str> {
        match self {
            Skill::Name(_) => None,
            Skill::Detailed(skill) => skill.proficiency.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DetailedSkill {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proficiency: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QaPair {
    pub question: String,
    pub answer: Option<String>,
}
