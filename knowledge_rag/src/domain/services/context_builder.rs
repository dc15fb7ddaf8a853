use super::helpers::truncate_chars;
use crate::domain::entities::{embedding_point::ScoredPoint, retrieved_context::RetrievedContext};

/// Characters kept from an experience or project description
pub const DESCRIPTION_MAX_CHARS: usize = 200;
/// Characters kept from a previous answer
pub const ANSWER_MAX_CHARS: usize = 150;
/// Skill names listed at most
pub const SKILLS_MAX_COUNT: usize = 10;

const UNKNOWN: &str = "Unknown";

/// Serializes retrieved hits into the context given to the language model.
///
/// Sections come in a fixed order (experiences, projects, skills, Q&A), separated by a
/// blank line, and a section without hits is left out. Prompt templates rely on this
/// layout and on the character budgets above.
pub fn build_context(retrieved: &RetrievedContext) -> String {
    let sections: Vec<String> = [
        experiences_section(&retrieved.experiences),
        projects_section(&retrieved.projects),
        skills_section(&retrieved.skills),
        qa_pairs_section(&retrieved.qa_pairs),
    ]
    .into_iter()
    .flatten()
    .collect();

    sections.join("\n\n")
}

fn experiences_section(experiences: &[ScoredPoint]) -> Option<String> {
    if experiences.is_empty() {
        return None;
    }

    let mut lines = vec!["Relevant Work Experience:".to_string()];
    for experience in experiences {
        lines.push(format!(
            "- {} at {} (relevance: {:.2})",
            experience.payload_str("title").unwrap_or(UNKNOWN),
            experience.payload_str("company").unwrap_or(UNKNOWN),
            experience.score
        ));
        lines.push(description_line(experience));
    }

    Some(lines.join("\n"))
}

fn projects_section(projects: &[ScoredPoint]) -> Option<String> {
    if projects.is_empty() {
        return None;
    }

    let mut lines = vec!["Relevant Projects:".to_string()];
    for project in projects {
        lines.push(format!(
            "- {} (relevance: {:.2})",
            project.payload_str("name").unwrap_or(UNKNOWN),
            project.score
        ));
        lines.push(description_line(project));
    }

    Some(lines.join("\n"))
}

fn skills_section(skills: &[ScoredPoint]) -> Option<String> {
    if skills.is_empty() {
        return None;
    }

    let names: Vec<&str> = skills
        .iter()
        .take(SKILLS_MAX_COUNT)
        .map(|skill| {
            skill
                .payload_str("skill")
                .or(skill.payload_str("name"))
                .unwrap_or(UNKNOWN)
        })
        .collect();

    Some(format!("Relevant Skills: {}", names.join(", ")))
}

fn qa_pairs_section(qa_pairs: &[ScoredPoint]) -> Option<String> {
    if qa_pairs.is_empty() {
        return None;
    }

    let mut lines = vec!["Similar Questions You've Answered:".to_string()];
    for qa_pair in qa_pairs {
        lines.push(format!(
            "Q: {}",
            qa_pair.payload_str("question").unwrap_or(UNKNOWN)
        ));
        lines.push(format!(
            "A: {}",
            truncate_chars(qa_pair.payload_str("answer").unwrap_or_default(), ANSWER_MAX_CHARS)
        ));
    }

    Some(lines.join("\n"))
}

fn description_line(point: &ScoredPoint) -> String {
    format!(
        "  {}",
        truncate_chars(
            point.payload_str("description").unwrap_or_default(),
            DESCRIPTION_MAX_CHARS
        )
    )
}
