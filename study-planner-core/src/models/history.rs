use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A recorded generation outcome.
///
/// `content` is the source reference (URL or filename). Entries produced by
/// the scheduler carry the plan's `content_reference` here; the link back to
/// the plan is by value only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: HistoryKind,
    pub content: String,
    pub notes: String,
    pub quiz: Vec<QuizQuestion>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    StudyPlan,
    Youtube,
    File,
}

impl HistoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StudyPlan => "study_plan",
            Self::Youtube => "youtube",
            Self::File => "file",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "study_plan" => Some(Self::StudyPlan),
            "youtube" => Some(Self::Youtube),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizQuestion {
    pub question: String,
    /// Present for multiple-choice questions only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    pub answer: String,
}

/// Notes plus quiz, as returned by a content generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StudyMaterial {
    pub notes: String,
    #[serde(default)]
    pub quiz: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateHistoryInput {
    #[serde(rename = "type")]
    pub kind: HistoryKind,
    pub content: String,
    pub notes: String,
    #[serde(default)]
    pub quiz: Vec<QuizQuestion>,
}

impl CreateHistoryInput {
    pub fn from_material(
        kind: HistoryKind,
        content: impl Into<String>,
        material: StudyMaterial,
    ) -> Self {
        Self {
            kind,
            content: content.into(),
            notes: material.notes,
            quiz: material.quiz,
        }
    }
}
