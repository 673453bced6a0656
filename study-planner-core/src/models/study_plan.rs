use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A study plan: a piece of source material queued for note generation.
///
/// Plans with a `scheduled_time` in the future start out `Pending` and are
/// picked up by the background scheduler once that time has passed. Plans
/// without a schedule are `NotStarted` and only move when a user edits them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudyPlan {
    pub id: Uuid,
    pub title: String,
    /// Locator of the source material, usually a video URL.
    pub content_reference: Option<String>,
    pub note_format: NoteFormat,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudyPlan {
    /// True when the scheduler may claim this plan at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == PlanStatus::Pending
            && self.scheduled_time.is_some_and(|at| at <= now)
    }

    /// Has something to study or a time to study it, whatever its status.
    pub fn is_planned(&self) -> bool {
        self.content_reference.is_some() || self.scheduled_time.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    NotStarted,
    Pending,
    Processing,
    Completed,
    Failed,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(Self::NotStarted),
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Status implied by a requested schedule: `Pending` only for a time
    /// strictly after `now`.
    pub fn initial(scheduled_time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match scheduled_time {
            Some(at) if at > now => Self::Pending,
            _ => Self::NotStarted,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Desired shape of the generated notes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoteFormat {
    #[default]
    Summary,
    BulletPoints,
    QAndA,
    Flashcards,
}

impl NoteFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::BulletPoints => "bullet_points",
            Self::QAndA => "q_and_a",
            Self::Flashcards => "flashcards",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "summary" => Some(Self::Summary),
            "bullet_points" => Some(Self::BulletPoints),
            "q_and_a" => Some(Self::QAndA),
            "flashcards" => Some(Self::Flashcards),
            _ => None,
        }
    }

    /// Human-readable label, as shown to users and embedded in prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Summary => "Summary",
            Self::BulletPoints => "Bullet Points",
            Self::QAndA => "Q&A",
            Self::Flashcards => "Flashcards",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStudyPlanInput {
    pub title: String,
    pub content_reference: Option<String>,
    #[serde(default)]
    pub note_format: NoteFormat,
    pub scheduled_time: Option<DateTime<Utc>>,
}

/// Partial edit of a plan.
///
/// `scheduled_time` distinguishes "leave as is" (field absent) from "clear
/// the schedule" (explicit `null`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateStudyPlanInput {
    pub title: Option<String>,
    pub content_reference: Option<String>,
    pub note_format: Option<NoteFormat>,
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<Option<DateTime<Utc>>>,
}

mod double_option {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(
        value: &Option<Option<DateTime<Utc>>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<DateTime<Utc>>::deserialize(deserializer).map(Some)
    }
}
