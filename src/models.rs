//! Core data types flowing through the classification pipeline.
//!
//! These types represent the envelopes, classification results, course tasks,
//! and knowledge entries that flow through ingestion, analysis, and
//! aggregation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Origin of an envelope. A closed set: adding a source is a variant
/// addition, not a string comparison scattered through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Telegram,
    WebSchedule,
    /// Catch-all for sources without a dedicated prompt template.
    #[serde(other)]
    Generic,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Telegram => "telegram",
            SourceType::WebSchedule => "web_schedule",
            SourceType::Generic => "generic",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "telegram" => SourceType::Telegram,
            "web_schedule" => SourceType::WebSchedule,
            _ => SourceType::Generic,
        }
    }
}

/// Role the transport layer assigned to the sender of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    Teacher,
    Student,
    #[default]
    #[serde(other)]
    Unknown,
}

impl SenderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderRole::Teacher => "teacher",
            SenderRole::Student => "student",
            SenderRole::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "teacher" => SenderRole::Teacher,
            "student" => SenderRole::Student,
            _ => SenderRole::Unknown,
        }
    }
}

/// Contextual metadata carried alongside the raw text. Recognized keys are
/// typed; anything else a source adapter attaches survives in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    #[serde(default)]
    pub sender_role: SenderRole,
    #[serde(default)]
    pub chat_title: Option<String>,
    #[serde(default)]
    pub is_reply: bool,
    #[serde(default)]
    pub reply_to_source_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Normalized input contract produced by every source adapter.
///
/// Immutable value: created by an adapter, consumed exactly once by the
/// classifier, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionEnvelope {
    /// Raw text content. May be empty.
    pub text: String,
    pub source_type: SourceType,
    /// Opaque identifier, unique within `source_type`.
    pub source_id: String,
    #[serde(default)]
    pub metadata: EnvelopeMetadata,
}

/// Message category decided by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Announcement,
    Deadline,
    Link,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Announcement => "announcement",
            Category::Deadline => "deadline",
            Category::Link => "link",
            Category::Other => "other",
        }
    }

    /// Whitelist parse. Unknown values are rejected, not coerced — the
    /// normalizer decides the default.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "announcement" => Some(Category::Announcement),
            "deadline" => Some(Category::Deadline),
            "link" => Some(Category::Link),
            "other" => Some(Category::Other),
            _ => None,
        }
    }
}

/// Whether a course task recurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    OneTime,
    Periodic,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::OneTime => "one_time",
            TaskType::Periodic => "periodic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "one_time" => Some(TaskType::OneTime),
            "periodic" => Some(TaskType::Periodic),
            _ => None,
        }
    }
}

/// What the message asks the aggregator to do with its task.
///
/// `completed` is accepted alongside the core four so a task can be closed
/// from a message and not only cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    New,
    Update,
    Cancel,
    Completed,
    Info,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::New => "new",
            ActionKind::Update => "update",
            ActionKind::Cancel => "cancel",
            ActionKind::Completed => "completed",
            ActionKind::Info => "info",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(ActionKind::New),
            "update" => Some(ActionKind::Update),
            "cancel" => Some(ActionKind::Cancel),
            "completed" => Some(ActionKind::Completed),
            "info" => Some(ActionKind::Info),
            _ => None,
        }
    }
}

/// An extracted deadline: a `DD.MM[.YYYY]` literal or a tagged relative
/// expression like `relative: завтра`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deadline {
    pub date: String,
    pub description: String,
}

/// Normalized classification output.
///
/// Every field is present and within its domain — raw strategy output is
/// untrusted until it has passed through [`crate::normalize`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: Category,
    /// Integer in `[0, 10]`.
    pub importance_score: i64,
    pub task_title: Option<String>,
    pub task_type: TaskType,
    pub action: ActionKind,
    pub summary: String,
    /// Ordered-unique, first-seen order.
    pub extracted_links: Vec<String>,
    /// Ordered-unique by `(date, description)`, first-seen order.
    pub extracted_deadlines: Vec<Deadline>,
}

/// Lifecycle of a course task. `completed` and `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Active,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Active => "active",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(TaskStatus::Active),
            "completed" => Some(TaskStatus::Completed),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

/// Persistent aggregate representing one real-world assignment or topic,
/// merged from possibly many messages.
#[derive(Debug, Clone, Serialize)]
pub struct CourseTask {
    pub id: String,
    pub title: String,
    pub description: String,
    pub task_type: TaskType,
    pub status: TaskStatus,
    /// Identifier of this task's vector in the similarity index. Created at
    /// task creation, 1:1, immutable thereafter.
    pub similarity_key: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Kind of derived fact stored as a knowledge entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Deadline,
    Link,
    Explanation,
    Generic,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Deadline => "deadline",
            EntryType::Link => "link",
            EntryType::Explanation => "explanation",
            EntryType::Generic => "generic",
        }
    }
}

/// One atomic derived fact attached to a message and optionally a task.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub message_id: String,
    /// `None` means "unattached fact".
    pub course_task_id: Option<String>,
    pub entry_type: EntryType,
    pub content: String,
    /// Audit payload: original deadlines/links/action.
    pub extra_json: String,
    pub created_at: i64,
}

/// A persisted envelope row, as replayed during reprocessing.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: String,
    pub envelope: IngestionEnvelope,
    pub sent_at: i64,
}
