//! Task model and its status / agent-type state machines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::timestamp;

/// Task status.
///
/// The lifecycle graph is `drafting → to_do → in_progress → {complete,
/// failed, blocked, in_review}`, with cancellation allowed from `to_do`,
/// `in_progress`, `blocked` and `in_review`. `complete`, `canceled` and
/// `failed` are terminal and archivable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Drafting,
    ToDo,
    InProgress,
    Blocked,
    InReview,
    Complete,
    Canceled,
    Failed,
}

impl TaskStatus {
    /// All statuses, in lifecycle order. Used by the list filter when the
    /// caller asks for `all`.
    pub const ALL: [Self; 8] = [
        Self::Drafting,
        Self::ToDo,
        Self::InProgress,
        Self::Blocked,
        Self::InReview,
        Self::Complete,
        Self::Canceled,
        Self::Failed,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drafting => "drafting",
            Self::ToDo => "to_do",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::InReview => "in_review",
            Self::Complete => "complete",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
        }
    }

    /// Whether a task in this status may be canceled.
    #[must_use]
    pub fn is_cancelable(&self) -> bool {
        matches!(
            self,
            Self::ToDo | Self::InProgress | Self::Blocked | Self::InReview
        )
    }

    /// Whether this status is terminal (archivable).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Complete | Self::Canceled | Self::Failed)
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drafting" => Ok(Self::Drafting),
            "to_do" => Ok(Self::ToDo),
            "in_progress" => Ok(Self::InProgress),
            "blocked" => Ok(Self::Blocked),
            "in_review" => Ok(Self::InReview),
            "complete" => Ok(Self::Complete),
            "canceled" => Ok(Self::Canceled),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown task status: {s}")),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who drives a task forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Human,
    Llm,
    None,
}

impl AgentType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Llm => "llm",
            Self::None => "none",
        }
    }
}

impl std::str::FromStr for AgentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(Self::Human),
            "llm" => Ok(Self::Llm),
            "none" => Ok(Self::None),
            _ => Err(format!("Unknown agent type: {s}")),
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recognized flow types. The field itself is opaque pass-through; these
/// values route task creation to specific workflows.
pub const FLOW_TYPE_BASIC_DEV: &str = "basic_dev";
pub const FLOW_TYPE_PLANNED_DEV: &str = "planned_dev";

/// Flow option key with dedicated handling on the create path.
pub const FLOW_OPTION_PLANNING_PROMPT: &str = "planningPrompt";

/// A unit of human-visible work, owned by a workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub workspace_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    pub agent_type: AgentType,
    #[serde(default)]
    pub flow_type: String,
    /// Free-form options forwarded to the workflow. `None` and `{}` are
    /// equal on the wire but preserved distinctly for `basic_dev`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_options: Option<Map<String, Value>>,
    /// Cursor of the latest change-feed message for this task, strictly
    /// increasing per workspace. Assigned by storage on every write.
    #[serde(default)]
    pub stream_id: u64,
    #[serde(default, with = "timestamp::opt", skip_serializing_if = "Option::is_none")]
    pub archived: Option<DateTime<Utc>>,
    #[serde(with = "timestamp")]
    pub created: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated: DateTime<Utc>,
}

impl Task {
    /// Whether this task has been soft-deleted.
    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.archived.is_some()
    }
}
