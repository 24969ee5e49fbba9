//! Flow model: the persisted half of a running workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::timestamp;

/// Recognized flow statuses. The field is a free string owned by the
/// workflow engine; the request layer only ever drives the
/// `paused → in_progress` transition (unpause on human input).
pub const FLOW_STATUS_TODO: &str = "todo";
pub const FLOW_STATUS_IN_PROGRESS: &str = "in_progress";
pub const FLOW_STATUS_PAUSED: &str = "paused";
pub const FLOW_STATUS_COMPLETE: &str = "complete";
pub const FLOW_STATUS_FAILED: &str = "failed";

/// The running instance of a workflow, owned by exactly one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub id: String,
    pub workspace_id: String,
    /// Owning task id.
    pub parent_id: String,
    #[serde(rename = "type")]
    pub flow_type: String,
    pub status: String,
    /// Worktrees attached to this flow. Persisted separately; populated on
    /// read paths that return the full flow.
    #[serde(default)]
    pub worktrees: Vec<Worktree>,
}

impl Flow {
    /// Whether the flow is waiting for human input.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.status == FLOW_STATUS_PAUSED
    }
}

/// A git worktree managed on behalf of a flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worktree {
    pub id: String,
    pub workspace_id: String,
    pub flow_id: String,
    pub name: String,
    /// Local branch checked out in the worktree. Branch listing excludes
    /// branches held by managed worktrees.
    pub branch: String,
    pub working_directory: String,
    #[serde(with = "timestamp")]
    pub created: DateTime<Utc>,
}
