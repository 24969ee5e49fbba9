//! Workflow engine client.
//!
//! The durable workflow engine is an external collaborator reached over an
//! opaque RPC surface: start a workflow, send it a fire-and-forget signal,
//! deliver an acknowledged update, query it, or terminate it. This module
//! pins down that surface as [`WorkflowClient`] plus the signal/update
//! names and payload shapes the request layer exchanges with workflows.
//!
//! [`InProcessEngine`] is the bundled engine used by the dev binary and the
//! test suite; it executes the handful of engine behaviors this layer
//! observes (flow creation, human-action completion writes, pause/resume).

pub mod inprocess;

pub use inprocess::InProcessEngine;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Update delivered when a human completes a callback action. The
/// workflow-hosted handler applies it to the waiting decision point and
/// persists the resulting action state.
pub const UPDATE_HUMAN_ACTION_COMPLETE: &str = "human_action_complete";

/// Update delivered for a non-completing edit of a pending action.
pub const UPDATE_HUMAN_ACTION_UPDATE: &str = "human_action_update";

/// Signal carrying a user-driven flow action (e.g. `go_next_step`).
pub const SIGNAL_USER_ACTION: &str = "user_action";

/// Signals asking a workflow to pause / resume itself.
pub const SIGNAL_PAUSE: &str = "pause";
pub const SIGNAL_RESUME: &str = "resume";

/// Completion payload for [`UPDATE_HUMAN_ACTION_COMPLETE`]. Field names are
/// the workflow engine's wire convention and end up verbatim inside the
/// persisted `actionResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCompletion {
    #[serde(rename = "TargetWorkflowId")]
    pub target_workflow_id: String,
    #[serde(rename = "Content")]
    pub content: String,
    #[serde(rename = "Approved")]
    pub approved: Option<bool>,
    #[serde(rename = "Choice")]
    pub choice: String,
    #[serde(rename = "Params")]
    pub params: Option<Map<String, Value>>,
}

/// Arguments for starting a workflow on behalf of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStart {
    /// Which workflow definition to run, derived from the task's flow type.
    pub workflow_type: String,
    pub workspace_id: String,
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_options: Option<Map<String, Value>>,
}

/// Engine-side run status, as reported by `get_workflow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Terminated,
}

/// A workflow run as seen through the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub id: String,
    pub workflow_type: String,
    pub status: RunStatus,
}

/// Workflow RPC failure. The display string is surfaced to HTTP callers on
/// 500 responses.
#[derive(Debug, Clone, Error)]
pub enum WorkflowError {
    #[error("workflow not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Engine(String),
}

/// Opaque RPC surface of the durable workflow engine.
#[async_trait]
pub trait WorkflowClient: Send + Sync {
    /// Start a workflow; returns the run id. The workflow persists its own
    /// flow record as it starts.
    async fn execute_workflow(&self, start: WorkflowStart) -> Result<String, WorkflowError>;

    /// Fire-and-forget signal to a running workflow.
    async fn signal_workflow(
        &self,
        workflow_id: &str,
        signal: &str,
        payload: Value,
    ) -> Result<(), WorkflowError>;

    /// Synchronous, acknowledged update to a running workflow. Returns once
    /// the workflow-hosted handler has applied the payload.
    async fn update_workflow(
        &self,
        workflow_id: &str,
        update: &str,
        payload: Value,
    ) -> Result<(), WorkflowError>;

    /// Query a run by id.
    async fn get_workflow(&self, workflow_id: &str) -> Result<Option<WorkflowRun>, WorkflowError>;

    /// Terminate a run. Used by task cancellation; a failure here is logged
    /// by the caller and never reverts the task state change.
    async fn terminate_workflow(
        &self,
        workflow_id: &str,
        reason: &str,
    ) -> Result<(), WorkflowError>;
}

/// Map a task's flow type to the workflow definition that serves it.
/// Recognized values route to dedicated workflows; anything else passes
/// through as-is (the field is opaque to this layer).
#[must_use]
pub fn workflow_type_for(flow_type: &str) -> &str {
    match flow_type {
        "" => crate::domain::task::FLOW_TYPE_BASIC_DEV,
        other => other,
    }
}
