//! Storage contract: entity persistence plus per-scope change feeds.
//!
//! The backing service is an external key-value store with append-only
//! change streams; this module pins down the contract the request layer
//! relies on. [`MemoryStorage`] is the bundled in-process backend used by
//! the dev binary and the test suite.
//!
//! Three feeds exist, one per streamed entity kind:
//!
//! - task changes, scoped per workspace
//! - flow-action changes, scoped per flow
//! - flow events, scoped per flow
//!
//! Every append gets a strictly increasing per-feed `u64` id. Task writes
//! additionally stamp that id onto the task as its `streamId` cursor.

pub mod memory;

pub use memory::MemoryStorage;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::domain::{
    Flow, FlowAction, FlowEvent, Subflow, Task, Workspace, WorkspaceConfig, Worktree,
};

/// Storage-layer failure. Missing entities are `Ok(None)`, not errors.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("storage backend failure: {0}")]
    Backend(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Which change feed a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    TaskChanges,
    ActionChanges,
    FlowEvents,
}

impl FeedKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskChanges => "task_changes",
            Self::ActionChanges => "action_changes",
            Self::FlowEvents => "flow_events",
        }
    }
}

/// Identifies one feed: kind plus scope. Task feeds are workspace-scoped;
/// action and event feeds are flow-scoped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedKey {
    pub kind: FeedKind,
    pub workspace_id: String,
    pub flow_id: Option<String>,
}

impl FeedKey {
    #[must_use]
    pub fn tasks(workspace_id: &str) -> Self {
        Self {
            kind: FeedKind::TaskChanges,
            workspace_id: workspace_id.to_string(),
            flow_id: None,
        }
    }

    #[must_use]
    pub fn actions(workspace_id: &str, flow_id: &str) -> Self {
        Self {
            kind: FeedKind::ActionChanges,
            workspace_id: workspace_id.to_string(),
            flow_id: Some(flow_id.to_string()),
        }
    }

    #[must_use]
    pub fn events(workspace_id: &str, flow_id: &str) -> Self {
        Self {
            kind: FeedKind::FlowEvents,
            workspace_id: workspace_id.to_string(),
            flow_id: Some(flow_id.to_string()),
        }
    }
}

impl std::fmt::Display for FeedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.flow_id {
            Some(flow_id) => write!(
                f,
                "{}:{}:{}",
                self.kind.as_str(),
                self.workspace_id,
                flow_id
            ),
            None => write!(f, "{}:{}", self.kind.as_str(), self.workspace_id),
        }
    }
}

/// One appended change, as delivered to feed subscribers.
#[derive(Debug, Clone)]
pub struct FeedMessage {
    /// Strictly increasing within one feed.
    pub id: u64,
    pub payload: FeedPayload,
}

/// The entity snapshot carried by a feed message.
#[derive(Debug, Clone)]
pub enum FeedPayload {
    Task(Task),
    Action(FlowAction),
    Event(FlowEvent),
}

impl FeedPayload {
    /// Sub-stream id, for flow-event filter matching.
    #[must_use]
    pub fn parent_id(&self) -> Option<&str> {
        match self {
            Self::Event(event) => Some(event.parent_id()),
            Self::Task(_) | Self::Action(_) => None,
        }
    }
}

/// The fixed storage contract.
///
/// Implementations must be cheap to share (`Arc<dyn Storage>`) and safe to
/// call concurrently; every method is a suspension point.
#[async_trait]
pub trait Storage: Send + Sync {
    // Workspaces
    async fn persist_workspace(&self, workspace: Workspace) -> StorageResult<()>;
    async fn get_workspace(&self, id: &str) -> StorageResult<Option<Workspace>>;
    async fn list_workspaces(&self) -> StorageResult<Vec<Workspace>>;
    async fn persist_workspace_config(
        &self,
        workspace_id: &str,
        config: WorkspaceConfig,
    ) -> StorageResult<()>;
    async fn get_workspace_config(
        &self,
        workspace_id: &str,
    ) -> StorageResult<Option<WorkspaceConfig>>;

    // Tasks. Persisting appends to the workspace task feed and returns the
    // task with its freshly assigned `streamId`.
    async fn persist_task(&self, task: Task) -> StorageResult<Task>;
    async fn get_task(&self, workspace_id: &str, id: &str) -> StorageResult<Option<Task>>;
    async fn list_tasks(&self, workspace_id: &str) -> StorageResult<Vec<Task>>;
    async fn list_archived_tasks(
        &self,
        workspace_id: &str,
        page: usize,
        page_size: usize,
    ) -> StorageResult<(Vec<Task>, usize)>;
    async fn delete_task(&self, workspace_id: &str, id: &str) -> StorageResult<bool>;

    // Flows
    async fn persist_flow(&self, flow: Flow) -> StorageResult<()>;
    async fn get_flow(&self, workspace_id: &str, id: &str) -> StorageResult<Option<Flow>>;
    /// Workspace-independent flow lookup. Workflow updates address flows by
    /// id alone; flow ids are globally unique.
    async fn find_flow(&self, id: &str) -> StorageResult<Option<Flow>>;
    async fn list_flows_for_task(
        &self,
        workspace_id: &str,
        task_id: &str,
    ) -> StorageResult<Vec<Flow>>;

    // Worktrees
    async fn persist_worktree(&self, worktree: Worktree) -> StorageResult<()>;
    async fn list_worktrees(&self, workspace_id: &str) -> StorageResult<Vec<Worktree>>;
    async fn list_worktrees_for_flow(
        &self,
        workspace_id: &str,
        flow_id: &str,
    ) -> StorageResult<Vec<Worktree>>;

    // Flow actions. Persisting appends to the flow's action feed.
    async fn persist_flow_action(&self, action: FlowAction) -> StorageResult<()>;
    async fn get_flow_action(
        &self,
        workspace_id: &str,
        id: &str,
    ) -> StorageResult<Option<FlowAction>>;
    async fn list_flow_actions(
        &self,
        workspace_id: &str,
        flow_id: &str,
    ) -> StorageResult<Vec<FlowAction>>;

    // Subflows
    async fn persist_subflow(&self, subflow: Subflow) -> StorageResult<()>;
    async fn get_subflow(&self, workspace_id: &str, id: &str) -> StorageResult<Option<Subflow>>;
    async fn list_subflows_for_flow(
        &self,
        workspace_id: &str,
        flow_id: &str,
    ) -> StorageResult<Vec<Subflow>>;

    // Flow events: append-only; returns the feed id of the new message.
    async fn append_flow_event(
        &self,
        workspace_id: &str,
        flow_id: &str,
        event: FlowEvent,
    ) -> StorageResult<u64>;

    // Generic KV (chat-history content blocks and similar sidecar data).
    async fn put_kv(&self, key: &str, value: Value) -> StorageResult<()>;
    async fn get_kv(&self, key: &str) -> StorageResult<Option<Value>>;

    // Change feeds
    /// Messages with id strictly greater than `after`, in append order.
    async fn read_feed(&self, key: &FeedKey, after: u64) -> StorageResult<Vec<FeedMessage>>;
    /// Id of the newest message in the feed, 0 when empty.
    async fn last_feed_id(&self, key: &FeedKey) -> StorageResult<u64>;
    /// Live tail of the feed. Subscribing never blocks; the receiver only
    /// observes messages appended after this call returns.
    fn subscribe_feed(&self, key: &FeedKey) -> broadcast::Receiver<FeedMessage>;
}
