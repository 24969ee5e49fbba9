//! In-memory storage backend.
//!
//! Entity maps and feed logs live behind a single `parking_lot::RwLock`, so
//! a write and its feed append are observed atomically. Live feed delivery
//! uses one `tokio::sync::broadcast` channel per feed; the log itself is
//! the replay source, the channel only carries the tail.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::broadcast;

use super::{
    FeedKey, FeedMessage, FeedPayload, Storage, StorageResult,
};
use crate::domain::{
    Flow, FlowAction, FlowEvent, Subflow, Task, Workspace, WorkspaceConfig, Worktree,
};
use async_trait::async_trait;

/// Broadcast capacity for live feed tails. A subscriber that falls this far
/// behind sees `Lagged` and loses messages (documented drop behavior).
const FEED_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug)]
struct FeedState {
    log: Vec<FeedMessage>,
    next_id: u64,
    tx: broadcast::Sender<FeedMessage>,
}

impl FeedState {
    fn new() -> Self {
        let (tx, _rx) = broadcast::channel(FEED_CHANNEL_CAPACITY);
        Self {
            log: Vec::new(),
            next_id: 1,
            tx,
        }
    }

    fn append(&mut self, payload: FeedPayload) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let message = FeedMessage { id, payload };
        self.log.push(message.clone());
        // No receivers is fine; the log is the durable copy.
        let _ = self.tx.send(message);
        id
    }
}

#[derive(Debug, Default)]
struct Inner {
    workspaces: HashMap<String, Workspace>,
    workspace_configs: HashMap<String, WorkspaceConfig>,
    /// Keyed by (workspace id, task id).
    tasks: HashMap<(String, String), Task>,
    flows: HashMap<(String, String), Flow>,
    flow_actions: HashMap<(String, String), FlowAction>,
    subflows: HashMap<(String, String), Subflow>,
    worktrees: HashMap<(String, String), Worktree>,
    kv: HashMap<String, Value>,
    feeds: HashMap<String, FeedState>,
}

impl Inner {
    fn feed_mut(&mut self, key: &FeedKey) -> &mut FeedState {
        self.feeds.entry(key.to_string()).or_insert_with(FeedState::new)
    }
}

/// In-process implementation of the storage contract.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn persist_workspace(&self, workspace: Workspace) -> StorageResult<()> {
        let mut inner = self.inner.write();
        inner.workspaces.insert(workspace.id.clone(), workspace);
        Ok(())
    }

    async fn get_workspace(&self, id: &str) -> StorageResult<Option<Workspace>> {
        Ok(self.inner.read().workspaces.get(id).cloned())
    }

    async fn list_workspaces(&self) -> StorageResult<Vec<Workspace>> {
        let mut all: Vec<Workspace> = self.inner.read().workspaces.values().cloned().collect();
        all.sort_by(|a, b| a.created.cmp(&b.created));
        Ok(all)
    }

    async fn persist_workspace_config(
        &self,
        workspace_id: &str,
        config: WorkspaceConfig,
    ) -> StorageResult<()> {
        let mut inner = self.inner.write();
        inner
            .workspace_configs
            .insert(workspace_id.to_string(), config);
        Ok(())
    }

    async fn get_workspace_config(
        &self,
        workspace_id: &str,
    ) -> StorageResult<Option<WorkspaceConfig>> {
        Ok(self.inner.read().workspace_configs.get(workspace_id).cloned())
    }

    async fn persist_task(&self, mut task: Task) -> StorageResult<Task> {
        let mut inner = self.inner.write();
        let key = FeedKey::tasks(&task.workspace_id);
        let feed = inner.feed_mut(&key);
        // Reserve the id first so the stored record and the feed message
        // carry the same cursor.
        task.stream_id = feed.next_id;
        feed.append(FeedPayload::Task(task.clone()));
        inner
            .tasks
            .insert((task.workspace_id.clone(), task.id.clone()), task.clone());
        Ok(task)
    }

    async fn get_task(&self, workspace_id: &str, id: &str) -> StorageResult<Option<Task>> {
        Ok(self
            .inner
            .read()
            .tasks
            .get(&(workspace_id.to_string(), id.to_string()))
            .cloned())
    }

    async fn list_tasks(&self, workspace_id: &str) -> StorageResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .inner
            .read()
            .tasks
            .values()
            .filter(|t| t.workspace_id == workspace_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created.cmp(&b.created));
        Ok(tasks)
    }

    async fn list_archived_tasks(
        &self,
        workspace_id: &str,
        page: usize,
        page_size: usize,
    ) -> StorageResult<(Vec<Task>, usize)> {
        let mut archived: Vec<Task> = self
            .inner
            .read()
            .tasks
            .values()
            .filter(|t| t.workspace_id == workspace_id && t.is_archived())
            .cloned()
            .collect();
        // Most recently archived first.
        archived.sort_by(|a, b| b.archived.cmp(&a.archived));
        let total = archived.len();
        let start = page.saturating_sub(1).saturating_mul(page_size);
        let tasks = archived.into_iter().skip(start).take(page_size).collect();
        Ok((tasks, total))
    }

    async fn delete_task(&self, workspace_id: &str, id: &str) -> StorageResult<bool> {
        let mut inner = self.inner.write();
        Ok(inner
            .tasks
            .remove(&(workspace_id.to_string(), id.to_string()))
            .is_some())
    }

    async fn persist_flow(&self, flow: Flow) -> StorageResult<()> {
        let mut inner = self.inner.write();
        inner
            .flows
            .insert((flow.workspace_id.clone(), flow.id.clone()), flow);
        Ok(())
    }

    async fn get_flow(&self, workspace_id: &str, id: &str) -> StorageResult<Option<Flow>> {
        Ok(self
            .inner
            .read()
            .flows
            .get(&(workspace_id.to_string(), id.to_string()))
            .cloned())
    }

    async fn find_flow(&self, id: &str) -> StorageResult<Option<Flow>> {
        Ok(self
            .inner
            .read()
            .flows
            .values()
            .find(|f| f.id == id)
            .cloned())
    }

    async fn list_flows_for_task(
        &self,
        workspace_id: &str,
        task_id: &str,
    ) -> StorageResult<Vec<Flow>> {
        let mut flows: Vec<Flow> = self
            .inner
            .read()
            .flows
            .values()
            .filter(|f| f.workspace_id == workspace_id && f.parent_id == task_id)
            .cloned()
            .collect();
        flows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(flows)
    }

    async fn persist_worktree(&self, worktree: Worktree) -> StorageResult<()> {
        let mut inner = self.inner.write();
        inner
            .worktrees
            .insert((worktree.workspace_id.clone(), worktree.id.clone()), worktree);
        Ok(())
    }

    async fn list_worktrees(&self, workspace_id: &str) -> StorageResult<Vec<Worktree>> {
        let mut worktrees: Vec<Worktree> = self
            .inner
            .read()
            .worktrees
            .values()
            .filter(|w| w.workspace_id == workspace_id)
            .cloned()
            .collect();
        worktrees.sort_by(|a, b| a.created.cmp(&b.created));
        Ok(worktrees)
    }

    async fn list_worktrees_for_flow(
        &self,
        workspace_id: &str,
        flow_id: &str,
    ) -> StorageResult<Vec<Worktree>> {
        let mut worktrees: Vec<Worktree> = self
            .inner
            .read()
            .worktrees
            .values()
            .filter(|w| w.workspace_id == workspace_id && w.flow_id == flow_id)
            .cloned()
            .collect();
        worktrees.sort_by(|a, b| a.created.cmp(&b.created));
        Ok(worktrees)
    }

    async fn persist_flow_action(&self, action: FlowAction) -> StorageResult<()> {
        let mut inner = self.inner.write();
        let key = FeedKey::actions(&action.workspace_id, &action.flow_id);
        inner.feed_mut(&key).append(FeedPayload::Action(action.clone()));
        inner
            .flow_actions
            .insert((action.workspace_id.clone(), action.id.clone()), action);
        Ok(())
    }

    async fn get_flow_action(
        &self,
        workspace_id: &str,
        id: &str,
    ) -> StorageResult<Option<FlowAction>> {
        Ok(self
            .inner
            .read()
            .flow_actions
            .get(&(workspace_id.to_string(), id.to_string()))
            .cloned())
    }

    async fn list_flow_actions(
        &self,
        workspace_id: &str,
        flow_id: &str,
    ) -> StorageResult<Vec<FlowAction>> {
        let mut actions: Vec<FlowAction> = self
            .inner
            .read()
            .flow_actions
            .values()
            .filter(|a| a.workspace_id == workspace_id && a.flow_id == flow_id)
            .cloned()
            .collect();
        actions.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        Ok(actions)
    }

    async fn persist_subflow(&self, subflow: Subflow) -> StorageResult<()> {
        let mut inner = self.inner.write();
        inner
            .subflows
            .insert((subflow.workspace_id.clone(), subflow.id.clone()), subflow);
        Ok(())
    }

    async fn get_subflow(&self, workspace_id: &str, id: &str) -> StorageResult<Option<Subflow>> {
        Ok(self
            .inner
            .read()
            .subflows
            .get(&(workspace_id.to_string(), id.to_string()))
            .cloned())
    }

    async fn list_subflows_for_flow(
        &self,
        workspace_id: &str,
        flow_id: &str,
    ) -> StorageResult<Vec<Subflow>> {
        let mut subflows: Vec<Subflow> = self
            .inner
            .read()
            .subflows
            .values()
            .filter(|s| s.workspace_id == workspace_id && s.flow_id == flow_id)
            .cloned()
            .collect();
        subflows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(subflows)
    }

    async fn append_flow_event(
        &self,
        workspace_id: &str,
        flow_id: &str,
        event: FlowEvent,
    ) -> StorageResult<u64> {
        let mut inner = self.inner.write();
        let key = FeedKey::events(workspace_id, flow_id);
        Ok(inner.feed_mut(&key).append(FeedPayload::Event(event)))
    }

    async fn put_kv(&self, key: &str, value: Value) -> StorageResult<()> {
        let mut inner = self.inner.write();
        inner.kv.insert(key.to_string(), value);
        Ok(())
    }

    async fn get_kv(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.inner.read().kv.get(key).cloned())
    }

    async fn read_feed(&self, key: &FeedKey, after: u64) -> StorageResult<Vec<FeedMessage>> {
        let inner = self.inner.read();
        Ok(inner
            .feeds
            .get(&key.to_string())
            .map(|feed| {
                feed.log
                    .iter()
                    .filter(|m| m.id > after)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn last_feed_id(&self, key: &FeedKey) -> StorageResult<u64> {
        let inner = self.inner.read();
        Ok(inner
            .feeds
            .get(&key.to_string())
            .map_or(0, |feed| feed.next_id - 1))
    }

    fn subscribe_feed(&self, key: &FeedKey) -> broadcast::Receiver<FeedMessage> {
        let mut inner = self.inner.write();
        inner.feed_mut(key).tx.subscribe()
    }
}
