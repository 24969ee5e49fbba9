//! In-process workflow engine.
//!
//! Runs the engine side of the request-layer contract without any network:
//! starting a workflow persists its flow record, the human-action update
//! handlers apply completion payloads to the waiting action, and
//! pause/resume signals flip the flow status the way the durable engine
//! would. Everything else a real engine does (activities, retries,
//! checkpointing) is out of scope here.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::{
    ActionCompletion, RunStatus, WorkflowClient, WorkflowError, WorkflowRun, WorkflowStart,
    SIGNAL_PAUSE, SIGNAL_RESUME, SIGNAL_USER_ACTION, UPDATE_HUMAN_ACTION_COMPLETE,
    UPDATE_HUMAN_ACTION_UPDATE,
};
use crate::domain::flow::{FLOW_STATUS_IN_PROGRESS, FLOW_STATUS_PAUSED};
use crate::domain::flow_action::ActionStatus;
use crate::domain::{new_id, Flow, FLOW_ID_PREFIX};
use crate::storage::Storage;

/// A signal as recorded by the engine, for test assertions and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSignal {
    pub workflow_id: String,
    pub name: String,
    pub payload: Value,
}

/// In-process implementation of [`WorkflowClient`].
#[derive(Clone)]
pub struct InProcessEngine {
    storage: Arc<dyn Storage>,
    runs: Arc<RwLock<HashMap<String, WorkflowRun>>>,
    signals: Arc<RwLock<Vec<RecordedSignal>>>,
}

impl std::fmt::Debug for InProcessEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessEngine")
            .field("runs", &self.runs.read().len())
            .finish()
    }
}

impl InProcessEngine {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            runs: Arc::new(RwLock::new(HashMap::new())),
            signals: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Signals received so far, oldest first.
    #[must_use]
    pub fn recorded_signals(&self) -> Vec<RecordedSignal> {
        self.signals.read().clone()
    }

    async fn find_flow(&self, workflow_id: &str) -> Result<Flow, WorkflowError> {
        self.storage
            .find_flow(workflow_id)
            .await
            .map_err(|e| WorkflowError::Engine(e.to_string()))?
            .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))
    }

    async fn set_flow_status(&self, workflow_id: &str, status: &str) -> Result<(), WorkflowError> {
        let mut flow = self.find_flow(workflow_id).await?;
        flow.status = status.to_string();
        self.storage
            .persist_flow(flow)
            .await
            .map_err(|e| WorkflowError::Engine(e.to_string()))
    }

    /// Apply a completion payload to the flow's waiting decision point: the
    /// oldest pending callback action. The persisted write goes through
    /// storage so the action change feed observes it.
    async fn apply_completion(
        &self,
        workflow_id: &str,
        payload: Value,
    ) -> Result<(), WorkflowError> {
        let completion: ActionCompletion = serde_json::from_value(payload)
            .map_err(|e| WorkflowError::Engine(format!("invalid completion payload: {e}")))?;

        let flow = self.find_flow(workflow_id).await?;
        let actions = self
            .storage
            .list_flow_actions(&flow.workspace_id, &flow.id)
            .await
            .map_err(|e| WorkflowError::Engine(e.to_string()))?;

        let mut action = actions
            .into_iter()
            .find(|a| a.is_callback_action && a.is_pending())
            .ok_or_else(|| {
                WorkflowError::Engine(format!(
                    "no pending callback action awaiting completion in workflow {workflow_id}"
                ))
            })?;

        action.action_status = ActionStatus::Complete;
        action.action_result = serde_json::to_string(&completion)
            .map_err(|e| WorkflowError::Engine(e.to_string()))?;
        action.updated = chrono::Utc::now();

        self.storage
            .persist_flow_action(action)
            .await
            .map_err(|e| WorkflowError::Engine(e.to_string()))
    }
}

#[async_trait]
impl WorkflowClient for InProcessEngine {
    async fn execute_workflow(&self, start: WorkflowStart) -> Result<String, WorkflowError> {
        let flow_id = new_id(FLOW_ID_PREFIX);
        let flow = Flow {
            id: flow_id.clone(),
            workspace_id: start.workspace_id.clone(),
            parent_id: start.task_id.clone(),
            flow_type: start.workflow_type.clone(),
            status: FLOW_STATUS_IN_PROGRESS.to_string(),
            worktrees: vec![],
        };
        self.storage
            .persist_flow(flow)
            .await
            .map_err(|e| WorkflowError::Engine(e.to_string()))?;

        self.runs.write().insert(
            flow_id.clone(),
            WorkflowRun {
                id: flow_id.clone(),
                workflow_type: start.workflow_type.clone(),
                status: RunStatus::Running,
            },
        );

        tracing::info!(
            workflow_id = %flow_id,
            workflow_type = %start.workflow_type,
            task_id = %start.task_id,
            "started workflow"
        );
        Ok(flow_id)
    }

    async fn signal_workflow(
        &self,
        workflow_id: &str,
        signal: &str,
        payload: Value,
    ) -> Result<(), WorkflowError> {
        // Signals are only deliverable to live workflows.
        self.find_flow(workflow_id).await?;

        match signal {
            SIGNAL_PAUSE => self.set_flow_status(workflow_id, FLOW_STATUS_PAUSED).await?,
            SIGNAL_RESUME => {
                self.set_flow_status(workflow_id, FLOW_STATUS_IN_PROGRESS)
                    .await?;
            }
            SIGNAL_USER_ACTION => {}
            other => {
                tracing::debug!(workflow_id, signal = other, "unhandled signal recorded");
            }
        }

        self.signals.write().push(RecordedSignal {
            workflow_id: workflow_id.to_string(),
            name: signal.to_string(),
            payload,
        });
        Ok(())
    }

    async fn update_workflow(
        &self,
        workflow_id: &str,
        update: &str,
        payload: Value,
    ) -> Result<(), WorkflowError> {
        match update {
            UPDATE_HUMAN_ACTION_COMPLETE => self.apply_completion(workflow_id, payload).await,
            UPDATE_HUMAN_ACTION_UPDATE => {
                // Acknowledge without touching action status or result.
                self.find_flow(workflow_id).await?;
                self.signals.write().push(RecordedSignal {
                    workflow_id: workflow_id.to_string(),
                    name: UPDATE_HUMAN_ACTION_UPDATE.to_string(),
                    payload,
                });
                Ok(())
            }
            other => Err(WorkflowError::Engine(format!("unknown update: {other}"))),
        }
    }

    async fn get_workflow(&self, workflow_id: &str) -> Result<Option<WorkflowRun>, WorkflowError> {
        Ok(self.runs.read().get(workflow_id).cloned())
    }

    async fn terminate_workflow(
        &self,
        workflow_id: &str,
        reason: &str,
    ) -> Result<(), WorkflowError> {
        let mut runs = self.runs.write();
        match runs.get_mut(workflow_id) {
            Some(run) => {
                run.status = RunStatus::Terminated;
                tracing::info!(workflow_id, reason, "terminated workflow");
                Ok(())
            }
            None => Err(WorkflowError::NotFound(workflow_id.to_string())),
        }
    }
}
