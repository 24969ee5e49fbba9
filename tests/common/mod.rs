//! Shared test harness: spawns the API on an ephemeral port with direct
//! handles to the storage backend and the in-process workflow engine, so
//! tests can seed fixtures the way workflows would.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::net::TcpListener;

use sidekick_api::config::AppConfig;
use sidekick_api::domain::flow::FLOW_STATUS_IN_PROGRESS;
use sidekick_api::domain::flow_action::{
    ActionStatus, FlowAction, PARAM_REQUEST_KIND, REQUEST_KIND_FREE_FORM,
};
use sidekick_api::domain::{new_id, AgentType, Flow, Task, TaskStatus, TASK_ID_PREFIX};
use sidekick_api::server::create_app_with;
use sidekick_api::storage::{MemoryStorage, Storage};
use sidekick_api::workflow::{InProcessEngine, WorkflowClient};

pub struct TestApp {
    pub base_url: String,
    pub ws_base_url: String,
    pub storage: Arc<MemoryStorage>,
    pub engine: Arc<InProcessEngine>,
    pub client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let config = AppConfig::default();
        let storage = Arc::new(MemoryStorage::new());
        let engine = Arc::new(InProcessEngine::new(
            Arc::clone(&storage) as Arc<dyn Storage>
        ));

        let app = create_app_with(
            config,
            Arc::clone(&storage) as Arc<dyn Storage>,
            Arc::clone(&engine) as Arc<dyn WorkflowClient>,
        )
        .expect("Failed to create app");

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Server error");
        });

        // Give the server a moment to start accepting.
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            base_url: format!("http://127.0.0.1:{port}"),
            ws_base_url: format!("ws://127.0.0.1:{port}"),
            storage,
            engine,
            client: reqwest::Client::new(),
            handle,
        }
    }

    pub fn api(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url)
    }

    pub fn ws(&self, path: &str) -> String {
        format!("{}/ws/v1{path}", self.ws_base_url)
    }

    /// Create a workspace through the API and return its id.
    pub async fn create_workspace(&self) -> String {
        let response = self
            .client
            .post(self.api("/workspaces"))
            .json(&serde_json::json!({
                "name": "test workspace",
                "localRepoDir": "/tmp/test-repo"
            }))
            .send()
            .await
            .expect("workspace create failed");
        assert!(response.status().is_success());
        let body: Value = response.json().await.unwrap();
        body["id"].as_str().expect("workspace id").to_string()
    }

    /// Persist a task directly, the way seeded fixtures do.
    pub async fn seed_task(&self, workspace_id: &str, status: TaskStatus) -> Task {
        let now = chrono::Utc::now();
        let task = Task {
            id: new_id(TASK_ID_PREFIX),
            workspace_id: workspace_id.to_string(),
            title: String::new(),
            description: "seeded".to_string(),
            status,
            agent_type: AgentType::Llm,
            flow_type: "basic_dev".to_string(),
            flow_options: None,
            stream_id: 0,
            archived: None,
            created: now,
            updated: now,
        };
        self.storage.persist_task(task).await.unwrap()
    }

    /// Persist a flow directly, the way a workflow would as it starts.
    pub async fn seed_flow(&self, workspace_id: &str, flow_id: &str, status: &str) -> Flow {
        let flow = Flow {
            id: flow_id.to_string(),
            workspace_id: workspace_id.to_string(),
            parent_id: "task_seed".to_string(),
            flow_type: "basic_dev".to_string(),
            status: status.to_string(),
            worktrees: vec![],
        };
        self.storage.persist_flow(flow.clone()).await.unwrap();
        flow
    }

    /// Persist a pending human callback action under a flow.
    pub async fn seed_callback_action(
        &self,
        workspace_id: &str,
        flow_id: &str,
        action_id: &str,
        request_kind: &str,
    ) -> FlowAction {
        let mut params = Map::new();
        params.insert(
            PARAM_REQUEST_KIND.to_string(),
            Value::String(request_kind.to_string()),
        );
        let now = chrono::Utc::now();
        let action = FlowAction {
            id: action_id.to_string(),
            workspace_id: workspace_id.to_string(),
            flow_id: flow_id.to_string(),
            subflow_id: None,
            subflow_name: None,
            action_type: "user_request".to_string(),
            action_status: ActionStatus::Pending,
            action_params: params,
            action_result: String::new(),
            is_human_action: true,
            is_callback_action: true,
            created: now,
            updated: now,
        };
        self.storage.persist_flow_action(action.clone()).await.unwrap();
        action
    }

    /// Standard fixture: a flow in progress with one pending free-form
    /// callback action.
    pub async fn seed_flow_with_action(&self, workspace_id: &str) -> (Flow, FlowAction) {
        let flow = self
            .seed_flow(workspace_id, "flow_1", FLOW_STATUS_IN_PROGRESS)
            .await;
        let action = self
            .seed_callback_action(workspace_id, "flow_1", "fa_1", REQUEST_KIND_FREE_FORM)
            .await;
        (flow, action)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
