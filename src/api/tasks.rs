//! Task endpoints: creation, listing, lifecycle (cancel/archive), deletion.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ApiError, ApiResult};
use crate::domain::{new_id, Flow, Task, TaskStatus, TASK_ID_PREFIX};
use crate::logging::OpTimer;
use crate::validation;
use crate::workflow::{workflow_type_for, WorkflowStart};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/workspaces/{workspace_id}/tasks", post(create_task))
        .route("/api/v1/workspaces/{workspace_id}/tasks", get(list_tasks))
        .route(
            "/api/v1/workspaces/{workspace_id}/tasks/archived",
            get(list_archived_tasks),
        )
        .route(
            "/api/v1/workspaces/{workspace_id}/tasks/archive_finished",
            post(archive_finished),
        )
        .route(
            "/api/v1/workspaces/{workspace_id}/tasks/{id}",
            get(get_task),
        )
        .route(
            "/api/v1/workspaces/{workspace_id}/tasks/{id}",
            put(update_task),
        )
        .route(
            "/api/v1/workspaces/{workspace_id}/tasks/{id}",
            delete(delete_task),
        )
        .route(
            "/api/v1/workspaces/{workspace_id}/tasks/{id}/cancel",
            post(cancel_task),
        )
        .route(
            "/api/v1/workspaces/{workspace_id}/tasks/{id}/archive",
            post(archive_task),
        )
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub agent_type: Option<String>,
    #[serde(default)]
    pub flow_type: String,
    #[serde(default)]
    pub flow_options: Option<Map<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub agent_type: Option<String>,
    #[serde(default)]
    pub flow_type: Option<String>,
    #[serde(default)]
    pub flow_options: Option<Map<String, Value>>,
}

/// Task response shape: task fields flattened at the top level with the
/// owned flows alongside.
#[derive(Debug, Serialize)]
pub struct TaskWithFlows {
    #[serde(flatten)]
    pub task: Task,
    pub flows: Vec<Flow>,
}

/// `GET …/tasks/:id` wraps the flattened task.
#[derive(Debug, Serialize)]
pub struct TaskEnvelope {
    pub task: TaskWithFlows,
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskWithFlows>,
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    /// CSV of statuses, or `all`. Unknown values are tolerated (no filter
    /// applied for them).
    #[serde(default)]
    pub statuses: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedTasksQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    100
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedTasksResponse {
    pub tasks: Vec<Task>,
    pub total_count: usize,
    pub page: usize,
    pub page_size: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveFinishedResponse {
    pub archived_count: usize,
}

async fn load_task(state: &AppState, workspace_id: &str, id: &str) -> ApiResult<Task> {
    state
        .storage
        .get_task(workspace_id, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))
}

async fn with_flows(state: &AppState, task: Task) -> ApiResult<TaskWithFlows> {
    let flows = state
        .storage
        .list_flows_for_task(&task.workspace_id, &task.id)
        .await?;
    Ok(TaskWithFlows { task, flows })
}

/// Create a task. A `to_do` task immediately starts its workflow; the
/// response carries the task (clients learn of the flow via the
/// task-changes stream).
pub async fn create_task(
    State(state): State<AppState>,
    Path(workspace_id): Path<String>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<impl IntoResponse> {
    let timer = OpTimer::new("tasks", "create");

    state
        .storage
        .get_workspace(&workspace_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Workspace not found".to_string()))?;

    let shape = validation::validate_new_task(
        req.status.as_deref(),
        req.agent_type.as_deref(),
        &req.flow_type,
        req.flow_options,
    )?;

    let now = chrono::Utc::now();
    let task = Task {
        id: new_id(TASK_ID_PREFIX),
        workspace_id: workspace_id.clone(),
        title: req.title,
        description: req.description,
        status: shape.status,
        agent_type: shape.agent_type,
        flow_type: req.flow_type,
        flow_options: shape.flow_options,
        stream_id: 0,
        archived: None,
        created: now,
        updated: now,
    };
    let task = state.storage.persist_task(task).await?;

    if task.status == TaskStatus::ToDo {
        let run_id = state
            .workflow
            .execute_workflow(WorkflowStart {
                workflow_type: workflow_type_for(&task.flow_type).to_string(),
                workspace_id: workspace_id.clone(),
                task_id: task.id.clone(),
                flow_options: task.flow_options.clone(),
            })
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        tracing::info!(task_id = %task.id, run_id = %run_id, "workflow started for task");
    }

    let response = with_flows(&state, task).await?;
    timer.finish();
    Ok((StatusCode::OK, Json(response)))
}

/// Parse the `statuses` CSV. `None` means no filter.
fn parse_status_filter(raw: Option<&str>) -> Option<Vec<TaskStatus>> {
    let raw = raw?;
    if raw == "all" {
        return None;
    }
    let parsed: Vec<TaskStatus> = raw
        .split(',')
        .map(str::trim)
        .filter_map(|token| token.parse().ok())
        .collect();
    if parsed.is_empty() {
        None
    } else {
        Some(parsed)
    }
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Path(workspace_id): Path<String>,
    Query(query): Query<ListTasksQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = parse_status_filter(query.statuses.as_deref());

    let tasks = state.storage.list_tasks(&workspace_id).await?;
    let mut out = Vec::new();
    for task in tasks {
        if task.is_archived() {
            continue;
        }
        if let Some(ref statuses) = filter {
            if !statuses.contains(&task.status) {
                continue;
            }
        }
        out.push(with_flows(&state, task).await?);
    }

    Ok((StatusCode::OK, Json(TaskListResponse { tasks: out })))
}

pub async fn list_archived_tasks(
    State(state): State<AppState>,
    Path(workspace_id): Path<String>,
    Query(query): Query<ArchivedTasksQuery>,
) -> ApiResult<impl IntoResponse> {
    let page = query.page.max(1);
    let page_size = query.page_size.clamp(1, 1000);
    let (tasks, total_count) = state
        .storage
        .list_archived_tasks(&workspace_id, page, page_size)
        .await?;
    Ok((
        StatusCode::OK,
        Json(ArchivedTasksResponse {
            tasks,
            total_count,
            page,
            page_size,
        }),
    ))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path((workspace_id, id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let task = load_task(&state, &workspace_id, &id).await?;
    let task = with_flows(&state, task).await?;
    Ok((StatusCode::OK, Json(TaskEnvelope { task })))
}

pub async fn update_task(
    State(state): State<AppState>,
    Path((workspace_id, id)): Path<(String, String)>,
    Json(req): Json<UpdateTaskRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut task = load_task(&state, &workspace_id, &id).await?;

    let (status, agent_type) = validation::validate_task_update(
        task.status,
        task.agent_type,
        req.status.as_deref(),
        req.agent_type.as_deref(),
    )?;

    task.status = status;
    task.agent_type = agent_type;
    if let Some(title) = req.title {
        task.title = title;
    }
    if let Some(description) = req.description {
        task.description = description;
    }
    if let Some(flow_type) = req.flow_type {
        task.flow_type = flow_type;
    }
    if let Some(flow_options) = req.flow_options {
        task.flow_options = Some(flow_options);
    }
    task.updated = chrono::Utc::now();

    let task = state.storage.persist_task(task).await?;
    let response = with_flows(&state, task).await?;
    Ok((StatusCode::OK, Json(response)))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Path((workspace_id, id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    if !state.storage.delete_task(&workspace_id, &id).await? {
        return Err(ApiError::NotFound("Task not found".to_string()));
    }
    tracing::info!(%workspace_id, task_id = %id, "task deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Cancel a task: flip it to `canceled` with agent type `none`, then
/// terminate its workflows. A failed terminate RPC is logged and does not
/// revert the state change; callers may observe the divergence.
pub async fn cancel_task(
    State(state): State<AppState>,
    Path((workspace_id, id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let timer = OpTimer::new("tasks", "cancel");
    let mut task = load_task(&state, &workspace_id, &id).await?;

    validation::validate_task_cancel(task.status)?;

    task.status = TaskStatus::Canceled;
    task.agent_type = crate::domain::AgentType::None;
    task.updated = chrono::Utc::now();
    let task = state.storage.persist_task(task).await?;

    let flows = state
        .storage
        .list_flows_for_task(&workspace_id, &id)
        .await?;
    for flow in &flows {
        if let Err(error) = state
            .workflow
            .terminate_workflow(&flow.id, "task canceled")
            .await
        {
            tracing::warn!(
                task_id = %id,
                flow_id = %flow.id,
                %error,
                "failed to terminate workflow for canceled task"
            );
        }
    }

    let response = TaskWithFlows { task, flows };
    timer.finish();
    Ok((StatusCode::OK, Json(response)))
}

/// Archive one finished task. Archival stamps `archived` and leaves
/// `status` untouched.
pub async fn archive_task(
    State(state): State<AppState>,
    Path((workspace_id, id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let mut task = load_task(&state, &workspace_id, &id).await?;
    validation::validate_task_archive(task.status)?;

    let now = chrono::Utc::now();
    task.archived = Some(now);
    task.updated = now;
    let task = state.storage.persist_task(task).await?;
    let response = with_flows(&state, task).await?;
    Ok((StatusCode::OK, Json(response)))
}

/// Archive every finished (`complete`/`canceled`/`failed`) task in the
/// workspace.
pub async fn archive_finished(
    State(state): State<AppState>,
    Path(workspace_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let timer = OpTimer::new("tasks", "archive_finished");
    let tasks = state.storage.list_tasks(&workspace_id).await?;

    let mut archived_count = 0;
    let now = chrono::Utc::now();
    for mut task in tasks {
        if task.is_archived() || !task.status.is_finished() {
            continue;
        }
        task.archived = Some(now);
        task.updated = now;
        state.storage.persist_task(task).await?;
        archived_count += 1;
    }

    tracing::info!(%workspace_id, archived_count, "archived finished tasks");
    timer.finish();
    Ok((StatusCode::OK, Json(ArchiveFinishedResponse { archived_count })))
}
