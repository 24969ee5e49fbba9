//! Workspace endpoints: CRUD, merged configuration, git branch listing.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ApiError, ApiResult};
use crate::domain::{new_id, Workspace, WorkspaceConfig, WORKSPACE_ID_PREFIX};
use crate::logging::OpTimer;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/workspaces", post(create_workspace))
        .route("/api/v1/workspaces", get(list_workspaces))
        .route("/api/v1/workspaces/{workspace_id}", get(get_workspace))
        .route("/api/v1/workspaces/{workspace_id}", put(update_workspace))
        .route(
            "/api/v1/workspaces/{workspace_id}/branches",
            get(list_branches),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkspaceRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub local_repo_dir: String,
    #[serde(default)]
    pub llm_config: Option<Map<String, Value>>,
    #[serde(default)]
    pub embedding_config: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorkspaceRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub local_repo_dir: Option<String>,
    #[serde(default)]
    pub llm_config: Option<Map<String, Value>>,
    #[serde(default)]
    pub embedding_config: Option<Map<String, Value>>,
}

impl UpdateWorkspaceRequest {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.local_repo_dir.is_none()
            && self.llm_config.is_none()
            && self.embedding_config.is_none()
    }
}

/// Workspace with its configuration sidecar merged in. Config sections are
/// always present (empty objects when unset), never null.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceResponse {
    #[serde(flatten)]
    pub workspace: Workspace,
    pub llm_config: Map<String, Value>,
    pub embedding_config: Map<String, Value>,
}

impl WorkspaceResponse {
    fn merge(workspace: Workspace, config: Option<WorkspaceConfig>) -> Self {
        let config = config.unwrap_or_default();
        Self {
            workspace,
            llm_config: config.llm_defaults,
            embedding_config: config.embedding_defaults,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WorkspaceListResponse {
    pub workspaces: Vec<Workspace>,
}

#[derive(Debug, Serialize)]
pub struct BranchListResponse {
    pub branches: Vec<String>,
}

pub async fn create_workspace(
    State(state): State<AppState>,
    Json(req): Json<CreateWorkspaceRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name is required".to_string()));
    }
    if req.local_repo_dir.trim().is_empty() {
        return Err(ApiError::BadRequest("localRepoDir is required".to_string()));
    }

    let now = chrono::Utc::now();
    let workspace = Workspace {
        id: new_id(WORKSPACE_ID_PREFIX),
        name: req.name,
        local_repo_dir: req.local_repo_dir,
        created: now,
        updated: now,
    };
    state.storage.persist_workspace(workspace.clone()).await?;

    let config = WorkspaceConfig {
        llm_defaults: req.llm_config.unwrap_or_default(),
        embedding_defaults: req.embedding_config.unwrap_or_default(),
        use_case_configs: Map::new(),
    };
    state
        .storage
        .persist_workspace_config(&workspace.id, config.clone())
        .await?;

    tracing::info!(workspace_id = %workspace.id, name = %workspace.name, "workspace created");

    Ok((
        StatusCode::OK,
        Json(WorkspaceResponse::merge(workspace, Some(config))),
    ))
}

pub async fn list_workspaces(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let workspaces = state.storage.list_workspaces().await?;
    Ok((StatusCode::OK, Json(WorkspaceListResponse { workspaces })))
}

pub async fn get_workspace(
    State(state): State<AppState>,
    Path(workspace_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let workspace = state
        .storage
        .get_workspace(&workspace_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Workspace not found".to_string()))?;
    let config = state.storage.get_workspace_config(&workspace_id).await?;
    Ok((
        StatusCode::OK,
        Json(WorkspaceResponse::merge(workspace, config)),
    ))
}

pub async fn update_workspace(
    State(state): State<AppState>,
    Path(workspace_id): Path<String>,
    Json(req): Json<UpdateWorkspaceRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.is_empty() {
        return Err(ApiError::BadRequest(
            "at least one of name, localRepoDir, llmConfig, or embeddingConfig must be provided"
                .to_string(),
        ));
    }

    let mut workspace = state
        .storage
        .get_workspace(&workspace_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Workspace not found".to_string()))?;

    if let Some(name) = req.name {
        workspace.name = name;
    }
    if let Some(dir) = req.local_repo_dir {
        workspace.local_repo_dir = dir;
    }
    workspace.updated = chrono::Utc::now();
    state.storage.persist_workspace(workspace.clone()).await?;

    let mut config = state
        .storage
        .get_workspace_config(&workspace_id)
        .await?
        .unwrap_or_default();
    if let Some(llm) = req.llm_config {
        config.llm_defaults = llm;
    }
    if let Some(embedding) = req.embedding_config {
        config.embedding_defaults = embedding;
    }
    state
        .storage
        .persist_workspace_config(&workspace_id, config.clone())
        .await?;

    Ok((
        StatusCode::OK,
        Json(WorkspaceResponse::merge(workspace, Some(config))),
    ))
}

/// List git branches of the workspace repo, excluding branches checked out
/// in managed worktrees. A git failure degrades to an empty list with a
/// logged warning; a missing repo dir is a 409.
pub async fn list_branches(
    State(state): State<AppState>,
    Path(workspace_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let timer = OpTimer::new("workspaces", "list_branches");

    let workspace = state
        .storage
        .get_workspace(&workspace_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Workspace not found".to_string()))?;

    if !std::path::Path::new(&workspace.local_repo_dir).is_dir() {
        return Err(ApiError::Conflict(
            "Workspace repo dir is missing".to_string(),
        ));
    }

    let managed: std::collections::HashSet<String> = state
        .storage
        .list_worktrees(&workspace_id)
        .await?
        .into_iter()
        .map(|w| w.branch)
        .collect();

    let branches = match git_branches(&workspace.local_repo_dir).await {
        Ok(branches) => branches
            .into_iter()
            .filter(|b| !managed.contains(b))
            .collect(),
        Err(error) => {
            tracing::warn!(
                %workspace_id,
                repo_dir = %workspace.local_repo_dir,
                %error,
                "branch listing failed, returning empty list"
            );
            Vec::new()
        }
    };

    timer.finish();
    Ok((StatusCode::OK, Json(BranchListResponse { branches })))
}

async fn git_branches(repo_dir: &str) -> anyhow::Result<Vec<String>> {
    let output = tokio::process::Command::new("git")
        .arg("-C")
        .arg(repo_dir)
        .args(["branch", "--format", "%(refname:short)"])
        .output()
        .await?;

    if !output.status.success() {
        anyhow::bail!(
            "git branch exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect())
}
