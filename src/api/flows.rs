//! Flow endpoints: read, user-action signalling, pause/resume, chat
//! history hydration.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiResult};
use crate::chat::{self, ChatMessage};
use crate::domain::Flow;
use crate::workflow::{SIGNAL_PAUSE, SIGNAL_RESUME, SIGNAL_USER_ACTION};
use crate::AppState;

/// The only user action currently accepted by workflows.
pub const USER_ACTION_GO_NEXT_STEP: &str = "go_next_step";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/workspaces/{workspace_id}/flows/{id}", get(get_flow))
        .route(
            "/api/v1/workspaces/{workspace_id}/flows/{id}/user_action",
            post(user_action),
        )
        .route(
            "/api/v1/workspaces/{workspace_id}/flows/{id}/pause",
            post(pause_flow),
        )
        .route(
            "/api/v1/workspaces/{workspace_id}/flows/{id}/resume",
            post(resume_flow),
        )
        .route(
            "/api/v1/workspaces/{workspace_id}/flows/{id}/chat_history/hydrate",
            post(hydrate_chat_history),
        )
}

/// Load a flow and attach its worktrees.
pub(crate) async fn load_flow_with_worktrees(
    state: &AppState,
    workspace_id: &str,
    id: &str,
) -> ApiResult<Flow> {
    let mut flow = state
        .storage
        .get_flow(workspace_id, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Flow not found".to_string()))?;
    flow.worktrees = state
        .storage
        .list_worktrees_for_flow(workspace_id, id)
        .await?;
    Ok(flow)
}

pub async fn get_flow(
    State(state): State<AppState>,
    Path((workspace_id, id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let flow = load_flow_with_worktrees(&state, &workspace_id, &id).await?;
    Ok((StatusCode::OK, Json(flow)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActionRequest {
    #[serde(default)]
    pub action_type: String,
}

/// Signal a user-driven action to the flow's workflow.
///
/// This endpoint's bodies use the `{"message": "..."}` shape throughout.
pub async fn user_action(
    State(state): State<AppState>,
    Path((workspace_id, id)): Path<(String, String)>,
    Json(req): Json<UserActionRequest>,
) -> impl IntoResponse {
    let flow = match state.storage.get_flow(&workspace_id, &id).await {
        Ok(Some(flow)) => flow,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "message": "Flow not found" })),
            );
        }
        Err(error) => {
            tracing::error!(%error, "failed to load flow for user action");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "message": error.to_string() })),
            );
        }
    };

    if req.action_type != USER_ACTION_GO_NEXT_STEP {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "message": format!("Unknown action type: {}", req.action_type)
            })),
        );
    }

    match state
        .workflow
        .signal_workflow(
            &flow.id,
            SIGNAL_USER_ACTION,
            serde_json::json!({ "actionType": req.action_type }),
        )
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "message": "user action accepted" })),
        ),
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "message": format!("Failed to signal workflow: {error}")
            })),
        ),
    }
}

/// Ask the workflow to pause itself. The engine owns the resulting status
/// transition.
pub async fn pause_flow(
    State(state): State<AppState>,
    Path((workspace_id, id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    state
        .storage
        .get_flow(&workspace_id, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Flow not found".to_string()))?;

    state
        .workflow
        .signal_workflow(&id, SIGNAL_PAUSE, serde_json::Value::Null)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let flow = load_flow_with_worktrees(&state, &workspace_id, &id).await?;
    Ok((StatusCode::OK, Json(flow)))
}

/// Ask the workflow to resume.
pub async fn resume_flow(
    State(state): State<AppState>,
    Path((workspace_id, id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    state
        .storage
        .get_flow(&workspace_id, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Flow not found".to_string()))?;

    state
        .workflow
        .signal_workflow(&id, SIGNAL_RESUME, serde_json::Value::Null)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let flow = load_flow_with_worktrees(&state, &workspace_id, &id).await?;
    Ok((StatusCode::OK, Json(flow)))
}

#[derive(Debug, Deserialize)]
pub struct HydrateRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct HydrateResponse {
    pub messages: Vec<ChatMessage>,
}

/// Resolve content-block references in the given chat history. Missing or
/// malformed blocks come back as `[hydrate error: …]` text blocks, never
/// as a failure.
pub async fn hydrate_chat_history(
    State(state): State<AppState>,
    Path((workspace_id, id)): Path<(String, String)>,
    Json(req): Json<HydrateRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .storage
        .get_flow(&workspace_id, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Flow not found".to_string()))?;

    let messages =
        chat::hydrate_messages(state.storage.as_ref(), &workspace_id, &id, req.messages).await;
    Ok((StatusCode::OK, Json(HydrateResponse { messages })))
}
