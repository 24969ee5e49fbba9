//! FlowAction endpoints: one-shot listing, the callback-completion
//! protocol, and non-completing updates.
//!
//! Completion bridges an HTTP request to a workflow suspended on this
//! exact action: validate synchronously, deliver the completion payload as
//! an acknowledged workflow update, observe the persisted state change,
//! and return the fresh action to the caller. The workflow owns the
//! persisted write; this path only reads it back.

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
use crate::domain::flow::FLOW_STATUS_IN_PROGRESS;
use crate::domain::FlowAction;
use crate::logging::OpTimer;
use crate::validation;
use crate::workflow::{
    ActionCompletion, UPDATE_HUMAN_ACTION_COMPLETE, UPDATE_HUMAN_ACTION_UPDATE,
};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/workspaces/{workspace_id}/flow/{id}/actions",
            get(list_flow_actions),
        )
        .route(
            "/api/v1/workspaces/{workspace_id}/flow_actions/{id}/complete",
            post(complete_flow_action),
        )
        .route(
            "/api/v1/workspaces/{workspace_id}/flow_actions/{id}",
            put(update_flow_action),
        )
}

/// The human's answer to a decision point.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponsePayload {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub approved: Option<bool>,
    #[serde(default)]
    pub choice: Option<String>,
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowActionRequest {
    #[serde(default)]
    pub user_response: Option<UserResponsePayload>,
}

#[derive(Debug, Serialize)]
pub struct FlowActionListResponse {
    pub actions: Vec<FlowAction>,
}

/// One-shot action list for a flow. The flow must exist; an existing flow
/// with no actions is a 200 with an empty list.
pub async fn list_flow_actions(
    State(state): State<AppState>,
    Path((workspace_id, id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    state
        .storage
        .get_flow(&workspace_id, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Flow not found".to_string()))?;

    let actions = state.storage.list_flow_actions(&workspace_id, &id).await?;
    Ok((StatusCode::OK, Json(FlowActionListResponse { actions })))
}

async fn load_action(state: &AppState, workspace_id: &str, id: &str) -> ApiResult<FlowAction> {
    state
        .storage
        .get_flow_action(workspace_id, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Flow action not found".to_string()))
}

/// Complete a pending human callback action.
///
/// On success the returned action has `actionStatus = complete` and an
/// `actionResult` holding the JSON completion record. If the parent flow
/// was paused, it is flipped back to `in_progress` (unpause on human
/// input).
pub async fn complete_flow_action(
    State(state): State<AppState>,
    Path((workspace_id, id)): Path<(String, String)>,
    Json(req): Json<FlowActionRequest>,
) -> ApiResult<impl IntoResponse> {
    let timer = OpTimer::new("flow_actions", "complete");
    let action = load_action(&state, &workspace_id, &id).await?;

    let response = req.user_response.unwrap_or_default();
    validation::validate_action_complete(&action, response.content.as_deref())?;

    let completion = ActionCompletion {
        target_workflow_id: action.flow_id.clone(),
        content: response.content.unwrap_or_default(),
        approved: response.approved,
        choice: response.choice.unwrap_or_default(),
        params: response.params,
    };

    state
        .workflow
        .update_workflow(
            &action.flow_id,
            UPDATE_HUMAN_ACTION_COMPLETE,
            serde_json::to_value(&completion)
                .map_err(|e| ApiError::Internal(e.to_string()))?,
        )
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    // The workflow persisted the transition; read the fresh state back.
    let updated = state
        .storage
        .get_flow_action(&workspace_id, &id)
        .await?
        .ok_or_else(|| {
            ApiError::Internal("flow action disappeared during completion".to_string())
        })?;

    // Unpause on human input.
    if let Some(mut flow) = state.storage.get_flow(&workspace_id, &action.flow_id).await? {
        if flow.is_paused() {
            flow.status = FLOW_STATUS_IN_PROGRESS.to_string();
            state.storage.persist_flow(flow).await?;
            tracing::info!(flow_id = %action.flow_id, "flow unpaused by human action");
        }
    }

    timer.finish();
    Ok((StatusCode::OK, Json(updated)))
}

/// Non-completing update of a pending action. Never changes
/// `actionStatus` or `actionResult`, and never carries an approval
/// decision.
pub async fn update_flow_action(
    State(state): State<AppState>,
    Path((workspace_id, id)): Path<(String, String)>,
    Json(req): Json<FlowActionRequest>,
) -> ApiResult<impl IntoResponse> {
    let action = load_action(&state, &workspace_id, &id).await?;

    let response = req.user_response.unwrap_or_default();
    validation::validate_action_update(&action, response.approved.is_some())?;

    let payload = ActionCompletion {
        target_workflow_id: action.flow_id.clone(),
        content: response.content.unwrap_or_default(),
        approved: None,
        choice: response.choice.unwrap_or_default(),
        params: response.params,
    };

    state
        .workflow
        .update_workflow(
            &action.flow_id,
            UPDATE_HUMAN_ACTION_UPDATE,
            serde_json::to_value(&payload).map_err(|e| ApiError::Internal(e.to_string()))?,
        )
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let updated = state
        .storage
        .get_flow_action(&workspace_id, &id)
        .await?
        .ok_or_else(|| ApiError::Internal("flow action disappeared during update".to_string()))?;

    Ok((StatusCode::OK, Json(updated)))
}
