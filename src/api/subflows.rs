//! Subflow read endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use super::{ApiError, ApiResult};
use crate::domain::Subflow;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/workspaces/{workspace_id}/subflows/{id}",
            get(get_subflow),
        )
        .route(
            "/api/v1/workspaces/{workspace_id}/flows/{id}/subflows",
            get(list_subflows),
        )
}

#[derive(Debug, Serialize)]
pub struct SubflowListResponse {
    pub subflows: Vec<Subflow>,
}

pub async fn get_subflow(
    State(state): State<AppState>,
    Path((workspace_id, id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let subflow = state
        .storage
        .get_subflow(&workspace_id, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Subflow not found".to_string()))?;
    Ok((StatusCode::OK, Json(subflow)))
}

/// Subflows grouped under one flow. The flow must exist; no subflows is a
/// 200 with an empty list.
pub async fn list_subflows(
    State(state): State<AppState>,
    Path((workspace_id, id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    state
        .storage
        .get_flow(&workspace_id, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Flow not found".to_string()))?;

    let subflows = state
        .storage
        .list_subflows_for_flow(&workspace_id, &id)
        .await?;
    Ok((StatusCode::OK, Json(SubflowListResponse { subflows })))
}
