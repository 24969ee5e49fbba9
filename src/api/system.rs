//! Health and configuration read-through endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/off_hours", get(get_off_hours))
        .route("/api/v1/providers", get(get_providers))
        .route("/api/v1/models", get(get_models))
}

pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

/// Off-hours schedule, straight from config.
pub async fn get_off_hours(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.config.off_hours.clone()))
}

/// Configured LLM providers.
pub async fn get_providers(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "providers": state.config.providers })),
    )
}

/// Configured models.
pub async fn get_models(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "models": state.config.models })),
    )
}
