//! API error type and response mapping.
//!
//! Handlers return `Result<_, ApiError>`; the error kind picks the status
//! code and the display string becomes the `{"error": "..."}` body. The
//! user-action endpoint has its own `{"message": "..."}` body shape and
//! builds responses directly.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::storage::StorageError;
use crate::validation::{ActionRuleError, TaskRuleError};
use crate::workflow::WorkflowError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Malformed payload, enum violation, or state-machine violation.
    #[error("{0}")]
    BadRequest(String),
    /// Entity missing. Distinct from an empty collection, which is a 200
    /// with an empty array.
    #[error("{0}")]
    NotFound(String),
    /// Missing prerequisite (e.g. workspace repo dir gone).
    #[error("{0}")]
    Conflict(String),
    /// Disallowed browser origin.
    #[error("{0}")]
    Forbidden(String),
    /// Storage or workflow RPC failure; upstream message is surfaced.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self, Self::Internal(_)) {
            tracing::error!(error = %self, "request failed");
        }
        (
            self.status(),
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        Self::Internal(error.to_string())
    }
}

impl From<WorkflowError> for ApiError {
    fn from(error: WorkflowError) -> Self {
        Self::Internal(error.to_string())
    }
}

impl From<TaskRuleError> for ApiError {
    fn from(error: TaskRuleError) -> Self {
        Self::BadRequest(error.to_string())
    }
}

impl From<ActionRuleError> for ApiError {
    fn from(error: ActionRuleError) -> Self {
        Self::BadRequest(error.to_string())
    }
}
