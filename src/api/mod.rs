//! HTTP/WebSocket/SSE surface.
//!
//! Each module owns one resource's routes and exposes a `router()`; this
//! module merges them. Handlers bind parameters, run validation, call
//! storage and the workflow client, and map errors (`error` module). The
//! real-time endpoints live in `streaming`.

pub mod error;
pub mod flow_actions;
pub mod flows;
pub mod streaming;
pub mod subflows;
pub mod system;
pub mod tasks;
pub mod workspaces;

pub use error::{ApiError, ApiResult};

use axum::Router;

use crate::AppState;

/// Create the full API router.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .merge(system::router())
        .merge(workspaces::router())
        .merge(tasks::router())
        .merge(flows::router())
        .merge(flow_actions::router())
        .merge(subflows::router())
        .merge(streaming::router())
}
