//! HTTP server setup and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::api::{self, ApiError};
use crate::config::AppConfig;
use crate::hub::StreamingHub;
use crate::logging::OpTimer;
use crate::storage::{MemoryStorage, Storage};
use crate::workflow::{InProcessEngine, WorkflowClient};
use crate::{log_banner, log_init_step, log_success, AppState};

/// Sidekick API version (from Cargo.toml).
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Create the application with the bundled in-memory storage and the
/// in-process workflow engine.
pub fn create_app(config: AppConfig) -> anyhow::Result<Router> {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let workflow: Arc<dyn WorkflowClient> = Arc::new(InProcessEngine::new(Arc::clone(&storage)));
    create_app_with(config, storage, workflow)
}

/// Create the application with injected storage and workflow backends.
pub fn create_app_with(
    config: AppConfig,
    storage: Arc<dyn Storage>,
    workflow: Arc<dyn WorkflowClient>,
) -> anyhow::Result<Router> {
    let overall_timer = OpTimer::new("server", "create_app");

    log_banner!(
        format!("🚀 Sidekick API v{VERSION}"),
        format!("Env: {} | Port: {}", config.app_env, config.server.port)
    );

    // [1/3] Origin allowlist
    let step_timer = OpTimer::new("server", "origin_allowlist");
    let origins = Arc::new(config.origin_allowlist()?);
    log_init_step!(1, 3, "Origin allowlist", format!("🌐 {} origins", origins.len()));
    step_timer.finish();

    // [2/3] Streaming hub
    let step_timer = OpTimer::new("server", "streaming_hub");
    let hub = Arc::new(StreamingHub::new(
        Arc::clone(&storage),
        config.server.subscriber_buffer,
    ));
    log_init_step!(
        2,
        3,
        "Streaming hub",
        format!("📡 buffer {} per subscriber", config.server.subscriber_buffer)
    );
    step_timer.finish();

    let timeout_secs = config.server.timeout_secs;
    let state = AppState {
        config: Arc::new(config),
        storage,
        workflow,
        hub,
        origins: Arc::clone(&origins),
    };

    // [3/3] Router + middleware
    let step_timer = OpTimer::new("server", "router");
    let cors_origins: Vec<HeaderValue> = origins
        .origins()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    let app = api::create_router()
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(cors_origins))
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(timeout_secs),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            origin_guard,
        ))
        .with_state(state);
    log_init_step!(3, 3, "Router", "🌐 Routes + middleware configured");
    step_timer.finish();

    overall_timer.finish();
    log_success!("Sidekick API server created successfully");
    tracing::info!("");

    Ok(app)
}

/// Reject browser requests from origins outside the allowlist before they
/// reach a handler. Requests without an `Origin` header pass through.
async fn origin_guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(origin) = request.headers().get(header::ORIGIN) {
        let allowed = origin
            .to_str()
            .map(|origin| state.origins.allows(origin))
            .unwrap_or(false);
        if !allowed {
            tracing::warn!(origin = ?origin, "rejected request from disallowed origin");
            return ApiError::Forbidden("origin not allowed".to_string()).into_response();
        }
    }
    next.run(request).await
}
