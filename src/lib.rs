//! Sidekick API - request-layer coordination engine
//!
//! This crate is the HTTP/WebSocket layer between the Sidekick browser UI
//! and the durable workflow engine. It binds the human-visible entities
//! (workspaces, tasks, flows, flow actions, subflows) stored in the
//! key-value service to long-running workflows, and multiplexes three
//! real-time change feeds out to clients:
//!
//! - **Validation**: pure state machines for task and flow-action
//!   transitions ([`validation`])
//! - **Streaming hub**: per-subscriber fan-out with replay cursors,
//!   dynamic filters and drop-on-full backpressure ([`hub`])
//! - **Callback completion**: the bridge from an HTTP "submit" to a
//!   workflow suspended on that exact decision point
//!   ([`api::flow_actions`])
//!
//! # Architecture
//!
//! - [`config`]: layered configuration and the origin allowlist
//! - [`domain`]: entity models and wire conventions
//! - [`storage`]: the KV/change-feed contract plus the in-memory backend
//! - [`hub`]: the streaming hub
//! - [`workflow`]: the workflow engine client and the in-process engine
//! - [`chat`]: chat-history block hydration
//! - [`api`]: HTTP/WS/SSE surface
//!
//! # Example
//!
//! ```rust,ignore
//! use sidekick_api::{config::AppConfig, server::create_app};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load()?;
//!     let app = create_app(config)?;
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8855").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod api;
pub mod chat;
pub mod config;
pub mod domain;
pub mod hub;
pub mod logging;
pub mod server;
pub mod storage;
pub mod validation;
pub mod workflow;

use std::sync::Arc;

use config::{AppConfig, OriginAllowlist};
use hub::StreamingHub;
use storage::Storage;
use workflow::WorkflowClient;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Entity persistence and change feeds.
    pub storage: Arc<dyn Storage>,
    /// Workflow engine RPC client.
    pub workflow: Arc<dyn WorkflowClient>,
    /// Change-feed fan-out to WebSocket/SSE subscribers.
    pub hub: Arc<StreamingHub>,
    /// Browser origin allowlist.
    pub origins: Arc<OriginAllowlist>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &"AppConfig")
            .field("storage", &"Storage")
            .field("workflow", &"WorkflowClient")
            .field("hub", &self.hub)
            .field("origins", &self.origins.len())
            .finish()
    }
}
