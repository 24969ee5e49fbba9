//! Real-time endpoints over the streaming hub.
//!
//! Three WebSocket routes (task changes, flow-action changes, flow events)
//! and one SSE route (flow actions). Every connection holds one hub
//! subscription, torn down when the socket closes. WebSocket upgrades are
//! origin-checked against the allowlist; reads carry a deadline that is
//! refreshed on every received frame.

use std::convert::Infallible;
use std::time::Duration;

use futures::SinkExt;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{header, HeaderMap},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::get,
    Router,
};
use serde::Deserialize;
use tokio::time::Instant;

use super::{ApiError, ApiResult};
use crate::config::OriginAllowlist;
use crate::hub::{StreamCursor, Subscription, SubscriptionFilter};
use crate::storage::{FeedKey, FeedPayload};
use crate::AppState;

/// A flow action persisted with this id terminates the SSE action stream.
pub const SSE_TERMINATOR_ID: &str = "end";

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/ws/v1/workspaces/{workspace_id}/task_changes",
            get(task_changes_ws),
        )
        .route(
            "/ws/v1/workspaces/{workspace_id}/flows/{id}/action_changes_ws",
            get(action_changes_ws),
        )
        .route(
            "/ws/v1/workspaces/{workspace_id}/flows/{id}/events",
            get(flow_events_ws),
        )
        .route(
            "/api/v1/workspaces/{workspace_id}/flows/{id}/actions",
            get(flow_actions_sse),
        )
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    /// `$` for new-only, `0` for earliest, otherwise an opaque feed
    /// message id to resume after.
    #[serde(default)]
    pub stream_message_start_id: Option<String>,
}

impl StreamQuery {
    fn cursor(&self) -> ApiResult<StreamCursor> {
        match self.stream_message_start_id.as_deref() {
            None => Ok(StreamCursor::Earliest),
            Some(raw) => StreamCursor::parse(raw).map_err(ApiError::BadRequest),
        }
    }
}

/// Reject upgrades from disallowed browser origins. Requests without an
/// `Origin` header (non-browser clients) pass.
fn check_origin(headers: &HeaderMap, allowlist: &OriginAllowlist) -> ApiResult<()> {
    if let Some(origin) = headers.get(header::ORIGIN) {
        let origin = origin
            .to_str()
            .map_err(|_| ApiError::Forbidden("origin not allowed".to_string()))?;
        if !allowlist.allows(origin) {
            return Err(ApiError::Forbidden(format!("origin not allowed: {origin}")));
        }
    }
    Ok(())
}

fn read_timeout(state: &AppState) -> Duration {
    Duration::from_secs(state.config.server.ws_read_timeout_secs)
}

/// Task change stream. Each feed message is enriched into
/// `{ "tasks": [task], "lastTaskStreamId": <cursor> }`.
pub async fn task_changes_ws(
    State(state): State<AppState>,
    Path(workspace_id): Path<String>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> ApiResult<impl IntoResponse> {
    check_origin(&headers, &state.origins)?;
    let cursor = query.cursor()?;
    Ok(ws.on_upgrade(move |socket| run_task_changes(socket, state, workspace_id, cursor)))
}

async fn run_task_changes(
    mut socket: WebSocket,
    state: AppState,
    workspace_id: String,
    cursor: StreamCursor,
) {
    let mut subscription = state.hub.subscribe(
        FeedKey::tasks(&workspace_id),
        cursor,
        SubscriptionFilter::All,
    );
    let timeout = read_timeout(&state);
    let mut deadline = Box::pin(tokio::time::sleep(timeout));

    loop {
        tokio::select! {
            message = subscription.recv() => {
                let Some(message) = message else { break };
                let FeedPayload::Task(task) = &message.payload else { continue };
                let frame = serde_json::json!({
                    "tasks": [task],
                    "lastTaskStreamId": message.id,
                });
                if socket.send(Message::Text(frame.to_string().into())).await.is_err() {
                    break;
                }
            }
            frame = socket.recv() => {
                match frame {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => deadline.as_mut().reset(Instant::now() + timeout),
                    Some(Err(_)) => break,
                }
            }
            () = &mut deadline => {
                tracing::debug!(%workspace_id, "task change socket read deadline expired");
                break;
            }
        }
    }

    subscription.cancel();
    let _ = socket.close().await;
}

/// Flow-action change stream: one FlowAction JSON entity per message.
pub async fn action_changes_ws(
    State(state): State<AppState>,
    Path((workspace_id, id)): Path<(String, String)>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> ApiResult<impl IntoResponse> {
    check_origin(&headers, &state.origins)?;
    let cursor = query.cursor()?;
    Ok(ws.on_upgrade(move |socket| run_action_changes(socket, state, workspace_id, id, cursor)))
}

async fn run_action_changes(
    mut socket: WebSocket,
    state: AppState,
    workspace_id: String,
    flow_id: String,
    cursor: StreamCursor,
) {
    let mut subscription = state.hub.subscribe(
        FeedKey::actions(&workspace_id, &flow_id),
        cursor,
        SubscriptionFilter::All,
    );
    let timeout = read_timeout(&state);
    let mut deadline = Box::pin(tokio::time::sleep(timeout));

    loop {
        tokio::select! {
            message = subscription.recv() => {
                let Some(message) = message else { break };
                let FeedPayload::Action(action) = &message.payload else { continue };
                let Ok(frame) = serde_json::to_string(action) else { continue };
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            frame = socket.recv() => {
                match frame {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => deadline.as_mut().reset(Instant::now() + timeout),
                    Some(Err(_)) => break,
                }
            }
            () = &mut deadline => {
                tracing::debug!(%flow_id, "action change socket read deadline expired");
                break;
            }
        }
    }

    subscription.cancel();
    let _ = socket.close().await;
}

/// A client frame on the events socket: subscribe to one more sub-stream.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsSubscribeFrame {
    parent_id: String,
    #[serde(default)]
    stream_message_start_id: Option<String>,
}

/// Flow event stream. The subscription starts empty; the client sends
/// `{parentId, streamMessageStartId}` frames to add sub-streams, each
/// replaying that parent's history before continuing live.
pub async fn flow_events_ws(
    State(state): State<AppState>,
    Path((workspace_id, id)): Path<(String, String)>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> ApiResult<impl IntoResponse> {
    check_origin(&headers, &state.origins)?;
    Ok(ws.on_upgrade(move |socket| run_flow_events(socket, state, workspace_id, id)))
}

async fn run_flow_events(
    mut socket: WebSocket,
    state: AppState,
    workspace_id: String,
    flow_id: String,
) {
    let mut subscription = state.hub.subscribe(
        FeedKey::events(&workspace_id, &flow_id),
        StreamCursor::Earliest,
        SubscriptionFilter::Parents,
    );
    let timeout = read_timeout(&state);
    let mut deadline = Box::pin(tokio::time::sleep(timeout));

    loop {
        tokio::select! {
            message = subscription.recv() => {
                let Some(message) = message else { break };
                let FeedPayload::Event(event) = &message.payload else { continue };
                let Ok(frame) = serde_json::to_string(event) else { continue };
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            frame = socket.recv() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        deadline.as_mut().reset(Instant::now() + timeout);
                        handle_events_frame(&subscription, &flow_id, &text);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => deadline.as_mut().reset(Instant::now() + timeout),
                    Some(Err(_)) => break,
                }
            }
            () = &mut deadline => {
                tracing::debug!(%flow_id, "event socket read deadline expired");
                break;
            }
        }
    }

    subscription.cancel();
    let _ = socket.close().await;
}

fn handle_events_frame(subscription: &Subscription, flow_id: &str, text: &str) {
    match serde_json::from_str::<EventsSubscribeFrame>(text) {
        Ok(frame) => {
            let cursor = frame
                .stream_message_start_id
                .as_deref()
                .map_or(Ok(StreamCursor::Earliest), StreamCursor::parse);
            match cursor {
                Ok(cursor) => subscription.add_parent(&frame.parent_id, cursor),
                Err(error) => {
                    tracing::debug!(flow_id, %error, "ignoring subscribe frame with bad cursor");
                }
            }
        }
        Err(error) => {
            tracing::debug!(flow_id, %error, "ignoring malformed event subscribe frame");
        }
    }
}

/// Flow-action stream over SSE. Replays per the cursor (earliest by
/// default), then follows live changes, and terminates once it observes
/// the `"end"` flow action.
pub async fn flow_actions_sse(
    State(state): State<AppState>,
    Path((workspace_id, id)): Path<(String, String)>,
    Query(query): Query<StreamQuery>,
) -> ApiResult<impl IntoResponse> {
    state
        .storage
        .get_flow(&workspace_id, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Flow not found".to_string()))?;
    let cursor = query.cursor()?;

    let mut subscription = state.hub.subscribe(
        FeedKey::actions(&workspace_id, &id),
        cursor,
        SubscriptionFilter::All,
    );

    let stream = async_stream::stream! {
        while let Some(message) = subscription.recv().await {
            let FeedPayload::Action(action) = message.payload else { continue };
            if action.id == SSE_TERMINATOR_ID {
                break;
            }
            match serde_json::to_string(&action) {
                Ok(data) => {
                    yield Ok::<_, Infallible>(Event::default().event("flow_action").data(data));
                }
                Err(error) => {
                    tracing::error!(%error, "failed to encode flow action for SSE");
                }
            }
        }
    };

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Sse::new(stream).keep_alive(KeepAlive::default()),
    ))
}
