//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to the router and registry.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::response::{api_accepted, api_success};
use crate::api::AppState;
use crate::error::{VoicecastError, VoicecastResult};
use crate::events::BroadcastEvent;
use crate::protocol_constants::{SERVICE_ID, SSE_KEEP_ALIVE_SECS, STREAM_ENDED_CALLBACK_PATH};
use crate::session::ChatId;
use crate::transport::StreamEnded;

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CommandRequest {
    text: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/chats", get(list_chats))
        .route("/api/chats/{chat_id}", get(get_chat))
        .route("/api/chats/{chat_id}/commands", post(post_command))
        .route("/api/events", get(event_stream))
        .route(STREAM_ENDED_CALLBACK_PATH, post(stream_ended_callback))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe with the number of live sessions.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "sessions": state.registry.len(),
    }))
}

async fn list_chats(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({ "chats": state.registry.snapshots() }))
}

async fn get_chat(
    Path(chat_id): Path<ChatId>,
    State(state): State<AppState>,
) -> VoicecastResult<impl IntoResponse> {
    let snapshot = state
        .registry
        .snapshot(chat_id)
        .ok_or(VoicecastError::SessionNotFound(chat_id))?;
    Ok(api_success(snapshot))
}

/// POST /api/chats/{chat_id}/commands
///
/// Submits chat text as if typed in the chat and returns the bot's reply.
async fn post_command(
    Path(chat_id): Path<ChatId>,
    State(state): State<AppState>,
    Json(payload): Json<CommandRequest>,
) -> VoicecastResult<impl IntoResponse> {
    if payload.text.trim().is_empty() {
        return Err(VoicecastError::InvalidRequest(
            "text must not be empty".into(),
        ));
    }
    let reply = state.router.route(chat_id, &payload.text).await;
    Ok(api_success(json!({ "chatId": chat_id, "reply": reply })))
}

/// Lifecycle callback from the voice bridge.
async fn stream_ended_callback(
    State(state): State<AppState>,
    Json(ended): Json<StreamEnded>,
) -> impl IntoResponse {
    state.lifecycle.handle(ended);
    api_accepted()
}

/// Server-sent events stream of every emitted domain event.
async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.event_bridge.subscribe()).filter_map(|res| async move {
        match res {
            Ok(event) => to_sse_event(&event).map(Ok),
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                log::warn!("[Api] SSE client lagged, {} events dropped", n);
                None
            }
        }
    });

    let keep_alive = KeepAlive::new()
        .interval(Duration::from_secs(SSE_KEEP_ALIVE_SECS))
        .text("keep-alive");
    Sse::new(stream).keep_alive(keep_alive)
}

fn to_sse_event(event: &BroadcastEvent) -> Option<Event> {
    let name = match event {
        BroadcastEvent::Playback(_) => "playback",
        BroadcastEvent::Registry(_) => "registry",
    };
    match Event::default().event(name).json_data(event) {
        Ok(event) => Some(event),
        Err(e) => {
            log::warn!("[Api] Failed to encode event: {}", e);
            None
        }
    }
}
