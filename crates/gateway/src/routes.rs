//! Route handlers.
//!
//! Endpoints:
//!
//! - `POST /chat`                         - Send a message, receive an SSE stream
//! - `GET  /conversations/{id}/messages`  - Persisted messages of a conversation
//! - `GET  /tools`                        - The tool catalog a new conversation sees
//! - `GET  /health`                       - Liveness

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
};
use serde::{Deserialize, Serialize};
use shopwire_agent::ChatRequest;
use shopwire_core::message::ConversationId;
use shopwire_core::tool::ToolDescriptor;
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::SharedState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

// ── Health ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store: String,
}

pub async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        store: state.orchestrator.store_name().into(),
    })
}

// ── Chat ──────────────────────────────────────────────────────────────────

/// `POST /chat` - run one turn and stream its events.
///
/// Each SSE event is named after the event type and carries the event's JSON.
/// Dropping the response (client disconnect) cancels the turn.
pub async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    if payload.message.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "message must not be empty"));
    }
    info!(
        conversation_id = payload.conversation_id.as_deref().unwrap_or("(new)"),
        prompt_type = payload.prompt_type.as_deref().unwrap_or("(default)"),
        "Chat request"
    );

    let cancel = CancellationToken::new();
    let turn = state.orchestrator.start_turn(payload, cancel.clone());
    let disconnect_guard = cancel.drop_guard();

    let stream = turn.map(move |event| {
        let _ = &disconnect_guard;
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().event(event.event_type()).data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// ── History ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub conversation_id: String,
    pub messages: Vec<HistoryEntry>,
}

/// `GET /conversations/{id}/messages` - unknown ids yield an empty list.
pub async fn conversation_messages_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let conversation_id = ConversationId(id);
    let rows = state
        .orchestrator
        .history(&conversation_id)
        .await
        .map_err(|e| {
            error!(conversation_id = %conversation_id, error = %e, "History read failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    let messages = rows
        .into_iter()
        .map(|row| HistoryEntry {
            role: row.role.as_str().into(),
            content: row.content.to_text(),
            tool_call_id: row.tool_call_id,
            created_at: row.created_at.to_rfc3339(),
        })
        .collect();

    Ok(Json(HistoryResponse {
        conversation_id: conversation_id.0,
        messages,
    }))
}

// ── Tools ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolListResponse {
    pub count: usize,
    pub tools: Vec<ToolDescriptor>,
}

pub async fn list_tools_handler(State(state): State<SharedState>) -> Json<ToolListResponse> {
    let tools = state.orchestrator.tools().await;
    Json(ToolListResponse {
        count: tools.len(),
        tools,
    })
}
