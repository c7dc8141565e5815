//! Caller-facing stream events.
//!
//! `StreamEvent` is the wire contract of a chat request. Every request yields
//! `id` first and exactly one terminal event (`end_turn` or `error`) last.

use serde::{Deserialize, Serialize};
use shopwire_core::message::Message;
use shopwire_tools::ProductSummary;

/// Events emitted to the caller during one turn.
///
/// - `id`               - the conversation id (always first)
/// - `chunk`            - partial text from the completion service
/// - `message_complete` - a finished assistant message
/// - `tool_use`         - a tool call is about to run
/// - `new_message`      - a tool result was appended
/// - `auth_required`    - a tool needs the user to authorize
/// - `product_results`  - product cards gathered during the turn
/// - `end_turn`         - the turn is over
/// - `error`            - the turn failed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Id {
        conversation_id: String,
    },

    Chunk {
        chunk: String,
    },

    MessageComplete {
        message: Message,
    },

    ToolUse {
        tool_call_id: String,
        name: String,
        arguments: serde_json::Value,
    },

    NewMessage {
        message: Message,
    },

    AuthRequired {
        tool_call_id: String,
        name: String,
        message: String,
    },

    ProductResults {
        products: Vec<ProductSummary>,
    },

    EndTurn,

    Error {
        error: String,
    },
}

impl StreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Id { .. } => "id",
            Self::Chunk { .. } => "chunk",
            Self::MessageComplete { .. } => "message_complete",
            Self::ToolUse { .. } => "tool_use",
            Self::NewMessage { .. } => "new_message",
            Self::AuthRequired { .. } => "auth_required",
            Self::ProductResults { .. } => "product_results",
            Self::EndTurn => "end_turn",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this event closes the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::EndTurn | Self::Error { .. })
    }
}
