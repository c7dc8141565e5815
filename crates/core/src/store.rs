//! Message store trait and the persisted message shape.
//!
//! The store is an audit log, not the source of truth for an in-flight turn.
//! Content is tagged at write time so reads never have to guess whether a row
//! holds text or structured data.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::message::{ConversationId, Message, Role};

/// Persisted message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StoredContent {
    Plain(String),
    Structured(serde_json::Value),
}

impl StoredContent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Plain(_) => "plain",
            Self::Structured(_) => "structured",
        }
    }

    /// Flatten to the text a user or assistant would have seen.
    ///
    /// Structured content yields its `content`/`text` field when it has one,
    /// a concatenation of text blocks when it is a block list, and its JSON
    /// rendering otherwise.
    pub fn to_text(&self) -> String {
        match self {
            Self::Plain(s) => s.clone(),
            Self::Structured(v) => flatten_value(v),
        }
    }
}

fn flatten_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(map) => {
            for key in ["content", "text"] {
                if let Some(inner) = map.get(key) {
                    return flatten_value(inner);
                }
            }
            value.to_string()
        }
        serde_json::Value::Array(items) => items
            .iter()
            .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

/// A message as it lives in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: Role,
    pub content: StoredContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    /// Choose the stored representation for a live message.
    ///
    /// User text and tool-free assistant text are `Plain`. Assistant messages
    /// with tool calls and tool results are `Structured`.
    pub fn from_message(message: &Message) -> Self {
        let content = match message.role {
            Role::Assistant if message.has_tool_calls() => {
                StoredContent::Structured(serde_json::json!({
                    "content": message.content,
                    "tool_calls": message.tool_calls,
                }))
            }
            Role::Tool => StoredContent::Structured(serde_json::json!({
                "content": message.content,
                "is_error": message.is_error,
            })),
            _ => StoredContent::Plain(message.content.clone()),
        };
        Self {
            role: message.role,
            content,
            tool_call_id: message.tool_call_id.clone(),
            created_at: message.timestamp,
        }
    }

    /// Whether this assistant row carries tool calls and no visible text.
    pub fn is_tool_call_only(&self) -> bool {
        match &self.content {
            StoredContent::Structured(v) => {
                let has_calls = v
                    .get("tool_calls")
                    .and_then(|c| c.as_array())
                    .is_some_and(|c| !c.is_empty());
                let text = v.get("content").and_then(|c| c.as_str()).unwrap_or("");
                has_calls && text.trim().is_empty()
            }
            StoredContent::Plain(_) => false,
        }
    }

    /// Whether this user row is an echoed tool result rather than user text.
    pub fn is_tool_result_echo(&self) -> bool {
        if self.tool_call_id.is_some() {
            return true;
        }
        match &self.content {
            StoredContent::Structured(serde_json::Value::Array(blocks)) => blocks
                .iter()
                .any(|b| b.get("type").and_then(|t| t.as_str()) == Some("tool_result")),
            StoredContent::Structured(v) => v.get("tool_use_id").is_some(),
            StoredContent::Plain(_) => false,
        }
    }
}

/// The message store collaborator.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Append one message to a conversation.
    async fn append(
        &self,
        conversation_id: &ConversationId,
        message: StoredMessage,
    ) -> std::result::Result<(), StoreError>;

    /// All messages of a conversation in append order. Unknown ids yield an
    /// empty list.
    async fn list(
        &self,
        conversation_id: &ConversationId,
    ) -> std::result::Result<Vec<StoredMessage>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageToolCall;

    #[test]
    fn plain_for_user_and_text_assistant() {
        let stored = StoredMessage::from_message(&Message::user("hi"));
        assert_eq!(stored.content, StoredContent::Plain("hi".into()));
        let stored = StoredMessage::from_message(&Message::assistant("hello"));
        assert_eq!(stored.content.kind(), "plain");
    }

    #[test]
    fn structured_for_tool_calls_and_results() {
        let mut msg = Message::assistant("");
        msg.tool_calls.push(MessageToolCall {
            id: "call_1".into(),
            name: "search_shop_catalog".into(),
            arguments: "{}".into(),
        });
        let stored = StoredMessage::from_message(&msg);
        assert_eq!(stored.content.kind(), "structured");
        assert!(stored.is_tool_call_only());

        let result = StoredMessage::from_message(&Message::tool_result("call_1", "ok", false));
        assert_eq!(result.content.kind(), "structured");
        assert_eq!(result.content.to_text(), "ok");
        assert_eq!(result.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn assistant_with_text_and_calls_is_not_call_only() {
        let mut msg = Message::assistant("Let me look that up.");
        msg.tool_calls.push(MessageToolCall {
            id: "c".into(),
            name: "t".into(),
            arguments: "{}".into(),
        });
        let stored = StoredMessage::from_message(&msg);
        assert!(!stored.is_tool_call_only());
        assert_eq!(stored.content.to_text(), "Let me look that up.");
    }

    #[test]
    fn flatten_block_lists() {
        let content = StoredContent::Structured(serde_json::json!([
            { "type": "text", "text": "a" },
            { "type": "image", "url": "x" },
            { "type": "text", "text": "b" }
        ]));
        assert_eq!(content.to_text(), "a\nb");
    }

    #[test]
    fn detects_tool_result_echo() {
        let echo = StoredMessage {
            role: Role::User,
            content: StoredContent::Structured(serde_json::json!([
                { "type": "tool_result", "tool_use_id": "c", "content": "x" }
            ])),
            tool_call_id: None,
            created_at: Utc::now(),
        };
        assert!(echo.is_tool_result_echo());
        assert!(!StoredMessage::from_message(&Message::user("x")).is_tool_result_echo());
    }
}
