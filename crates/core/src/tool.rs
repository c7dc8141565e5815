//! Tool types - the abstraction over remote tool servers.
//!
//! Tools live on external JSON-RPC servers. A `ToolServer` exposes the static
//! catalog it advertised at connect time and performs calls by name. The
//! resolved, per-conversation catalog that dispatches across servers lives in
//! `shopwire-tools`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// A request to execute a tool, as emitted by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON object
    pub arguments: serde_json::Value,
}

/// Failure classes a caller must tell apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// The tool demands an out-of-band authorization step
    AuthRequired,
    /// Anything else; explained back to the model as text
    Other,
}

/// The normalized outcome of one tool call. Exactly one per `ToolCall`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub tool_call_id: String,

    /// Text content shown to the model
    pub content: String,

    pub is_error: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ToolErrorKind>,
}

impl ToolResult {
    pub fn success(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: false,
            error_kind: None,
        }
    }

    /// Build an error result from a tool failure, keeping the auth class.
    pub fn from_error(tool_call_id: impl Into<String>, err: &ToolError) -> Self {
        let kind = if err.is_auth_required() {
            ToolErrorKind::AuthRequired
        } else {
            ToolErrorKind::Other
        };
        Self {
            tool_call_id: tool_call_id.into(),
            content: format!("Error: {err}"),
            is_error: true,
            error_kind: Some(kind),
        }
    }

    pub fn is_auth_required(&self) -> bool {
        self.error_kind == Some(ToolErrorKind::AuthRequired)
    }
}

/// A tool as advertised by a server's `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// JSON Schema for the arguments
    #[serde(rename = "inputSchema", default = "empty_object_schema")]
    pub input_schema: serde_json::Value,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

impl ToolDescriptor {
    /// Convert into a ToolDefinition for sending to the model.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.input_schema.clone(),
        }
    }
}

/// A remote server hosting tools.
///
/// Each configured endpoint implements this trait. The catalog is fetched
/// once per conversation; calls return the server's raw result payload and
/// leave normalization to the caller.
#[async_trait]
pub trait ToolServer: Send + Sync {
    /// A label for logs and diagnostics.
    fn name(&self) -> &str;

    /// Fetch the server's tool catalog.
    async fn list_tools(&self) -> std::result::Result<Vec<ToolDescriptor>, ToolError>;

    /// Invoke `tool` with a JSON object of arguments.
    async fn call_tool(
        &self,
        tool: &str,
        arguments: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_reads_input_schema_key() {
        let raw = serde_json::json!({
            "name": "search_shop_catalog",
            "description": "Search products",
            "inputSchema": { "type": "object", "properties": { "query": { "type": "string" } } }
        });
        let desc: ToolDescriptor = serde_json::from_value(raw).unwrap();
        let def = desc.to_definition();
        assert_eq!(def.name, "search_shop_catalog");
        assert_eq!(def.parameters["properties"]["query"]["type"], "string");
    }

    #[test]
    fn descriptor_defaults_missing_schema() {
        let desc: ToolDescriptor =
            serde_json::from_value(serde_json::json!({ "name": "get_cart" })).unwrap();
        assert_eq!(desc.input_schema["type"], "object");
        assert!(desc.description.is_empty());
    }

    #[test]
    fn error_result_keeps_auth_class() {
        let auth = ToolResult::from_error(
            "call_1",
            &ToolError::AuthRequired {
                tool_name: "get_orders".into(),
                message: "login".into(),
            },
        );
        assert!(auth.is_error);
        assert!(auth.is_auth_required());

        let generic = ToolResult::from_error("call_2", &ToolError::NotFound("nope".into()));
        assert_eq!(generic.error_kind, Some(ToolErrorKind::Other));
        assert!(generic.content.contains("nope"));
    }
}
