//! JSON-RPC 2.0 tool server client over HTTP.
//!
//! Speaks the subset of the Model Context Protocol a storefront tool server
//! exposes: `initialize`, `tools/list` and `tools/call`, each as a single
//! POST to the server URL.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shopwire_config::ToolServerConfig;
use shopwire_core::error::ToolError;
use shopwire_core::tool::{ToolDescriptor, ToolServer};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// JSON-RPC code some servers use to signal missing authorization.
pub const AUTH_REQUIRED_CODE: i64 = -32001;

/// JSON-RPC 2.0 request
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl JsonRpcError {
    fn is_auth_required(&self) -> bool {
        self.code == AUTH_REQUIRED_CODE
            || self
                .data
                .as_ref()
                .and_then(|d| d.get("type"))
                .and_then(|t| t.as_str())
                == Some("auth_required")
    }
}

/// A tool server reached over HTTP.
pub struct McpHttpServer {
    name: String,
    url: String,
    headers: HashMap<String, String>,
    auth_token: Option<String>,
    client: reqwest::Client,
    request_id: AtomicU64,
    initialized: OnceCell<()>,
}

impl McpHttpServer {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: name.into(),
            url: url.into(),
            headers: HashMap::new(),
            auth_token: None,
            client,
            request_id: AtomicU64::new(1),
            initialized: OnceCell::new(),
        }
    }

    pub fn from_config(config: &ToolServerConfig) -> Self {
        let mut server = Self::new(&config.name, &config.url);
        server.headers = config.headers.clone();
        match &config.auth_token {
            Some(token) => server.with_auth_token(token),
            None => server,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// POST one JSON-RPC request and decode the envelope.
    async fn send(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, ToolError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.request_id.fetch_add(1, Ordering::SeqCst),
            method,
            params,
        };

        let mut builder = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json");
        for (key, value) in &self.headers {
            builder = builder.header(key, value);
        }
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .json(&request)
            .send()
            .await
            .map_err(|e| ToolError::Transport(format!("{}: {e}", self.name)))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ToolError::AuthRequired {
                tool_name: method.to_string(),
                message: format!("{} requires authorization", self.name),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Transport(format!(
                "{} returned HTTP {}: {}",
                self.name,
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ToolError::Transport(format!("{}: failed to read body: {e}", self.name)))?;

        serde_json::from_str::<JsonRpcResponse>(&text)
            .map_err(|e| ToolError::Protocol(format!("{}: invalid JSON-RPC response: {e}", self.name)))
    }

    /// Run the `initialize` handshake once. Failures are tolerated.
    async fn ensure_initialized(&self) {
        self.initialized
            .get_or_init(|| async {
                let params = serde_json::json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {
                        "name": "shopwire",
                        "version": env!("CARGO_PKG_VERSION")
                    }
                });
                match self.send("initialize", Some(params)).await {
                    Ok(resp) if resp.error.is_none() => {
                        debug!(server = %self.name, "Tool server initialized");
                    }
                    Ok(resp) => {
                        debug!(server = %self.name, error = ?resp.error, "Initialize rejected, continuing");
                    }
                    Err(e) => {
                        debug!(server = %self.name, error = %e, "Initialize failed, continuing");
                    }
                }
            })
            .await;
    }
}

#[async_trait]
impl ToolServer for McpHttpServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        self.ensure_initialized().await;
        let response = self.send("tools/list", None).await?;

        if let Some(error) = response.error {
            return Err(ToolError::Protocol(format!(
                "{}: tools/list failed: [{}] {}",
                self.name, error.code, error.message
            )));
        }

        let tools = response
            .result
            .as_ref()
            .and_then(|r| r.get("tools"))
            .and_then(|t| t.as_array())
            .cloned()
            .unwrap_or_default();

        let mut descriptors = Vec::with_capacity(tools.len());
        for tool in tools {
            match serde_json::from_value::<ToolDescriptor>(tool) {
                Ok(desc) if !desc.name.is_empty() => descriptors.push(desc),
                Ok(_) => warn!(server = %self.name, "Skipping tool with empty name"),
                Err(e) => warn!(server = %self.name, error = %e, "Skipping malformed tool descriptor"),
            }
        }
        Ok(descriptors)
    }

    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, ToolError> {
        self.ensure_initialized().await;
        let params = serde_json::json!({
            "name": tool,
            "arguments": arguments,
        });

        let response = match self.send("tools/call", Some(params)).await {
            Err(ToolError::AuthRequired { message, .. }) => {
                return Err(ToolError::AuthRequired {
                    tool_name: tool.to_string(),
                    message,
                });
            }
            other => other?,
        };

        if let Some(error) = response.error {
            if error.is_auth_required() {
                return Err(ToolError::AuthRequired {
                    tool_name: tool.to_string(),
                    message: error.message,
                });
            }
            return Err(ToolError::ExecutionFailed {
                tool_name: tool.to_string(),
                reason: format!("[{}] {}", error.code, error.message),
            });
        }

        let result = response.result.unwrap_or(Value::Null);
        if result.get("isError").and_then(|v| v.as_bool()) == Some(true) {
            return Err(ToolError::ExecutionFailed {
                tool_name: tool.to_string(),
                reason: crate::invoker::normalize_content(&result),
            });
        }
        Ok(result)
    }
}
