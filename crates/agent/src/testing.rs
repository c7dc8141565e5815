//! Scripted collaborators shared by the agent's unit tests.

use async_trait::async_trait;
use serde_json::Value;
use shopwire_core::error::{ProviderError, ToolError};
use shopwire_core::provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk, ToolCallDelta};
use shopwire_core::tool::{ToolDescriptor, ToolServer};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::mpsc;

pub type Script = Vec<Result<StreamChunk, ProviderError>>;

/// A text-only round split into the given deltas.
pub fn text_turn(parts: &[&str]) -> Script {
    let mut script: Script = parts.iter().map(|p| Ok(StreamChunk::text(*p))).collect();
    script.push(Ok(StreamChunk::finish("stop")));
    script
}

/// A round requesting the given `(id, name, arguments)` calls. Arguments are
/// split in two fragments to exercise reassembly.
pub fn tool_turn(calls: &[(&str, &str, &str)]) -> Script {
    let mut script = Script::new();
    for (index, (id, name, args)) in calls.iter().enumerate() {
        let index = index as u32;
        let mid = args.char_indices().nth(args.chars().count() / 2).map_or(0, |(i, _)| i);
        script.push(Ok(StreamChunk::tool_call(ToolCallDelta {
            index,
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            arguments: Some(args[..mid].to_string()),
        })));
        script.push(Ok(StreamChunk::tool_call(ToolCallDelta {
            index,
            arguments: Some(args[mid..].to_string()),
            ..Default::default()
        })));
    }
    script.push(Ok(StreamChunk::finish("tool_calls")));
    script
}

/// A provider replaying canned rounds in order.
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    refuse: Option<ProviderError>,
    repeat_last: bool,
    pub requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            refuse: None,
            repeat_last: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replays the last script forever once the others are used up.
    pub fn repeating(scripts: Vec<Script>) -> Self {
        Self {
            repeat_last: true,
            ..Self::new(scripts)
        }
    }

    pub fn refusing(err: ProviderError) -> Self {
        Self {
            refuse: Some(err),
            ..Self::new(vec![])
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        if let Some(err) = &self.refuse {
            return Err(err.clone());
        }

        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            if self.repeat_last && scripts.len() == 1 {
                scripts.front().cloned()
            } else {
                scripts.pop_front()
            }
        }
        .unwrap_or_else(|| text_turn(&["(no script)"]));

        let (tx, rx) = mpsc::channel(script.len() + 1);
        for item in script {
            tx.try_send(item).unwrap();
        }
        Ok(rx)
    }
}

/// A tool server with canned per-tool responses.
pub struct FakeToolServer {
    tools: Vec<String>,
    responses: HashMap<String, Result<Value, ToolError>>,
    pub calls: Mutex<Vec<(String, Value)>>,
}

impl FakeToolServer {
    pub fn new(tools: &[&str]) -> Self {
        Self {
            tools: tools.iter().map(|t| t.to_string()).collect(),
            responses: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(mut self, tool: &str, response: Result<Value, ToolError>) -> Self {
        self.responses.insert(tool.to_string(), response);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ToolServer for FakeToolServer {
    fn name(&self) -> &str {
        "fake"
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        Ok(self
            .tools
            .iter()
            .map(|name| ToolDescriptor {
                name: name.clone(),
                description: format!("{name} tool"),
                input_schema: serde_json::json!({ "type": "object", "properties": {} }),
            })
            .collect())
    }

    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, ToolError> {
        self.calls.lock().unwrap().push((tool.to_string(), arguments));
        self.responses.get(tool).cloned().unwrap_or_else(|| {
            Ok(serde_json::json!({ "content": [{ "type": "text", "text": "ok" }] }))
        })
    }
}

/// A catalog search payload shaped like a storefront server's reply.
pub fn catalog_payload(titles: &[&str]) -> Value {
    let products: Vec<Value> = titles
        .iter()
        .enumerate()
        .map(|(i, title)| {
            serde_json::json!({
                "product_id": format!("gid://shopify/Product/{}", i + 1),
                "title": title,
                "price_range": { "min": "49.0", "currency": "USD" },
                "image_url": format!("https://cdn.example.com/{}.png", i + 1),
                "url": format!("https://shop.example.com/products/{}", i + 1),
            })
        })
        .collect();
    let body = serde_json::json!({ "products": products }).to_string();
    serde_json::json!({ "content": [{ "type": "text", "text": body }] })
}
