//! The resolved tool catalog.
//!
//! Catalogs from every configured server are concatenated into one name →
//! server map. Resolution happens once per conversation; a server that cannot
//! list its tools is skipped so one outage does not take the others down.

use serde_json::Value;
use shopwire_config::ToolServerConfig;
use shopwire_core::error::ToolError;
use shopwire_core::provider::ToolDefinition;
use shopwire_core::tool::{ToolDescriptor, ToolServer};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::mcp_client::McpHttpServer;

/// A server together with the subset of its tools we expose.
#[derive(Clone)]
pub struct ServerBinding {
    pub server: Arc<dyn ToolServer>,
    /// Only these names are taken from the server (all when `None`)
    pub allowed_tools: Option<Vec<String>>,
}

impl ServerBinding {
    pub fn new(server: Arc<dyn ToolServer>) -> Self {
        Self {
            server,
            allowed_tools: None,
        }
    }

    pub fn with_allowed_tools(mut self, tools: Vec<String>) -> Self {
        self.allowed_tools = Some(tools);
        self
    }

    fn allows(&self, name: &str) -> bool {
        self.allowed_tools
            .as_ref()
            .is_none_or(|allowed| allowed.iter().any(|a| a == name))
    }
}

/// Build HTTP bindings for every configured tool server, in config order.
pub fn bindings_from_config(servers: &[ToolServerConfig]) -> Vec<ServerBinding> {
    servers
        .iter()
        .map(|cfg| ServerBinding {
            server: Arc::new(McpHttpServer::from_config(cfg)),
            allowed_tools: cfg.allowed_tools.clone(),
        })
        .collect()
}

struct CatalogEntry {
    descriptor: ToolDescriptor,
    server: Arc<dyn ToolServer>,
}

/// Name → server dispatch table for one conversation.
#[derive(Default)]
pub struct ToolCatalog {
    entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
}

impl ToolCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Query every server and concatenate their catalogs.
    ///
    /// When two servers advertise the same name the earlier one wins.
    pub async fn resolve(bindings: &[ServerBinding]) -> Self {
        let mut catalog = Self::empty();

        for binding in bindings {
            let server_name = binding.server.name().to_string();
            let tools = match binding.server.list_tools().await {
                Ok(tools) => tools,
                Err(e) => {
                    warn!(server = %server_name, error = %e, "Tool server unavailable, skipping");
                    continue;
                }
            };

            for descriptor in tools {
                if !binding.allows(&descriptor.name) {
                    debug!(server = %server_name, tool = %descriptor.name, "Tool filtered out");
                    continue;
                }
                if catalog.index.contains_key(&descriptor.name) {
                    warn!(
                        server = %server_name,
                        tool = %descriptor.name,
                        "Duplicate tool name, keeping the earlier server's"
                    );
                    continue;
                }
                catalog
                    .index
                    .insert(descriptor.name.clone(), catalog.entries.len());
                catalog.entries.push(CatalogEntry {
                    descriptor,
                    server: binding.server.clone(),
                });
            }
        }

        info!(tools = catalog.len(), servers = bindings.len(), "Tool catalog resolved");
        catalog
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Descriptors in resolution order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.entries.iter().map(|e| e.descriptor.clone()).collect()
    }

    /// Tool schemas to advertise to the completion service.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.entries.iter().map(|e| e.descriptor.to_definition()).collect()
    }

    /// Dispatch a call to whichever server owns `name`.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        let idx = self
            .index
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        self.entries[*idx].server.call_tool(name, arguments).await
    }
}
