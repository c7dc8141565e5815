//! Tool Invoker: one call in, one normalized `ToolResult` out.
//!
//! Remote failures never escape as errors. They become error results the
//! model can read, with authorization failures kept distinguishable so the
//! caller can be asked to sign in.

use serde_json::Value;
use shopwire_core::provider::ToolDefinition;
use shopwire_core::tool::{ToolCall, ToolResult};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::catalog::ToolCatalog;
use crate::products::{ProductExtractor, ProductSummary};

/// Flatten a raw tool payload into model-readable text.
///
/// A list of typed content blocks yields its text blocks joined by newlines;
/// non-text blocks are dropped. Anything else is stringified.
pub fn normalize_content(raw: &Value) -> String {
    let blocks = match raw {
        Value::Array(items) => Some(items),
        Value::Object(map) => map.get("content").and_then(|c| c.as_array()),
        _ => None,
    };

    if let Some(blocks) = blocks.filter(|b| b.iter().all(|item| item.get("type").is_some())) {
        return blocks
            .iter()
            .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("\n");
    }

    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The outcome of one invocation, with any product side payload.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub result: ToolResult,
    pub products: Vec<ProductSummary>,
}

/// Dispatches calls against a resolved catalog.
#[derive(Clone)]
pub struct ToolInvoker {
    catalog: Arc<ToolCatalog>,
    products: ProductExtractor,
}

impl ToolInvoker {
    pub fn new(catalog: Arc<ToolCatalog>, products: ProductExtractor) -> Self {
        Self { catalog, products }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.catalog.definitions()
    }

    /// Perform `call` and normalize the outcome.
    pub async fn invoke(&self, call: &ToolCall) -> ToolInvocation {
        debug!(tool = %call.name, call_id = %call.id, "Invoking tool");

        match self.catalog.call(&call.name, call.arguments.clone()).await {
            Ok(raw) => ToolInvocation {
                products: self.products.extract(&call.name, &raw),
                result: ToolResult::success(&call.id, normalize_content(&raw)),
            },
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool call failed");
                ToolInvocation {
                    result: ToolResult::from_error(&call.id, &e),
                    products: Vec::new(),
                }
            }
        }
    }
}
