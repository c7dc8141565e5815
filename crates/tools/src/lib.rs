//! Remote tools for shopwire.
//!
//! Tools live on JSON-RPC servers. This crate resolves the catalog a
//! conversation may use, performs calls, normalizes their results and mines
//! catalog searches for product cards.

pub mod cache;
pub mod catalog;
pub mod invoker;
pub mod mcp_client;
pub mod products;

pub use cache::CatalogCache;
pub use catalog::{ServerBinding, ToolCatalog, bindings_from_config};
pub use invoker::{ToolInvocation, ToolInvoker, normalize_content};
pub use mcp_client::McpHttpServer;
pub use products::{ProductExtractor, ProductSummary};
