//! # Shopwire Core
//!
//! Domain types, traits, and error definitions for the shopwire conversation
//! orchestrator. Every collaborator (completion service, tool servers, message
//! store) is a trait here; implementations live in their own crates.

pub mod error;
pub mod message;
pub mod persona;
pub mod provider;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, StoreError, ToolError};
pub use message::{ConversationId, Message, MessageToolCall, Role};
pub use persona::PersonaSet;
pub use provider::{
    ChunkReceiver, Provider, ProviderRequest, StreamChunk, ToolCallDelta, ToolDefinition, Usage,
};
pub use store::{MessageStore, StoredContent, StoredMessage};
pub use tool::{ToolCall, ToolDescriptor, ToolErrorKind, ToolResult, ToolServer};
