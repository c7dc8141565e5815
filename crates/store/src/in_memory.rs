//! In-memory store - useful for testing and ephemeral deployments.

use async_trait::async_trait;
use shopwire_core::error::StoreError;
use shopwire_core::message::ConversationId;
use shopwire_core::store::{MessageStore, StoredMessage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keeps every conversation's messages in a map of Vecs.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    conversations: Arc<RwLock<HashMap<String, Vec<StoredMessage>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of conversations with at least one message.
    pub async fn conversation_count(&self) -> usize {
        self.conversations.read().await.len()
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn append(
        &self,
        conversation_id: &ConversationId,
        message: StoredMessage,
    ) -> Result<(), StoreError> {
        self.conversations
            .write()
            .await
            .entry(conversation_id.0.clone())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn list(&self, conversation_id: &ConversationId) -> Result<Vec<StoredMessage>, StoreError> {
        Ok(self
            .conversations
            .read()
            .await
            .get(conversation_id.as_str())
            .cloned()
            .unwrap_or_default())
    }
}
