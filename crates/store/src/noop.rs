//! No-op store - disables persistence entirely.

use async_trait::async_trait;
use shopwire_core::error::StoreError;
use shopwire_core::message::ConversationId;
use shopwire_core::store::{MessageStore, StoredMessage};

/// A store that keeps nothing. Every conversation replays as empty.
pub struct NoopStore;

#[async_trait]
impl MessageStore for NoopStore {
    fn name(&self) -> &str {
        "none"
    }

    async fn append(&self, _conversation_id: &ConversationId, _message: StoredMessage) -> Result<(), StoreError> {
        Ok(())
    }

    async fn list(&self, _conversation_id: &ConversationId) -> Result<Vec<StoredMessage>, StoreError> {
        Ok(Vec::new())
    }
}
