//! History Manager.
//!
//! Writes go through a single background writer so they land in the order
//! they were issued without making the turn wait on the store. Reads rebuild
//! a short replay window of plain user and assistant text.

use shopwire_core::error::StoreError;
use shopwire_core::message::{ConversationId, Message, Role};
use shopwire_core::store::{MessageStore, StoredMessage};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

enum WriteOp {
    Append(ConversationId, StoredMessage),
    Flush(oneshot::Sender<()>),
}

/// Persistence front-end for the conversation loop.
pub struct HistoryManager {
    store: Arc<dyn MessageStore>,
    writer: mpsc::UnboundedSender<WriteOp>,
    window: usize,
}

impl HistoryManager {
    /// Create the manager and spawn its writer. Must be called inside a
    /// tokio runtime.
    pub fn new(store: Arc<dyn MessageStore>, window: usize) -> Self {
        let (writer, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(store.clone(), rx));
        Self {
            store,
            writer,
            window: window.max(1),
        }
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    /// Queue `message` for persistence. Never blocks and never fails the
    /// caller; store errors are logged by the writer.
    pub fn append(&self, conversation_id: &ConversationId, message: &Message) {
        let op = WriteOp::Append(conversation_id.clone(), StoredMessage::from_message(message));
        if self.writer.send(op).is_err() {
            warn!(conversation_id = %conversation_id, "History writer is gone, message dropped");
        }
    }

    /// Wait until every write queued before this call has been attempted.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.writer.send(WriteOp::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// The replay window for a new turn.
    ///
    /// Pending writes are flushed first. A failed read yields an empty
    /// history rather than failing the turn.
    pub async fn load_truncated(&self, conversation_id: &ConversationId) -> Vec<Message> {
        self.flush().await;
        match self.store.list(conversation_id).await {
            Ok(rows) => {
                let history = truncate(&rows, self.window);
                debug!(
                    conversation_id = %conversation_id,
                    stored = rows.len(),
                    replayed = history.len(),
                    "Loaded conversation history"
                );
                history
            }
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "History load failed, starting empty");
                Vec::new()
            }
        }
    }

    /// Every stored message of a conversation, oldest first.
    pub async fn list(&self, conversation_id: &ConversationId) -> Result<Vec<StoredMessage>, StoreError> {
        self.flush().await;
        self.store.list(conversation_id).await
    }
}

async fn run_writer(store: Arc<dyn MessageStore>, mut rx: mpsc::UnboundedReceiver<WriteOp>) {
    while let Some(op) = rx.recv().await {
        match op {
            WriteOp::Append(conversation_id, message) => {
                if let Err(e) = store.append(&conversation_id, message).await {
                    warn!(
                        conversation_id = %conversation_id,
                        store = store.name(),
                        error = %e,
                        "Failed to persist message"
                    );
                }
            }
            WriteOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("History writer stopped");
}

/// Reduce stored rows to the last `window` plain user/assistant messages.
///
/// System and tool rows are dropped, as are assistant rows that only carry
/// tool calls and user rows that echo tool results. Assistant rows that mix
/// text and tool calls keep just their text.
pub fn truncate(rows: &[StoredMessage], window: usize) -> Vec<Message> {
    let kept: Vec<Message> = rows
        .iter()
        .filter(|row| match row.role {
            Role::User => !row.is_tool_result_echo(),
            Role::Assistant => !row.is_tool_call_only(),
            Role::System | Role::Tool => false,
        })
        .map(|row| {
            let mut message = match row.role {
                Role::User => Message::user(row.content.to_text()),
                _ => Message::assistant(row.content.to_text()),
            };
            message.timestamp = row.created_at;
            message
        })
        .collect();

    let skip = kept.len().saturating_sub(window);
    kept.into_iter().skip(skip).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shopwire_core::message::MessageToolCall;
    use shopwire_core::store::StoredContent;
    use shopwire_store::InMemoryStore;

    fn conv() -> ConversationId {
        ConversationId::from("c-1")
    }

    fn tool_call_message(text: &str) -> Message {
        let mut m = Message::assistant(text);
        m.tool_calls.push(MessageToolCall {
            id: "call_1".into(),
            name: "search_shop_catalog".into(),
            arguments: "{}".into(),
        });
        m
    }

    #[tokio::test]
    async fn writes_land_in_issue_order() {
        let store = Arc::new(InMemoryStore::new());
        let history = HistoryManager::new(store.clone(), 4);

        for i in 0..20 {
            history.append(&conv(), &Message::user(format!("m{i}")));
        }
        history.flush().await;

        let rows = store.list(&conv()).await.unwrap();
        let texts: Vec<String> = rows.iter().map(|r| r.content.to_text()).collect();
        let expected: Vec<String> = (0..20).map(|i| format!("m{i}")).collect();
        assert_eq!(texts, expected);
    }

    #[tokio::test]
    async fn load_keeps_last_window_of_plain_text() {
        let store = Arc::new(InMemoryStore::new());
        let history = HistoryManager::new(store, 4);

        history.append(&conv(), &Message::user("u1"));
        history.append(&conv(), &tool_call_message(""));
        history.append(&conv(), &Message::tool_result("call_1", "3 products", false));
        history.append(&conv(), &Message::assistant("a1"));
        history.append(&conv(), &Message::user("u2"));
        history.append(&conv(), &Message::assistant("a2"));
        history.append(&conv(), &Message::user("u3"));
        history.append(&conv(), &Message::assistant("a3"));

        let loaded = history.load_truncated(&conv()).await;
        let texts: Vec<&str> = loaded.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, vec!["u2", "a2", "u3", "a3"]);
        assert!(loaded.iter().all(|m| !m.has_tool_calls()));
    }

    #[tokio::test]
    async fn repeated_loads_agree() {
        let history = HistoryManager::new(Arc::new(InMemoryStore::new()), 4);
        for i in 0..3 {
            history.append(&conv(), &Message::user(format!("u{i}")));
            history.append(&conv(), &tool_call_message(""));
            history.append(&conv(), &Message::assistant(format!("a{i}")));
        }

        let view = |messages: Vec<Message>| -> Vec<(Role, String, chrono::DateTime<chrono::Utc>)> {
            messages
                .into_iter()
                .map(|m| (m.role, m.content, m.timestamp))
                .collect()
        };
        let first = view(history.load_truncated(&conv()).await);
        let second = view(history.load_truncated(&conv()).await);
        assert_eq!(first.len(), 4);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn unknown_conversation_loads_empty() {
        let history = HistoryManager::new(Arc::new(InMemoryStore::new()), 4);
        assert!(history.load_truncated(&ConversationId::from("nope")).await.is_empty());
    }

    #[test]
    fn truncate_drops_echoes_and_keeps_mixed_text() {
        let now = chrono::Utc::now();
        let rows = vec![
            StoredMessage {
                role: Role::User,
                content: StoredContent::Structured(serde_json::json!([
                    { "type": "tool_result", "tool_use_id": "call_1", "content": "ok" }
                ])),
                tool_call_id: None,
                created_at: now,
            },
            StoredMessage::from_message(&tool_call_message("Let me look that up")),
            StoredMessage {
                role: Role::System,
                content: StoredContent::Plain("persona".into()),
                tool_call_id: None,
                created_at: now,
            },
        ];

        let kept = truncate(&rows, 4);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].role, Role::Assistant);
        assert_eq!(kept[0].content, "Let me look that up");
    }

    struct BrokenStore;

    #[async_trait]
    impl MessageStore for BrokenStore {
        fn name(&self) -> &str {
            "broken"
        }

        async fn append(&self, _: &ConversationId, _: StoredMessage) -> Result<(), StoreError> {
            Err(StoreError::Storage("disk full".into()))
        }

        async fn list(&self, _: &ConversationId) -> Result<Vec<StoredMessage>, StoreError> {
            Err(StoreError::QueryFailed("locked".into()))
        }
    }

    #[tokio::test]
    async fn store_failures_are_absorbed() {
        let history = HistoryManager::new(Arc::new(BrokenStore), 4);
        history.append(&conv(), &Message::user("hi"));
        history.flush().await;
        assert!(history.load_truncated(&conv()).await.is_empty());
        assert!(history.list(&conv()).await.is_err());
    }
}
