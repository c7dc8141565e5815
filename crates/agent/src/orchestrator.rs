//! The orchestrator: process-wide wiring for every conversation.
//!
//! Holds the shared collaborators (completion adapter, history, catalog
//! cache) and serializes turns per conversation. Turns of different
//! conversations run concurrently.

use serde::{Deserialize, Serialize};
use shopwire_config::AppConfig;
use shopwire_core::message::ConversationId;
use shopwire_core::store::{MessageStore, StoredMessage};
use shopwire_core::tool::ToolDescriptor;
use shopwire_core::error::StoreError;
use shopwire_tools::{CatalogCache, ProductExtractor, ToolInvoker, bindings_from_config};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::completion::CompletionAdapter;
use crate::history::HistoryManager;
use crate::loop_runner::{ConversationLoop, TurnInput};
use crate::multiplexer::{self, TurnStream};
use crate::stream_event::StreamEvent;

/// Buffered events per turn before the loop waits on the reader.
const EVENT_BUFFER: usize = 64;

/// A chat request as the caller sends it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Continue this conversation; a new one is started when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,

    /// The user's message
    pub message: String,

    /// Persona selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_type: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_conversation(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn with_prompt_type(mut self, prompt_type: impl Into<String>) -> Self {
        self.prompt_type = Some(prompt_type.into());
        self
    }
}

/// Entry point for chat turns.
pub struct Orchestrator {
    conversation_loop: ConversationLoop,
    history: Arc<HistoryManager>,
    catalogs: CatalogCache,
    products: ProductExtractor,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(
        adapter: CompletionAdapter,
        store: Arc<dyn MessageStore>,
        catalogs: CatalogCache,
        products: ProductExtractor,
        history_window: usize,
        max_iterations: usize,
    ) -> Self {
        let history = Arc::new(HistoryManager::new(store, history_window));
        let conversation_loop = ConversationLoop::new(Arc::new(adapter), history.clone())
            .with_max_iterations(max_iterations);
        Self {
            conversation_loop,
            history,
            catalogs,
            products,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Wire every collaborator from configuration.
    pub async fn from_config(config: &AppConfig) -> Result<Self, shopwire_core::Error> {
        let router = shopwire_providers::build_from_config(config);
        let provider = router.default_provider()?;

        let mut adapter = CompletionAdapter::new(provider, &config.default_model)
            .with_temperature(config.default_temperature)
            .with_personas(config.personas.to_persona_set());
        if config.default_max_tokens > 0 {
            adapter = adapter.with_max_tokens(config.default_max_tokens);
        }

        let store = shopwire_store::open_store(&config.store).await?;
        let catalogs = CatalogCache::new(
            bindings_from_config(&config.tool_servers),
            config.agent.catalog_cache_size,
        );
        let products = ProductExtractor::new(
            config.agent.product_tools.clone(),
            config.agent.max_products,
        );

        info!(
            provider = adapter.provider_name(),
            model = adapter.model(),
            store = store.name(),
            tool_servers = config.tool_servers.len(),
            "Orchestrator ready"
        );

        Ok(Self::new(
            adapter,
            store,
            catalogs,
            products,
            config.agent.history_window,
            config.agent.max_iterations,
        ))
    }

    /// Start a turn and return its event stream.
    ///
    /// The first event is always `id`. Cancelling `cancel` (or dropping the
    /// stream) stops the turn without further events or writes.
    pub fn start_turn(self: &Arc<Self>, request: ChatRequest, cancel: CancellationToken) -> TurnStream {
        let conversation_id = request
            .conversation_id
            .filter(|id| !id.trim().is_empty())
            .map(ConversationId)
            .unwrap_or_else(ConversationId::generate);
        let (mut sink, stream) = multiplexer::channel(EVENT_BUFFER);
        let this = Arc::clone(self);

        tokio::spawn(async move {
            let id_event = StreamEvent::Id {
                conversation_id: conversation_id.0.clone(),
            };
            if sink.emit(id_event).await.is_err() {
                return;
            }
            if request.message.trim().is_empty() {
                sink.fail("message must not be empty").await;
                return;
            }

            let lock = this.conversation_lock(&conversation_id);
            let _turn_guard = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                guard = lock.lock_owned() => guard,
            };
            let catalog = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                catalog = this.catalogs.get_or_resolve(&conversation_id) => catalog,
            };

            let invoker = ToolInvoker::new(catalog, this.products.clone());
            let input = TurnInput {
                conversation_id,
                message: request.message,
                persona: request.prompt_type,
            };
            this.conversation_loop.run(input, invoker, sink, cancel).await;
        });

        stream
    }

    /// The lock serializing turns of one conversation. Idle entries are
    /// pruned whenever a new lock is handed out.
    fn conversation_lock(&self, id: &ConversationId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(id.0.clone())
            .or_insert_with(|| {
                debug!(conversation_id = %id, "New conversation lock");
                Arc::new(tokio::sync::Mutex::new(()))
            })
            .clone()
    }

    /// Every stored message of a conversation, oldest first.
    pub async fn history(&self, conversation_id: &ConversationId) -> Result<Vec<StoredMessage>, StoreError> {
        self.history.list(conversation_id).await
    }

    /// The tools a fresh conversation would see.
    pub async fn tools(&self) -> Vec<ToolDescriptor> {
        self.catalogs.resolve_fresh().await.descriptors()
    }

    /// Wait for queued history writes.
    pub async fn flush(&self) {
        self.history.flush().await;
    }

    pub fn store_name(&self) -> &str {
        self.history.store_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeToolServer, ScriptedProvider, catalog_payload, text_turn, tool_turn};
    use shopwire_core::message::Role;
    use shopwire_store::InMemoryStore;
    use shopwire_tools::ServerBinding;
    use std::time::Duration;

    fn orchestrator(provider: ScriptedProvider, server: FakeToolServer) -> (Arc<Orchestrator>, Arc<ScriptedProvider>) {
        let provider = Arc::new(provider);
        let adapter = CompletionAdapter::new(provider.clone(), "mock-model");
        let catalogs = CatalogCache::new(vec![ServerBinding::new(Arc::new(server))], 16);
        let products = ProductExtractor::new(vec!["search_shop_catalog".into()], 3);
        let orch = Orchestrator::new(adapter, Arc::new(InMemoryStore::new()), catalogs, products, 4, 10);
        (Arc::new(orch), provider)
    }

    #[tokio::test]
    async fn new_conversation_announces_generated_id() {
        let (orch, _) = orchestrator(
            ScriptedProvider::new(vec![text_turn(&["Hi there"])]),
            FakeToolServer::new(&[]),
        );
        let events = orch
            .start_turn(ChatRequest::new("hello"), CancellationToken::new())
            .collect_events()
            .await;

        let StreamEvent::Id { conversation_id } = &events[0] else {
            panic!("first event must be id, got {:?}", events[0]);
        };
        assert!(!conversation_id.is_empty());
        assert_eq!(events.last().unwrap().event_type(), "end_turn");

        let rows = orch.history(&ConversationId::from(conversation_id)).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn supplied_id_is_echoed() {
        let (orch, _) = orchestrator(
            ScriptedProvider::new(vec![text_turn(&["ok"])]),
            FakeToolServer::new(&[]),
        );
        let events = orch
            .start_turn(ChatRequest::new("hello").with_conversation("conv-42"), CancellationToken::new())
            .collect_events()
            .await;
        assert!(matches!(&events[0], StreamEvent::Id { conversation_id } if conversation_id == "conv-42"));
    }

    #[tokio::test]
    async fn empty_message_fails_after_id() {
        let (orch, provider) = orchestrator(ScriptedProvider::new(vec![]), FakeToolServer::new(&[]));
        let events = orch
            .start_turn(ChatRequest::new("   "), CancellationToken::new())
            .collect_events()
            .await;
        let names: Vec<_> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(names, vec!["id", "error"]);
        assert_eq!(provider.request_count(), 0);
    }

    #[tokio::test]
    async fn red_shoes_flow() {
        let (orch, _) = orchestrator(
            ScriptedProvider::new(vec![
                tool_turn(&[("call_1", "search_shop_catalog", r#"{"query":"red shoes"}"#)]),
                text_turn(&["Here you go"]),
            ]),
            FakeToolServer::new(&["search_shop_catalog"])
                .respond("search_shop_catalog", Ok(catalog_payload(&["Red Runner"]))),
        );
        let events = orch
            .start_turn(
                ChatRequest::new("show me red shoes").with_conversation("shoes"),
                CancellationToken::new(),
            )
            .collect_events()
            .await;
        let names: Vec<_> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(
            names,
            vec![
                "id",
                "message_complete",
                "tool_use",
                "new_message",
                "chunk",
                "message_complete",
                "product_results",
                "end_turn"
            ]
        );

        let rows = orch.history(&ConversationId::from("shoes")).await.unwrap();
        let roles: Vec<Role> = rows.iter().map(|r| r.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
    }

    #[tokio::test]
    async fn turns_of_one_conversation_are_serialized() {
        let (orch, provider) = orchestrator(
            ScriptedProvider::new(vec![text_turn(&["first"]), text_turn(&["second"])]),
            FakeToolServer::new(&[]),
        );
        let a = orch.start_turn(ChatRequest::new("one").with_conversation("same"), CancellationToken::new());
        let b = orch.start_turn(ChatRequest::new("two").with_conversation("same"), CancellationToken::new());
        let (ea, eb) = tokio::join!(a.collect_events(), b.collect_events());
        assert_eq!(ea.last().unwrap().event_type(), "end_turn");
        assert_eq!(eb.last().unwrap().event_type(), "end_turn");

        // Whichever ran second replayed the other's exchange.
        let requests = provider.requests.lock().unwrap();
        let non_system = |i: usize| {
            requests[i]
                .messages
                .iter()
                .filter(|m| m.role != Role::System)
                .count()
        };
        assert_eq!(non_system(0), 1);
        assert_eq!(non_system(1), 3);
    }

    #[tokio::test]
    async fn cancelled_before_start_only_announces_id() {
        let (orch, provider) = orchestrator(
            ScriptedProvider::new(vec![text_turn(&["never"])]),
            FakeToolServer::new(&[]),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let events = tokio::time::timeout(
            Duration::from_secs(5),
            orch.start_turn(ChatRequest::new("hi").with_conversation("gone"), cancel)
                .collect_events(),
        )
        .await
        .unwrap();
        let names: Vec<_> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(names, vec!["id"]);
        assert_eq!(provider.request_count(), 0);
        assert!(orch.history(&ConversationId::from("gone")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tools_lists_fresh_catalog() {
        let (orch, _) = orchestrator(
            ScriptedProvider::new(vec![]),
            FakeToolServer::new(&["search_shop_catalog", "get_cart"]),
        );
        let names: Vec<String> = orch.tools().await.into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["search_shop_catalog", "get_cart"]);
    }
}
