//! Per-conversation catalog cache.
//!
//! A conversation resolves its tool catalog once and reuses it for every
//! later turn. The cache is bounded; the oldest conversation is evicted first.
//! An empty catalog from configured servers is not kept, so a conversation
//! whose servers were all down picks its tools up on the next turn.

use shopwire_core::message::ConversationId;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::catalog::{ServerBinding, ToolCatalog};

#[derive(Default)]
struct CacheInner {
    catalogs: HashMap<String, Arc<ToolCatalog>>,
    order: VecDeque<String>,
}

/// Bounded map of conversation id → resolved catalog.
pub struct CatalogCache {
    bindings: Vec<ServerBinding>,
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl CatalogCache {
    pub fn new(bindings: Vec<ServerBinding>, capacity: usize) -> Self {
        Self {
            bindings,
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// The catalog for `conversation_id`, resolving it on first use.
    pub async fn get_or_resolve(&self, conversation_id: &ConversationId) -> Arc<ToolCatalog> {
        if let Some(hit) = self.inner.lock().await.catalogs.get(conversation_id.as_str()) {
            return hit.clone();
        }

        // Resolve without holding the lock; servers may be slow.
        let catalog = Arc::new(ToolCatalog::resolve(&self.bindings).await);
        if catalog.is_empty() && !self.bindings.is_empty() {
            warn!(conversation_id = %conversation_id, "No tool server answered, catalog not cached");
            return catalog;
        }

        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.catalogs.get(conversation_id.as_str()) {
            return existing.clone();
        }
        while inner.order.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.catalogs.remove(&oldest);
                debug!(conversation_id = %oldest, "Evicted tool catalog");
            }
        }
        inner
            .catalogs
            .insert(conversation_id.0.clone(), catalog.clone());
        inner.order.push_back(conversation_id.0.clone());
        catalog
    }

    /// A freshly resolved catalog, not tied to any conversation.
    pub async fn resolve_fresh(&self) -> ToolCatalog {
        ToolCatalog::resolve(&self.bindings).await
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.catalogs.len()
    }
}
