//! Message store implementations for shopwire.

pub mod in_memory;
pub mod noop;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use noop::NoopStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use shopwire_config::StoreConfig;
use shopwire_core::error::StoreError;
use shopwire_core::store::MessageStore;
use std::sync::Arc;

/// Build the configured store backend.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn MessageStore>, StoreError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        "none" => Ok(Arc::new(NoopStore)),
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Arc::new(SqliteStore::open(&config.resolved_path()).await?)),
        other => Err(StoreError::Storage(format!("unsupported store backend '{other}'"))),
    }
}
