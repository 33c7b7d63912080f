//! Persistence for the knowledge item working set.
//!
//! Stores are whole-collection: `save` writes the full set, `load` reads it
//! back in the same order. Unreadable stored state loads as an empty set.

mod json;
mod sqlite;

pub use json::JsonFileStore;
pub use sqlite::SqliteStore;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, StoreKind};
use crate::error::Result;
use crate::models::KnowledgeItem;

#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Read the stored collection; missing or malformed state yields `[]`.
    async fn load(&self) -> Result<Vec<KnowledgeItem>>;

    /// Replace the stored collection.
    async fn save(&self, items: &[KnowledgeItem]) -> Result<()>;
}

/// Open the configured store, running migrations where needed.
pub async fn open_store(config: &Config) -> Result<Arc<dyn ItemStore>> {
    let store: Arc<dyn ItemStore> = match config.mindorbit.store {
        StoreKind::Json => Arc::new(JsonFileStore::new(config.data_path())),
        StoreKind::Sqlite => Arc::new(SqliteStore::open(config.data_path()).await?),
    };
    log::info!("Using {} store at {}", store.name(), config.data_path().display());
    Ok(store)
}
