// Local data store backends the sync job writes into

pub mod pocketbase;
pub mod sqlite;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::sync::error::SyncError;
use crate::sync::item::CatalogItem;

pub use pocketbase::{PocketBaseAuth, PocketBaseConfig, PocketBaseStore};
pub use sqlite::SqliteStore;

/// What a store knows about an existing catalog record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredItem {
    pub id: String,
    pub sku: String,
    /// Absent for records written by something other than the sync job.
    pub content_hash: Option<String>,
    pub active: bool,
}

/// Existing records keyed by SKU.
pub type StoreIndex = HashMap<String, StoredItem>;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Human-readable target, for logs.
    fn describe(&self) -> String;

    async fn load_index(&self) -> Result<StoreIndex, SyncError>;

    /// Create a record for `item`. Must be safe to repeat for the same SKU.
    async fn create(&self, item: &CatalogItem, content_hash: &str) -> Result<(), SyncError>;

    async fn update(
        &self,
        existing: &StoredItem,
        item: &CatalogItem,
        content_hash: &str,
    ) -> Result<(), SyncError>;

    async fn deactivate(&self, existing: &StoredItem) -> Result<(), SyncError>;
}
