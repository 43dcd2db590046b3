// External catalog sources

pub mod file;
pub mod http;

use async_trait::async_trait;

use crate::sync::error::SyncError;
use crate::sync::item::CatalogItem;

pub use file::FileCatalogSource;
pub use http::{HttpCatalogSource, HttpSourceConfig};

#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Human-readable origin, for logs.
    fn describe(&self) -> String;

    /// Fetch the complete current catalog.
    async fn fetch_items(&self) -> Result<Vec<CatalogItem>, SyncError>;
}
