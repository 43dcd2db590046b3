// Catalog reconciliation job

pub mod error;
pub mod item;
pub mod plan;
pub mod result;
pub mod runner;
pub mod scheduler;

pub use error::{ErrorKind, SyncError};
pub use item::CatalogItem;
pub use result::{ItemError, SyncResult};
pub use runner::{RunMode, SyncOptions, SyncRunner};
pub use scheduler::SyncScheduler;
