//! Catalog sync service: pulls the upstream product catalog and reconciles it
//! into the local data store, behind an HTTP trigger, a CLI and a scheduler.

pub mod api;
pub mod config;
pub mod sidecar;
pub mod source;
pub mod store;
pub mod sync;
pub mod tracing;

pub mod util {
    pub mod env;
}

#[cfg(test)]
pub(crate) mod testing;
