// HTTP trigger for the catalog sync job, plus sidecar status/control

pub mod auth;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{ApiServer, AppState};
