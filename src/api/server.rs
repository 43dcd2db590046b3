// API server implementation using actix-web

use crate::api::{auth, middleware, routes};
use crate::config::ServerConfig;
use crate::sidecar::SidecarSupervisor;
use crate::sync::SyncRunner;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;

/// Shared handler state.
pub struct AppState {
    pub runner: Arc<SyncRunner>,
    pub sidecar: Option<Arc<SidecarSupervisor>>,
    pub started: Instant,
}

pub struct ApiServer {
    config: ServerConfig,
}

impl ApiServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Start the HTTP server and block until it shuts down.
    pub async fn run(
        self,
        runner: Arc<SyncRunner>,
        sidecar: Option<Arc<SidecarSupervisor>>,
    ) -> Result<()> {
        let bind_addr = format!("{}:{}", self.config.host, self.config.port);

        tracing::info!(
            host = %self.config.host,
            port = %self.config.port,
            auth = self.config.api_secret.is_some(),
            sidecar = sidecar.is_some(),
            "Starting catalog sync API server"
        );
        if self.config.api_secret.is_none() {
            tracing::warn!("API_SECRET is not set; sync endpoints are unauthenticated");
        }

        let state = web::Data::new(AppState {
            runner,
            sidecar,
            started: Instant::now(),
        });
        let api_secret = self.config.api_secret.clone();
        let allowed_origins = self.config.allowed_origins.clone();

        HttpServer::new(move || {
            let (logger, compress) = middleware::setup_middleware();
            let cors = middleware::setup_cors(&allowed_origins);
            let auth = auth::Auth::new(api_secret.clone());

            App::new()
                .app_data(state.clone())
                .wrap(auth)
                .wrap(cors)
                .wrap(compress)
                .wrap(logger)
                .configure(routes::configure_routes)
        })
        .bind(&bind_addr)
        .with_context(|| format!("Failed to bind to {}", bind_addr))?
        .run()
        .await
        .context("HTTP server error")?;

        Ok(())
    }
}
