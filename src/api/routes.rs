// API route configuration

use crate::api::handlers;
use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check (no auth required)
        .route("/health", web::get().to(handlers::health_check))
        .route("/", web::get().to(handlers::health_check))
        .service(
            web::scope("/api")
                // GET and POST run the same job
                .service(
                    web::resource("/sync-catalog")
                        .route(web::get().to(handlers::sync_catalog))
                        .route(web::post().to(handlers::sync_catalog)),
                )
                .route(
                    "/sync-catalog/status",
                    web::get().to(handlers::sync_status),
                )
                .route("/sidecar/status", web::get().to(handlers::sidecar_status))
                .route("/sidecar/events", web::get().to(handlers::sidecar_events))
                .route(
                    "/sidecar/restart",
                    web::post().to(handlers::sidecar_restart),
                ),
        );
}
