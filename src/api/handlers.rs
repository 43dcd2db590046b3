// HTTP request handlers for API endpoints

use actix_web::http::header::{self, ContentEncoding};
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use std::any::Any;
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info};

use crate::api::models::*;
use crate::api::server::AppState;
use crate::sync::{RunMode, SyncError, SyncResult};

/// Health check endpoint
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started.elapsed().as_secs(),
    })
}

/// Run one catalog sync and answer with its `SyncResult`. Mounted on both GET
/// and POST. The status code follows `success` alone: 200 or 500.
pub async fn sync_catalog(
    state: web::Data<AppState>,
    query: web::Query<SyncQuery>,
) -> HttpResponse {
    let mode = RunMode::from_dry_run(query.dry_run);
    info!(?mode, "catalog sync triggered over HTTP");

    // Spawned so a client disconnect cannot cancel the pass between writes.
    let runner = state.runner.clone();
    let job = tokio::spawn(async move { runner.run(mode).await });
    let result = match job.await {
        Ok(result) => result,
        Err(err) => {
            let msg = if err.is_panic() {
                format!("sync job panicked: {}", panic_message(&*err.into_panic()))
            } else {
                format!("sync job was cancelled: {err}")
            };
            error!(error = %msg, "catalog sync did not complete");
            SyncResult::failure(&SyncError::Unknown(msg))
        }
    };

    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    HttpResponse::build(status).json(result)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub async fn sync_status(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(SyncStatusResponse {
        running: state.runner.is_running(),
        last_result: state.runner.last_result().await,
    })
}

fn no_sidecar() -> HttpResponse {
    HttpResponse::NotFound().json(ApiError::new("no sidecar is configured"))
}

pub async fn sidecar_status(state: web::Data<AppState>) -> HttpResponse {
    match &state.sidecar {
        Some(sidecar) => HttpResponse::Ok().json(sidecar.status().await),
        None => no_sidecar(),
    }
}

/// Server-sent `sidecar-status` events, one per supervisor transition.
pub async fn sidecar_events(state: web::Data<AppState>) -> HttpResponse {
    let Some(sidecar) = &state.sidecar else {
        return no_sidecar();
    };
    let rx = sidecar.subscribe();
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let data = serde_json::json!({ "status": event });
                    let frame = format!("event: sidecar-status\ndata: {data}\n\n");
                    return Some((Ok::<_, Infallible>(web::Bytes::from(frame)), rx));
                }
                // A slow client only misses intermediate transitions.
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    });

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header(ContentEncoding::Identity)
        .streaming(stream)
}

pub async fn sidecar_restart(state: web::Data<AppState>) -> HttpResponse {
    let Some(sidecar) = &state.sidecar else {
        return no_sidecar();
    };
    match sidecar.restart().await {
        Ok(message) => HttpResponse::Ok().json(ActionResponse::ok(message)),
        Err(err) => {
            error!(sidecar = sidecar.name(), error = %err, "sidecar restart failed");
            HttpResponse::InternalServerError().json(ActionResponse::failed(err))
        }
    }
}
