// HTTP API server binary: sync trigger, optional scheduler, optional sidecar

use anyhow::Result;
use catalog_sync::api::ApiServer;
use catalog_sync::config::{AppConfig, SNAPSHOT_KEYS};
use catalog_sync::sync::SyncScheduler;
use catalog_sync::tracing::{init_tracing, DEFAULT_FILTER};
use catalog_sync::util::env as env_util;

#[actix_web::main]
async fn main() -> Result<()> {
    // Load dotenv/env once (safe to call multiple times)
    env_util::init_env();
    init_tracing(DEFAULT_FILTER)?;

    tracing::info!("Initializing catalog sync API server");
    env_util::log_snapshot("api_server", SNAPSHOT_KEYS);

    let config = AppConfig::from_env()?;
    let runner = config.build_runner().await?;
    tracing::info!(
        deactivate_missing = config.sync.deactivate_missing,
        fetch_timeout_secs = config.sync.fetch_timeout.as_secs(),
        store_timeout_secs = config.sync.store_timeout.as_secs(),
        "sync runner ready"
    );

    if let Some(period) = config.interval {
        SyncScheduler::new(runner.clone(), period).spawn();
    }

    let sidecar = config.build_sidecar()?;
    if let Some(sidecar) = &sidecar {
        tracing::info!(sidecar = sidecar.name(), "starting sidecar monitor");
        sidecar.clone().spawn_monitor();
    }

    ApiServer::new(config.server.clone())
        .run(runner, sidecar.clone())
        .await?;

    if let Some(sidecar) = sidecar {
        sidecar.stop().await;
    }
    Ok(())
}
