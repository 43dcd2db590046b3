// One-shot (or periodic) catalog sync from the command line

use anyhow::{Context, Result};
use catalog_sync::config::{AppConfig, SNAPSHOT_KEYS};
use catalog_sync::sync::{RunMode, SyncResult, SyncScheduler};
use catalog_sync::tracing::{init_tracing, DEFAULT_FILTER};
use catalog_sync::util::env as env_util;
use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "catalog_sync", version, about = "Sync the product catalog into the local store")]
struct Cli {
    /// Plan the sync and report counts without writing anything
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    /// Keep running, syncing every N seconds (overrides SYNC_INTERVAL_SECS)
    #[arg(long)]
    interval: Option<u64>,
    /// Print the full result as JSON instead of a summary line
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    env_util::init_env();
    init_tracing(DEFAULT_FILTER)?;
    env_util::log_snapshot("catalog_sync", SNAPSHOT_KEYS);

    let config = AppConfig::from_env()?;
    let runner = config.build_runner().await?;

    let interval = match cli.interval {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => config.interval,
    };

    if let Some(period) = interval {
        if cli.dry_run {
            tracing::warn!("--dry-run is ignored in interval mode");
        }
        let handle = SyncScheduler::new(runner, period).spawn();
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")?;
        tracing::info!("shutting down catalog sync scheduler");
        handle.abort();
        return Ok(ExitCode::SUCCESS);
    }

    let result = runner.run(RunMode::from_dry_run(cli.dry_run)).await;
    report(&result, cli.json)?;
    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn report(result: &SyncResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }
    println!(
        "[catalog_sync] success={} dry_run={} fetched={} created={} updated={} unchanged={} deactivated={} failed={} elapsed_ms={}",
        result.success,
        result.dry_run,
        result.fetched,
        result.created,
        result.updated,
        result.unchanged,
        result.deactivated,
        result.failed,
        result.duration_ms,
    );
    if let Some(err) = &result.error {
        eprintln!("[catalog_sync] error: {err}");
    }
    Ok(())
}
