//! Periodic catalog sync.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::error::ErrorKind;
use super::runner::{RunMode, SyncRunner};

pub struct SyncScheduler {
    runner: Arc<SyncRunner>,
    period: Duration,
}

impl SyncScheduler {
    pub fn new(runner: Arc<SyncRunner>, period: Duration) -> Self {
        Self { runner, period }
    }

    /// Spawn the interval loop. The first pass runs immediately.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.start().await })
    }

    async fn start(&self) {
        info!(period_secs = self.period.as_secs(), "starting catalog sync scheduler");
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    async fn tick(&self) {
        let result = self.runner.run(RunMode::Apply).await;
        match result.error_kind {
            None => debug!(changed = result.changed(), "scheduled catalog sync done"),
            Some(ErrorKind::Busy) => info!("scheduled catalog sync skipped: run already in flight"),
            Some(kind) => warn!(%kind, "scheduled catalog sync failed"),
        }
    }
}
