use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, instrument, warn};

use super::error::{with_timeout, SyncError};
use super::plan::{plan, Action, PlanOptions};
use super::result::{ItemError, SyncCounts, SyncResult};
use crate::source::CatalogSource;
use crate::store::CatalogStore;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub fetch_timeout: Duration,
    pub store_timeout: Duration,
    pub deactivate_missing: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            store_timeout: Duration::from_secs(15),
            deactivate_missing: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Apply,
    DryRun,
}

impl RunMode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            RunMode::DryRun
        } else {
            RunMode::Apply
        }
    }
}

/// Runs catalog reconciliation passes, one at a time.
///
/// Overlapping invocations are rejected with `SyncError::Busy` rather than
/// queued, so a double-click or a scheduler tick during a manual run never
/// produces two writers.
pub struct SyncRunner {
    source: Arc<dyn CatalogSource>,
    store: Arc<dyn CatalogStore>,
    options: SyncOptions,
    guard: Mutex<()>,
    running: AtomicBool,
    last: RwLock<Option<SyncResult>>,
}

/// Clears the running flag even if the pass unwinds.
struct RunningFlag<'a>(&'a AtomicBool);

impl<'a> RunningFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncRunner {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        store: Arc<dyn CatalogStore>,
        options: SyncOptions,
    ) -> Self {
        Self {
            source,
            store,
            options,
            guard: Mutex::new(()),
            running: AtomicBool::new(false),
            last: RwLock::new(None),
        }
    }

    /// True while a pass holds the run guard.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn last_result(&self) -> Option<SyncResult> {
        self.last.read().await.clone()
    }

    /// Execute one pass. Never fails: every error ends up inside the result.
    #[instrument(skip(self), fields(source = %self.source.describe(), store = %self.store.describe()))]
    pub async fn run(&self, mode: RunMode) -> SyncResult {
        let started_at = Utc::now();
        let dry_run = mode == RunMode::DryRun;

        let Ok(_permit) = self.guard.try_lock() else {
            warn!("catalog sync requested while another run is in flight");
            return SyncResult::aborted(&SyncError::Busy, 0, dry_run, started_at);
        };
        let _running = RunningFlag::raise(&self.running);

        let result = self.run_locked(dry_run, started_at).await;
        if result.success {
            info!(
                fetched = result.fetched,
                created = result.created,
                updated = result.updated,
                unchanged = result.unchanged,
                deactivated = result.deactivated,
                dry_run,
                duration_ms = result.duration_ms,
                "catalog sync finished"
            );
        } else {
            error!(
                error = result.error.as_deref().unwrap_or_default(),
                kind = ?result.error_kind,
                failed = result.failed,
                dry_run,
                "catalog sync failed"
            );
        }
        if !dry_run {
            *self.last.write().await = Some(result.clone());
        }
        result
    }

    async fn run_locked(&self, dry_run: bool, started_at: chrono::DateTime<Utc>) -> SyncResult {
        let items = match with_timeout(
            "catalog fetch",
            self.options.fetch_timeout,
            self.source.fetch_items(),
        )
        .await
        {
            Ok(items) => items,
            Err(e) => return SyncResult::aborted(&e, 0, dry_run, started_at),
        };
        let fetched = items.len();

        let index = match with_timeout(
            "store index load",
            self.options.store_timeout,
            self.store.load_index(),
        )
        .await
        {
            Ok(index) => index,
            Err(e) => return SyncResult::aborted(&e, fetched, dry_run, started_at),
        };

        let mut planned = plan(
            &items,
            &index,
            PlanOptions {
                deactivate_missing: self.options.deactivate_missing,
            },
        );
        let mut counts = SyncCounts {
            fetched,
            unchanged: planned.unchanged,
            ..Default::default()
        };
        let mut item_errors = std::mem::take(&mut planned.rejected);
        for rejected in &item_errors {
            warn!(sku = %rejected.sku, error = %rejected.message, "catalog item rejected");
        }

        if dry_run {
            counts.created = planned.creates();
            counts.updated = planned.updates();
            counts.deactivated = planned.deactivations();
            return SyncResult::completed(counts, item_errors, true, started_at);
        }

        for action in &planned.actions {
            match self.apply(action).await {
                Ok(()) => match action {
                    Action::Create { .. } => counts.created += 1,
                    Action::Update { .. } => counts.updated += 1,
                    Action::Deactivate { .. } => counts.deactivated += 1,
                },
                Err(e) => {
                    warn!(sku = %action.sku(), error = %e, "catalog write failed");
                    item_errors.push(ItemError::new(action.sku(), &e));
                }
            }
        }

        SyncResult::completed(counts, item_errors, false, started_at)
    }

    async fn apply(&self, action: &Action) -> Result<(), SyncError> {
        let limit = self.options.store_timeout;
        match action {
            Action::Create { item, hash } => {
                with_timeout("store create", limit, self.store.create(item, hash)).await
            }
            Action::Update {
                existing,
                item,
                hash,
            } => with_timeout("store update", limit, self.store.update(existing, item, hash)).await,
            Action::Deactivate { existing } => {
                with_timeout("store deactivate", limit, self.store.deactivate(existing)).await
            }
        }
    }
}
