//! Supervisor for the messaging sidecar (the WhatsApp automation server).
//!
//! Keeps one child process alive: starts it when it is not running, probes its
//! health endpoint on an interval and restarts it after consecutive failures.
//! State changes are published on a broadcast channel.

pub mod launcher;
pub mod probe;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub use launcher::ProcessLauncher;
pub use probe::HttpHealthProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SidecarEvent {
    Started,
    Error,
    Healthy,
    Unhealthy,
    Restarting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidecarStatus {
    pub running: bool,
    pub healthy: bool,
    /// Most recent event published by the supervisor, if any.
    pub last_event: Option<SidecarEvent>,
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub check_interval: Duration,
    pub failure_threshold: u32,
    pub restart_delay: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            failure_threshold: 3,
            restart_delay: Duration::from_secs(2),
        }
    }
}

/// Handed to a launched process so it can report its own exit. A stale
/// process (one that has since been replaced) cannot clear the flag.
#[derive(Clone)]
pub struct ExitSignal {
    running: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    mine: u64,
}

impl ExitSignal {
    pub fn exited(&self) {
        if self.generation.load(Ordering::SeqCst) == self.mine {
            self.running.store(false, Ordering::SeqCst);
        }
    }
}

pub trait SidecarHandle: Send {
    /// Ask the process to terminate. Idempotent.
    fn stop(&mut self);
}

#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, exit: ExitSignal) -> Result<Box<dyn SidecarHandle>, String>;
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn healthy(&self) -> bool;
}

pub struct SidecarSupervisor {
    name: String,
    launcher: Arc<dyn Launcher>,
    probe: Arc<dyn HealthProbe>,
    settings: SupervisorSettings,
    running: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    failures: AtomicU32,
    child: Mutex<Option<Box<dyn SidecarHandle>>>,
    events: broadcast::Sender<SidecarEvent>,
    last_event: std::sync::Mutex<Option<SidecarEvent>>,
}

impl SidecarSupervisor {
    pub fn new(
        name: impl Into<String>,
        launcher: Arc<dyn Launcher>,
        probe: Arc<dyn HealthProbe>,
        settings: SupervisorSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            name: name.into(),
            launcher,
            probe,
            settings,
            running: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            failures: AtomicU32::new(0),
            child: Mutex::new(None),
            events,
            last_event: std::sync::Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SidecarEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn emit(&self, event: SidecarEvent) {
        if let Ok(mut last) = self.last_event.lock() {
            *last = Some(event);
        }
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn last_event(&self) -> Option<SidecarEvent> {
        self.last_event.lock().ok().and_then(|last| *last)
    }

    /// Launch a fresh process, replacing any handle still held.
    pub async fn start(&self) -> Result<(), String> {
        let mut child = self.child.lock().await;
        if let Some(mut old) = child.take() {
            old.stop();
        }
        let mine = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let exit = ExitSignal {
            running: self.running.clone(),
            generation: self.generation.clone(),
            mine,
        };
        // Raised before launching so a process that exits at once still clears it.
        self.running.store(true, Ordering::SeqCst);
        match self.launcher.launch(exit).await {
            Ok(handle) => {
                *child = Some(handle);
                self.failures.store(0, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Stop the process and mark it not running.
    pub async fn stop(&self) {
        // Bump the generation so the exiting process cannot race a later start.
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(mut handle) = self.child.lock().await.take() {
            handle.stop();
        }
        self.running.store(false, Ordering::SeqCst);
    }

    pub async fn status(&self) -> SidecarStatus {
        let running = self.is_running();
        let healthy = running && self.probe.healthy().await;
        SidecarStatus {
            running,
            healthy,
            last_event: self.last_event(),
        }
    }

    pub async fn restart(&self) -> Result<String, String> {
        info!(sidecar = %self.name, "restart requested");
        self.stop().await;
        tokio::time::sleep(self.settings.restart_delay).await;
        match self.start().await {
            Ok(()) => {
                self.emit(SidecarEvent::Started);
                Ok(format!("{} restarted", self.name))
            }
            Err(e) => {
                self.emit(SidecarEvent::Error);
                Err(e)
            }
        }
    }

    /// One monitor iteration.
    pub async fn tick(&self) -> SidecarEvent {
        if !self.is_running() {
            info!(sidecar = %self.name, "sidecar not running, attempting to start");
            let event = match self.start().await {
                Ok(()) => {
                    info!(sidecar = %self.name, "sidecar started");
                    SidecarEvent::Started
                }
                Err(e) => {
                    error!(sidecar = %self.name, error = %e, "failed to start sidecar");
                    SidecarEvent::Error
                }
            };
            self.emit(event);
            return event;
        }

        if self.probe.healthy().await {
            self.failures.store(0, Ordering::SeqCst);
            self.emit(SidecarEvent::Healthy);
            return SidecarEvent::Healthy;
        }

        let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        warn!(sidecar = %self.name, failures, "sidecar health check failed");
        if failures >= self.settings.failure_threshold {
            error!(sidecar = %self.name, "sidecar appears dead, marking for restart");
            self.stop().await;
            self.emit(SidecarEvent::Restarting);
            return SidecarEvent::Restarting;
        }
        self.emit(SidecarEvent::Unhealthy);
        SidecarEvent::Unhealthy
    }

    /// Start immediately, then run the monitor loop forever.
    pub fn spawn_monitor(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            match self.start().await {
                Ok(()) => {
                    info!(sidecar = %self.name, "sidecar started");
                    self.emit(SidecarEvent::Started);
                }
                Err(e) => warn!(sidecar = %self.name, error = %e, "failed to start sidecar (will retry)"),
            }
            loop {
                tokio::time::sleep(self.settings.check_interval).await;
                self.tick().await;
            }
        })
    }
}
