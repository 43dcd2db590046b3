use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{info, warn};

use super::{ExitSignal, Launcher, SidecarHandle};

/// Spawns the sidecar as a child process and forwards its output to the log.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
}

pub struct ProcessHandle {
    kill: Option<oneshot::Sender<()>>,
}

impl SidecarHandle for ProcessHandle {
    fn stop(&mut self) {
        if let Some(tx) = self.kill.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self, exit: ExitSignal) -> Result<Box<dyn SidecarHandle>, String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("failed to spawn {}: {e}", self.program.display()))?;

        if let Some(out) = child.stdout.take() {
            let name = self.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(out).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!(sidecar = %name, "{line}");
                }
            });
        }
        if let Some(err) = child.stderr.take() {
            let name = self.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(err).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(sidecar = %name, "{line}");
                }
            });
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        let name = self.name.clone();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    warn!(sidecar = %name, code = ?status.ok().and_then(|s| s.code()), "sidecar terminated");
                }
                _ = kill_rx => {
                    let _ = child.kill().await;
                    info!(sidecar = %name, "sidecar stopped");
                }
            }
            exit.exited();
        });

        Ok(Box::new(ProcessHandle {
            kill: Some(kill_tx),
        }))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::sidecar::{HealthProbe, SidecarSupervisor, SupervisorSettings};
    use std::sync::Arc;
    use std::time::Duration;

    struct AlwaysHealthy;

    #[async_trait]
    impl HealthProbe for AlwaysHealthy {
        async fn healthy(&self) -> bool {
            true
        }
    }

    fn supervisor(script: &str) -> SidecarSupervisor {
        let launcher = ProcessLauncher {
            name: "test-sidecar".into(),
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
        };
        SidecarSupervisor::new(
            "test-sidecar",
            Arc::new(launcher),
            Arc::new(AlwaysHealthy),
            SupervisorSettings::default(),
        )
    }

    async fn wait_until(mut f: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if f() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn exited_process_is_noticed() {
        let sup = supervisor("echo ready; exit 3");
        sup.start().await.unwrap();
        assert!(wait_until(|| !sup.is_running()).await);
    }

    #[tokio::test]
    async fn stop_kills_long_running_process() {
        let sup = supervisor("sleep 30");
        sup.start().await.unwrap();
        assert!(sup.is_running());
        sup.stop().await;
        assert!(!sup.is_running());
    }

    #[tokio::test]
    async fn missing_program_is_a_launch_error() {
        let launcher = ProcessLauncher {
            name: "ghost".into(),
            program: "/definitely/not/here".into(),
            args: vec![],
        };
        let sup = SidecarSupervisor::new(
            "ghost",
            Arc::new(launcher),
            Arc::new(AlwaysHealthy),
            SupervisorSettings::default(),
        );
        let err = sup.start().await.unwrap_err();
        assert!(err.contains("failed to spawn"));
    }
}
