//! Node launching: spawn a storage node as an external OS process and
//! auto-register it once its listener is reachable.
//!
//! Thin subprocess-lifecycle orchestration, deliberately kept out of the
//! data plane. The `NodeLauncher` seam lets tests substitute a launcher
//! that starts nothing.

use crate::client::NodeClient;
use crate::coordinator::NetworkCoordinator;
use crate::registry::NodeRecord;
use crate::CoordinatorError;
use chunknet_common::NodeId;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::time::{sleep, Duration, Instant};

/// What to launch and where it will listen.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub node_id: NodeId,
    pub host: String,
    pub port: u16,
    /// Path to the `chunknet-node` binary.
    pub binary: PathBuf,
    /// YAML config file handed to the binary as its first argument.
    pub config_path: PathBuf,
    /// Directory for per-node stdout/stderr logs.
    pub log_dir: PathBuf,
}

/// Handle to a launched node. Dropping the handle does not stop the
/// process; call `NodeLauncher::stop`.
#[derive(Debug)]
pub struct NodeHandle {
    pub node_id: NodeId,
    child: Option<tokio::process::Child>,
}

impl NodeHandle {
    /// Handle for a process this launcher owns.
    pub fn managed(node_id: NodeId, child: tokio::process::Child) -> Self {
        Self {
            node_id,
            child: Some(child),
        }
    }

    /// Handle for a node managed elsewhere (tests, externally started nodes).
    pub fn detached(node_id: NodeId) -> Self {
        Self {
            node_id,
            child: None,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }
}

/// Start/stop capability for node processes.
#[async_trait::async_trait]
pub trait NodeLauncher: Send + Sync {
    async fn start(&self, config: &LaunchConfig) -> Result<NodeHandle, CoordinatorError>;
    async fn stop(&self, handle: NodeHandle) -> Result<(), CoordinatorError>;
}

/// Launches nodes as OS subprocesses with log redirection.
#[derive(Debug, Default)]
pub struct SubprocessLauncher;

impl SubprocessLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl NodeLauncher for SubprocessLauncher {
    async fn start(&self, config: &LaunchConfig) -> Result<NodeHandle, CoordinatorError> {
        std::fs::create_dir_all(&config.log_dir)?;
        let stdout = std::fs::File::create(
            config.log_dir.join(format!("{}.log", config.node_id)),
        )?;
        let stderr = std::fs::File::create(
            config.log_dir.join(format!("{}.err", config.node_id)),
        )?;

        let child = tokio::process::Command::new(&config.binary)
            .arg(&config.config_path)
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|e| CoordinatorError::Launch {
                node_id: config.node_id.clone(),
                message: e.to_string(),
            })?;

        tracing::info!(
            "started node process {} (pid {:?}) on port {}",
            config.node_id,
            child.id(),
            config.port
        );
        Ok(NodeHandle::managed(config.node_id.clone(), child))
    }

    async fn stop(&self, mut handle: NodeHandle) -> Result<(), CoordinatorError> {
        if let Some(child) = handle.child.as_mut() {
            if let Err(e) = child.kill().await {
                tracing::warn!("failed to kill node {}: {}", handle.node_id, e);
            }
            let _ = child.wait().await;
            tracing::info!("stopped node process {}", handle.node_id);
        }
        Ok(())
    }
}

impl<C: NodeClient> NetworkCoordinator<C> {
    /// Launch a node process and register it once its listener answers a
    /// status probe. On probe timeout the process is stopped and
    /// `LaunchTimeout` is returned.
    pub async fn launch_and_register<L: NodeLauncher>(
        &self,
        launcher: &L,
        config: &LaunchConfig,
        reachable_timeout: Duration,
    ) -> Result<NodeHandle, CoordinatorError> {
        let handle = launcher.start(config).await?;

        let probe = NodeRecord::new(config.node_id.clone(), config.host.clone(), config.port);
        let deadline = Instant::now() + reachable_timeout;
        loop {
            if self.client_probe(&probe).await {
                break;
            }
            if Instant::now() >= deadline {
                launcher.stop(handle).await?;
                return Err(CoordinatorError::LaunchTimeout {
                    node_id: config.node_id.clone(),
                    timeout_secs: reachable_timeout.as_secs(),
                });
            }
            sleep(Duration::from_millis(200)).await;
        }

        self.register_node(config.node_id.clone(), config.host.clone(), config.port)
            .await?;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subprocess_start_and_stop() {
        let launcher = SubprocessLauncher::new();
        let dir = tempfile::TempDir::new().unwrap();

        // A long-running stand-in process; the "config path" is its
        // sleep duration argument.
        let config = LaunchConfig {
            node_id: NodeId::from("n1"),
            host: "127.0.0.1".to_string(),
            port: 7001,
            binary: PathBuf::from("sleep"),
            config_path: PathBuf::from("30"),
            log_dir: dir.path().join("logs"),
        };

        let handle = launcher.start(&config).await.unwrap();
        assert!(handle.pid().is_some());
        assert!(dir.path().join("logs").join("n1.log").exists());

        launcher.stop(handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_start_missing_binary_fails() {
        let launcher = SubprocessLauncher::new();
        let dir = tempfile::TempDir::new().unwrap();

        let config = LaunchConfig {
            node_id: NodeId::from("n1"),
            host: "127.0.0.1".to_string(),
            port: 7001,
            binary: dir.path().join("no-such-binary"),
            config_path: PathBuf::from("config.yaml"),
            log_dir: dir.path().join("logs"),
        };

        let err = launcher.start(&config).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Launch { .. }));
    }

    #[tokio::test]
    async fn test_detached_handle_stop_is_noop() {
        let launcher = SubprocessLauncher::new();
        let handle = NodeHandle::detached(NodeId::from("external"));
        assert!(handle.pid().is_none());
        launcher.stop(handle).await.unwrap();
    }
}
