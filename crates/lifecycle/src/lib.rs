//! Node lifecycle state machine.
//!
//! Tracks a storage node's operational state
//! (`Created → Ready → (Running ⇄ Waiting) → Stopped`, any state → `Dead`),
//! emits heartbeats on a fixed interval, and detects self-death from
//! heartbeat staleness. The manager is the sole authority for transitions:
//! every state change flows through its internal `transition_to`, and no
//! other component mutates the state directly.

use chunknet_common::NodeId;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{interval, Duration};

/// Errors surfaced by lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("cannot {action} node {node_id} in state {state}")]
    InvalidTransition {
        node_id: NodeId,
        action: &'static str,
        state: &'static str,
    },

    #[error("heartbeat dead threshold ({dead_threshold:?}) must exceed interval ({interval:?})")]
    InvalidHeartbeatConfig {
        interval: Duration,
        dead_threshold: Duration,
    },

    #[error("task failed on node {node_id}: {message}")]
    TaskFailed { node_id: NodeId, message: String },
}

/// Operational state of a storage node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Created, not yet started.
    Created,
    /// Initialised and able to accept requests.
    Ready,
    /// Actively processing a task.
    Running,
    /// Idle, waiting for work.
    Waiting,
    /// Gracefully stopped.
    Stopped,
    /// Crashed or unresponsive.
    Dead,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Created => "created",
            NodeState::Ready => "ready",
            NodeState::Running => "running",
            NodeState::Waiting => "waiting",
            NodeState::Stopped => "stopped",
            NodeState::Dead => "dead",
        }
    }

    /// Terminal states accept no further work.
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeState::Stopped | NodeState::Dead)
    }
}

/// Heartbeat cadence. The dead threshold must be strictly greater than the
/// emission interval, otherwise a healthy node could be declared dead
/// between two beats.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    pub dead_threshold: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            dead_threshold: Duration::from_secs(15),
        }
    }
}

/// Snapshot of lifecycle information for one node.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleInfo {
    pub node_id: NodeId,
    pub state: NodeState,
    pub created_at_ms: u64,
    pub started_at_ms: u64,
    pub stopped_at_ms: u64,
    pub last_heartbeat_ms: u64,
    pub alive: bool,
    pub uptime_secs: u64,
}

struct LifecycleShared {
    node_id: NodeId,
    config: HeartbeatConfig,
    state: Mutex<NodeState>,
    /// Millis since epoch; zero means "never".
    created_at_ms: u64,
    started_at_ms: AtomicU64,
    stopped_at_ms: AtomicU64,
    last_heartbeat_ms: AtomicU64,
}

impl LifecycleShared {
    /// Sole writer for the state field.
    fn transition_to(&self, next: NodeState) {
        let mut state = self.state.lock().expect("lifecycle state poisoned");
        let prev = *state;
        if prev == next {
            return;
        }
        *state = next;
        tracing::info!(
            "node {} state change: {} -> {}",
            self.node_id,
            prev.as_str(),
            next.as_str()
        );
    }

    fn state(&self) -> NodeState {
        *self.state.lock().expect("lifecycle state poisoned")
    }

    fn record_heartbeat(&self) {
        self.last_heartbeat_ms.store(now_ms(), Ordering::SeqCst);
    }

    fn heartbeat_stale(&self) -> bool {
        let last = self.last_heartbeat_ms.load(Ordering::SeqCst);
        now_ms().saturating_sub(last) > self.config.dead_threshold.as_millis() as u64
    }

    /// Apply the staleness rule: a stale heartbeat forces `Dead` from any
    /// state except `Stopped` (graceful stop is not a failure).
    fn enforce_liveness(&self) -> NodeState {
        let state = self.state();
        if state != NodeState::Stopped && state != NodeState::Dead && self.heartbeat_stale() {
            tracing::error!(
                "node {} missed heartbeats beyond {:?}, marking dead",
                self.node_id,
                self.config.dead_threshold
            );
            self.transition_to(NodeState::Dead);
            return NodeState::Dead;
        }
        state
    }
}

/// Manages the lifecycle of one storage node.
pub struct LifecycleManager {
    shared: Arc<LifecycleShared>,
    background: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("node_id", &self.shared.node_id)
            .field("state", &self.shared.state())
            .finish_non_exhaustive()
    }
}

impl LifecycleManager {
    pub fn new(node_id: NodeId, config: HeartbeatConfig) -> Result<Self, LifecycleError> {
        if config.dead_threshold <= config.interval {
            return Err(LifecycleError::InvalidHeartbeatConfig {
                interval: config.interval,
                dead_threshold: config.dead_threshold,
            });
        }

        let now = now_ms();
        Ok(Self {
            shared: Arc::new(LifecycleShared {
                node_id,
                config,
                state: Mutex::new(NodeState::Created),
                created_at_ms: now,
                started_at_ms: AtomicU64::new(0),
                stopped_at_ms: AtomicU64::new(0),
                last_heartbeat_ms: AtomicU64::new(now),
            }),
            background: Mutex::new(Vec::new()),
        })
    }

    /// Activate the node: valid only from `Created` or `Stopped`. Starts
    /// heartbeat emission and the liveness watchdog, moves to `Ready`, then
    /// autonomously to `Waiting` once initialisation settles.
    pub fn activate(&self) -> Result<(), LifecycleError> {
        let state = self.shared.state();
        if !matches!(state, NodeState::Created | NodeState::Stopped) {
            return Err(LifecycleError::InvalidTransition {
                node_id: self.shared.node_id.clone(),
                action: "activate",
                state: state.as_str(),
            });
        }

        tracing::info!("activating node {}", self.shared.node_id);
        self.shared.started_at_ms.store(now_ms(), Ordering::SeqCst);
        self.shared.record_heartbeat();
        self.shared.transition_to(NodeState::Ready);

        let mut background = self.background.lock().expect("background list poisoned");

        // Heartbeat emitter.
        let shared = self.shared.clone();
        background.push(tokio::spawn(async move {
            let mut tick = interval(shared.config.interval);
            tick.tick().await; // immediate first tick
            loop {
                tick.tick().await;
                if shared.state().is_terminal() {
                    break;
                }
                shared.record_heartbeat();
            }
        }));

        // Liveness watchdog: checks staleness against the dead threshold.
        let shared = self.shared.clone();
        background.push(tokio::spawn(async move {
            let mut tick = interval(shared.config.interval);
            loop {
                tick.tick().await;
                if shared.enforce_liveness().is_terminal() {
                    break;
                }
            }
        }));

        // Initialisation settles out of band; then the node idles in Waiting.
        let shared = self.shared.clone();
        background.push(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if shared.state() == NodeState::Ready {
                shared.transition_to(NodeState::Waiting);
            }
        }));

        Ok(())
    }

    /// Run a task in the `Running` state: valid from `Ready`/`Waiting`,
    /// returns to `Waiting` on completion, forces `Dead` on failure.
    pub async fn start_processing(
        &self,
        description: &str,
        task: BoxFuture<'_, Result<(), String>>,
    ) -> Result<(), LifecycleError> {
        let state = self.shared.state();
        if !matches!(state, NodeState::Ready | NodeState::Waiting) {
            return Err(LifecycleError::InvalidTransition {
                node_id: self.shared.node_id.clone(),
                action: "process",
                state: state.as_str(),
            });
        }

        tracing::info!(
            "node {} starting task: {}",
            self.shared.node_id,
            description
        );
        self.shared.transition_to(NodeState::Running);
        self.shared.record_heartbeat();

        match task.await {
            Ok(()) => {
                self.shared.transition_to(NodeState::Waiting);
                Ok(())
            }
            Err(message) => {
                tracing::error!(
                    "node {} task '{}' failed: {}",
                    self.shared.node_id,
                    description,
                    message
                );
                self.shared.transition_to(NodeState::Dead);
                Err(LifecycleError::TaskFailed {
                    node_id: self.shared.node_id.clone(),
                    message,
                })
            }
        }
    }

    /// Gracefully stop: valid from any non-terminal state. Halts the
    /// heartbeat tasks and moves to `Stopped`.
    pub fn stop(&self) -> Result<(), LifecycleError> {
        let state = self.shared.state();
        if state.is_terminal() {
            return Err(LifecycleError::InvalidTransition {
                node_id: self.shared.node_id.clone(),
                action: "stop",
                state: state.as_str(),
            });
        }

        tracing::info!("stopping node {}", self.shared.node_id);
        self.shared.stopped_at_ms.store(now_ms(), Ordering::SeqCst);
        self.halt_background();
        self.shared.transition_to(NodeState::Stopped);
        Ok(())
    }

    /// Force the node dead, bypassing drain. Simulates a crash.
    pub fn kill(&self) {
        tracing::warn!("killing node {}", self.shared.node_id);
        self.halt_background();
        self.shared.transition_to(NodeState::Dead);
    }

    fn halt_background(&self) {
        let mut background = self.background.lock().expect("background list poisoned");
        for handle in background.drain(..) {
            handle.abort();
        }
    }

    /// Liveness, applying the staleness rule on read: a node whose last
    /// heartbeat is older than the dead threshold is forced `Dead` here
    /// even between watchdog ticks.
    pub fn is_alive(&self) -> bool {
        let state = self.shared.enforce_liveness();
        !matches!(state, NodeState::Dead | NodeState::Stopped)
    }

    pub fn state(&self) -> NodeState {
        self.shared.state()
    }

    pub fn node_id(&self) -> &NodeId {
        &self.shared.node_id
    }

    /// Touch the heartbeat from request-handling paths.
    pub fn record_heartbeat(&self) {
        self.shared.record_heartbeat();
    }

    pub fn info(&self) -> LifecycleInfo {
        let state = self.shared.state();
        let started = self.shared.started_at_ms.load(Ordering::SeqCst);
        let stopped = self.shared.stopped_at_ms.load(Ordering::SeqCst);
        let uptime_secs = if started == 0 {
            0
        } else if stopped > started {
            (stopped - started) / 1000
        } else {
            now_ms().saturating_sub(started) / 1000
        };

        LifecycleInfo {
            node_id: self.shared.node_id.clone(),
            state,
            created_at_ms: self.shared.created_at_ms,
            started_at_ms: started,
            stopped_at_ms: stopped,
            last_heartbeat_ms: self.shared.last_heartbeat_ms.load(Ordering::SeqCst),
            alive: !matches!(state, NodeState::Dead | NodeState::Stopped),
            uptime_secs,
        }
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Sleep helper used by tests that need to outwait the watchdog.
#[cfg(test)]
async fn sleep_past(threshold: Duration) {
    tokio::time::sleep(threshold + Duration::from_millis(150)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn fast_config() -> HeartbeatConfig {
        HeartbeatConfig {
            interval: Duration::from_millis(50),
            dead_threshold: Duration::from_millis(200),
        }
    }

    fn manager() -> LifecycleManager {
        LifecycleManager::new(NodeId::from("n1"), fast_config()).unwrap()
    }

    #[test]
    fn test_rejects_threshold_not_above_interval() {
        let err = LifecycleManager::new(
            NodeId::from("n1"),
            HeartbeatConfig {
                interval: Duration::from_secs(5),
                dead_threshold: Duration::from_secs(5),
            },
        )
        .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidHeartbeatConfig { .. }));
    }

    #[tokio::test]
    async fn test_activate_reaches_waiting() {
        let m = manager();
        assert_eq!(m.state(), NodeState::Created);

        m.activate().unwrap();
        assert_eq!(m.state(), NodeState::Ready);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(m.state(), NodeState::Waiting);
        assert!(m.is_alive());
        m.stop().unwrap();
    }

    #[tokio::test]
    async fn test_activate_invalid_from_running() {
        let m = manager();
        m.activate().unwrap();
        let err = m.activate().unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
        m.stop().unwrap();
    }

    #[tokio::test]
    async fn test_reactivate_after_stop() {
        let m = manager();
        m.activate().unwrap();
        m.stop().unwrap();
        assert_eq!(m.state(), NodeState::Stopped);

        m.activate().unwrap();
        assert_eq!(m.state(), NodeState::Ready);
        m.stop().unwrap();
    }

    #[tokio::test]
    async fn test_processing_returns_to_waiting() {
        let m = manager();
        m.activate().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        m.start_processing("copy-bytes", async { Ok(()) }.boxed())
            .await
            .unwrap();
        assert_eq!(m.state(), NodeState::Waiting);
        m.stop().unwrap();
    }

    #[tokio::test]
    async fn test_processing_failure_is_fatal() {
        let m = manager();
        m.activate().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let err = m
            .start_processing("doomed", async { Err("io exploded".to_string()) }.boxed())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::TaskFailed { .. }));
        assert_eq!(m.state(), NodeState::Dead);
        assert!(!m.is_alive());
    }

    #[tokio::test]
    async fn test_processing_invalid_when_stopped() {
        let m = manager();
        m.activate().unwrap();
        m.stop().unwrap();

        let err = m
            .start_processing("late", async { Ok(()) }.boxed())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_missed_heartbeats_force_dead() {
        let m = manager();
        m.activate().unwrap();

        // Abort the emitter so heartbeats stop while the node is nominally up.
        m.halt_background();
        sleep_past(fast_config().dead_threshold).await;

        assert!(!m.is_alive());
        assert_eq!(m.state(), NodeState::Dead);
    }

    #[tokio::test]
    async fn test_stopped_node_exempt_from_dead_detection() {
        let m = manager();
        m.activate().unwrap();
        m.stop().unwrap();

        sleep_past(fast_config().dead_threshold).await;
        assert_eq!(m.state(), NodeState::Stopped, "graceful stop is not death");
        assert!(!m.is_alive());
    }

    #[tokio::test]
    async fn test_kill_forces_dead() {
        let m = manager();
        m.activate().unwrap();
        m.kill();
        assert_eq!(m.state(), NodeState::Dead);
        assert!(!m.is_alive());

        let err = m.stop().unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_info_snapshot() {
        let m = manager();
        m.activate().unwrap();
        let info = m.info();
        assert_eq!(info.node_id, NodeId::from("n1"));
        assert!(info.alive);
        assert!(info.started_at_ms > 0);
        assert_eq!(info.stopped_at_ms, 0);
        m.stop().unwrap();

        let info = m.info();
        assert_eq!(info.state, NodeState::Stopped);
        assert!(!info.alive);
        assert!(info.stopped_at_ms >= info.started_at_ms);
    }
}
