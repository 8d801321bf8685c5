//! Managed process metadata and state.

/// Lifecycle of a managed process. `Terminated` is terminal; a pid is
/// never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Created, not yet enqueued.
    New,
    /// In the ready queue, eligible for a worker.
    Ready,
    /// Executing on a worker.
    Running,
    /// Parked, consuming no worker slot.
    Waiting,
    /// Finished, whether by success, failure, or kill.
    Terminated,
}

impl ProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessState::New => "new",
            ProcessState::Ready => "ready",
            ProcessState::Running => "running",
            ProcessState::Waiting => "waiting",
            ProcessState::Terminated => "terminated",
        }
    }
}

/// Internal bookkeeping for one process. The scheduler is the sole writer.
#[derive(Debug)]
pub(crate) struct ManagedProcess {
    pub pid: u64,
    pub name: String,
    pub priority: u8,
    pub state: ProcessState,
    pub created_at_ms: u64,
    pub started_at_ms: Option<u64>,
    pub finished_at_ms: Option<u64>,
    pub failure: Option<String>,
}

impl ManagedProcess {
    pub fn new(pid: u64, name: String, priority: u8) -> Self {
        Self {
            pid,
            name,
            priority,
            state: ProcessState::New,
            created_at_ms: now_ms(),
            started_at_ms: None,
            finished_at_ms: None,
            failure: None,
        }
    }

    pub fn transition_to(&mut self, next: ProcessState) {
        let prev = self.state;
        self.state = next;
        match next {
            ProcessState::Running => self.started_at_ms = Some(now_ms()),
            ProcessState::Terminated => self.finished_at_ms = Some(now_ms()),
            _ => {}
        }
        tracing::debug!(
            "process {} ({}) {} -> {}",
            self.pid,
            self.name,
            prev.as_str(),
            next.as_str()
        );
    }

    pub fn info(&self) -> ProcessInfo {
        ProcessInfo {
            pid: self.pid,
            name: self.name.clone(),
            priority: self.priority,
            state: self.state,
            created_at_ms: self.created_at_ms,
            started_at_ms: self.started_at_ms,
            finished_at_ms: self.finished_at_ms,
            failure: self.failure.clone(),
        }
    }
}

/// Public snapshot of a managed process.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInfo {
    pub pid: u64,
    pub name: String,
    pub priority: u8,
    pub state: ProcessState,
    pub created_at_ms: u64,
    pub started_at_ms: Option<u64>,
    pub finished_at_ms: Option<u64>,
    /// Failure message when the task errored or panicked.
    pub failure: Option<String>,
}

pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
