//! The scheduler: submission API, ready queue, and worker pool.

use crate::process::{ManagedProcess, ProcessInfo, ProcessState};
use crate::SchedError;
use chunknet_common::NodeId;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::time::Duration;

/// Boxed error type tasks may fail with.
pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

/// A unit of schedulable work.
pub type ProcessTask = BoxFuture<'static, Result<(), TaskError>>;

/// Ready-queue entry: max-heap on priority, FIFO within a priority level
/// via the ascending submission sequence.
#[derive(Debug, PartialEq, Eq)]
struct QueuedProcess {
    priority: u8,
    seq: u64,
    pid: u64,
}

impl Ord for QueuedProcess {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedProcess {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

struct SchedShared {
    node_id: NodeId,
    accepting: AtomicBool,
    next_pid: AtomicU64,
    next_seq: AtomicU64,
    table: Mutex<HashMap<u64, ManagedProcess>>,
    tasks: Mutex<HashMap<u64, ProcessTask>>,
    ready: Mutex<BinaryHeap<QueuedProcess>>,
    notify: Notify,
}

impl SchedShared {
    /// Pop the highest-priority pid that is still in `Ready` state.
    /// Entries for killed or parked processes are discarded as they surface.
    fn next_ready(&self) -> Option<u64> {
        let mut ready = self.ready.lock().expect("ready queue poisoned");
        while let Some(queued) = ready.pop() {
            let table = self.table.lock().expect("process table poisoned");
            match table.get(&queued.pid) {
                Some(p) if p.state == ProcessState::Ready => return Some(queued.pid),
                _ => continue,
            }
        }
        None
    }

    fn transition(&self, pid: u64, next: ProcessState) -> bool {
        let mut table = self.table.lock().expect("process table poisoned");
        match table.get_mut(&pid) {
            Some(p) => {
                p.transition_to(next);
                true
            }
            None => false,
        }
    }

    fn record_failure(&self, pid: u64, message: String) {
        let mut table = self.table.lock().expect("process table poisoned");
        if let Some(p) = table.get_mut(&pid) {
            p.failure = Some(message);
        }
    }
}

/// Fixed-pool priority scheduler for one storage node.
pub struct Scheduler {
    shared: Arc<SchedShared>,
    workers: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("node_id", &self.shared.node_id)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Create a scheduler with `workers` worker tasks. Must be called from
    /// within a tokio runtime.
    pub fn new(node_id: NodeId, workers: usize) -> Self {
        let shared = Arc::new(SchedShared {
            node_id: node_id.clone(),
            accepting: AtomicBool::new(true),
            next_pid: AtomicU64::new(1),
            next_seq: AtomicU64::new(0),
            table: Mutex::new(HashMap::new()),
            tasks: Mutex::new(HashMap::new()),
            ready: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
        });

        let pool = (0..workers.max(1))
            .map(|idx| {
                let shared = shared.clone();
                tokio::spawn(worker_loop(shared, idx))
            })
            .collect();

        tracing::info!(
            "scheduler started for {} with {} worker(s)",
            node_id,
            workers.max(1)
        );

        Self {
            shared,
            workers: Mutex::new(pool),
        }
    }

    /// Submit a task. Returns the pid immediately; the task runs when a
    /// worker picks it from the ready queue.
    pub fn submit(
        &self,
        name: impl Into<String>,
        priority: u8,
        task: ProcessTask,
    ) -> Result<u64, SchedError> {
        if !self.shared.accepting.load(Ordering::SeqCst) {
            return Err(SchedError::ShuttingDown);
        }

        let pid = self.shared.next_pid.fetch_add(1, Ordering::SeqCst);
        let seq = self.shared.next_seq.fetch_add(1, Ordering::SeqCst);
        let name = name.into();

        let mut process = ManagedProcess::new(pid, name.clone(), priority);
        process.transition_to(ProcessState::Ready);

        self.shared
            .table
            .lock()
            .expect("process table poisoned")
            .insert(pid, process);
        self.shared
            .tasks
            .lock()
            .expect("task map poisoned")
            .insert(pid, task);
        self.shared
            .ready
            .lock()
            .expect("ready queue poisoned")
            .push(QueuedProcess { priority, seq, pid });
        self.shared.notify.notify_one();

        tracing::debug!("process submitted: {} (pid {})", name, pid);
        Ok(pid)
    }

    /// Park a `Ready` or `Running` process in `Waiting`. A parked process
    /// is skipped by workers until resumed.
    pub fn wait(&self, pid: u64) -> bool {
        let mut table = self.shared.table.lock().expect("process table poisoned");
        match table.get_mut(&pid) {
            Some(p) if matches!(p.state, ProcessState::Ready | ProcessState::Running) => {
                p.transition_to(ProcessState::Waiting);
                true
            }
            _ => false,
        }
    }

    /// Return a `Waiting` process to the ready queue.
    pub fn resume(&self, pid: u64) -> bool {
        let priority = {
            let mut table = self.shared.table.lock().expect("process table poisoned");
            match table.get_mut(&pid) {
                Some(p) if p.state == ProcessState::Waiting => {
                    p.transition_to(ProcessState::Ready);
                    Some(p.priority)
                }
                _ => None,
            }
        };

        match priority {
            Some(priority) => {
                let seq = self.shared.next_seq.fetch_add(1, Ordering::SeqCst);
                self.shared
                    .ready
                    .lock()
                    .expect("ready queue poisoned")
                    .push(QueuedProcess { priority, seq, pid });
                self.shared.notify.notify_one();
                true
            }
            None => false,
        }
    }

    /// Remove a process from tracking unconditionally.
    pub fn kill(&self, pid: u64) -> bool {
        self.shared
            .tasks
            .lock()
            .expect("task map poisoned")
            .remove(&pid);
        let removed = self
            .shared
            .table
            .lock()
            .expect("process table poisoned")
            .remove(&pid);
        if let Some(p) = &removed {
            tracing::warn!("process killed: {} (pid {})", p.name, pid);
        }
        removed.is_some()
    }

    /// Snapshot of one process.
    pub fn process_info(&self, pid: u64) -> Option<ProcessInfo> {
        self.shared
            .table
            .lock()
            .expect("process table poisoned")
            .get(&pid)
            .map(ManagedProcess::info)
    }

    /// Snapshots of every tracked process.
    pub fn processes(&self) -> Vec<ProcessInfo> {
        self.shared
            .table
            .lock()
            .expect("process table poisoned")
            .values()
            .map(ManagedProcess::info)
            .collect()
    }

    /// Stop accepting submissions, drain in-flight work up to `timeout`,
    /// then abort stragglers.
    pub async fn shutdown(&self, timeout: Duration) {
        self.shared.accepting.store(false, Ordering::SeqCst);
        self.shared.notify.notify_waiters();

        let handles = std::mem::take(&mut *self.workers.lock().expect("worker list poisoned"));
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        let drain = async {
            for handle in handles {
                let _ = handle.await;
            }
        };

        if tokio::time::timeout(timeout, drain).await.is_err() {
            tracing::warn!(
                "scheduler for {} did not drain within {:?}, aborting workers",
                self.shared.node_id,
                timeout
            );
            for abort in aborts {
                abort.abort();
            }
        } else {
            tracing::info!("scheduler for {} drained cleanly", self.shared.node_id);
        }
    }
}

async fn worker_loop(shared: Arc<SchedShared>, worker_idx: usize) {
    loop {
        let notified = shared.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if let Some(pid) = shared.next_ready() {
            run_one(&shared, pid).await;
            continue;
        }

        if !shared.accepting.load(Ordering::SeqCst) {
            break;
        }

        notified.await;
    }
    tracing::debug!("scheduler worker {} exited", worker_idx);
}

async fn run_one(shared: &Arc<SchedShared>, pid: u64) {
    let task = shared.tasks.lock().expect("task map poisoned").remove(&pid);
    let Some(task) = task else {
        return; // killed between dequeue and pickup
    };

    if !shared.transition(pid, ProcessState::Running) {
        return;
    }

    // Catch both error returns and panics; neither may escape the worker.
    let outcome = std::panic::AssertUnwindSafe(task).catch_unwind().await;
    match outcome {
        Ok(Ok(())) => {
            tracing::debug!("process {} completed", pid);
        }
        Ok(Err(e)) => {
            tracing::error!("process {} failed: {}", pid, e);
            shared.record_failure(pid, e.to_string());
        }
        Err(_) => {
            tracing::error!("process {} panicked", pid);
            shared.record_failure(pid, "task panicked".to_string());
        }
    }
    shared.transition(pid, ProcessState::Terminated);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;
    use tokio::time::sleep;

    fn sched(workers: usize) -> Scheduler {
        Scheduler::new(NodeId::from("test-node"), workers)
    }

    async fn wait_for_state(s: &Scheduler, pid: u64, state: ProcessState) {
        for _ in 0..200 {
            if s.process_info(pid).map(|i| i.state) == Some(state) {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "pid {} never reached {:?}, last seen {:?}",
            pid,
            state,
            s.process_info(pid)
        );
    }

    #[tokio::test]
    async fn test_submit_runs_to_terminated() {
        let s = sched(2);
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();

        let pid = s
            .submit(
                "touch-flag",
                5,
                async move {
                    ran2.store(true, Ordering::SeqCst);
                    Ok(())
                }
                .boxed(),
            )
            .unwrap();

        wait_for_state(&s, pid, ProcessState::Terminated).await;
        assert!(ran.load(Ordering::SeqCst));
        let info = s.process_info(pid).unwrap();
        assert!(info.failure.is_none());
        assert!(info.started_at_ms.is_some());
        assert!(info.finished_at_ms.is_some());
    }

    #[tokio::test]
    async fn test_priority_order_single_worker() {
        let s = sched(1);
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let order = Arc::new(Mutex::new(Vec::new()));

        // Occupy the lone worker so subsequent submissions queue up.
        let blocker = s
            .submit(
                "blocker",
                10,
                async move {
                    let _ = release_rx.await;
                    Ok(())
                }
                .boxed(),
            )
            .unwrap();
        wait_for_state(&s, blocker, ProcessState::Running).await;

        let mut pids = Vec::new();
        for (name, priority) in [("low", 1u8), ("high", 9u8), ("mid", 5u8)] {
            let order = order.clone();
            let pid = s
                .submit(
                    name,
                    priority,
                    async move {
                        order.lock().unwrap().push(name.to_string());
                        Ok(())
                    }
                    .boxed(),
                )
                .unwrap();
            pids.push(pid);
        }

        release_tx.send(()).unwrap();
        for pid in &pids {
            wait_for_state(&s, *pid, ProcessState::Terminated).await;
        }

        let order = order.lock().unwrap().clone();
        assert_eq!(order, vec!["high", "mid", "low"]);
    }

    #[tokio::test]
    async fn test_fifo_within_priority() {
        let s = sched(1);
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let order = Arc::new(Mutex::new(Vec::new()));

        let blocker = s
            .submit(
                "blocker",
                10,
                async move {
                    let _ = release_rx.await;
                    Ok(())
                }
                .boxed(),
            )
            .unwrap();
        wait_for_state(&s, blocker, ProcessState::Running).await;

        let mut pids = Vec::new();
        for name in ["first", "second", "third"] {
            let order = order.clone();
            pids.push(
                s.submit(
                    name,
                    5,
                    async move {
                        order.lock().unwrap().push(name.to_string());
                        Ok(())
                    }
                    .boxed(),
                )
                .unwrap(),
            );
        }

        release_tx.send(()).unwrap();
        for pid in &pids {
            wait_for_state(&s, *pid, ProcessState::Terminated).await;
        }
        assert_eq!(
            order.lock().unwrap().clone(),
            vec!["first", "second", "third"]
        );
    }

    #[tokio::test]
    async fn test_failure_is_contained() {
        let s = sched(1);

        let failing = s
            .submit(
                "fails",
                5,
                async { Err::<(), TaskError>("synthetic failure".into()) }.boxed(),
            )
            .unwrap();
        wait_for_state(&s, failing, ProcessState::Terminated).await;
        let info = s.process_info(failing).unwrap();
        assert_eq!(info.failure.as_deref(), Some("synthetic failure"));

        // The pool must still be serviceable.
        let ok = s.submit("after", 5, async { Ok(()) }.boxed()).unwrap();
        wait_for_state(&s, ok, ProcessState::Terminated).await;
        assert!(s.process_info(ok).unwrap().failure.is_none());
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let s = sched(1);

        let panicking = s
            .submit("panics", 5, async { panic!("boom") }.boxed())
            .unwrap();
        wait_for_state(&s, panicking, ProcessState::Terminated).await;
        assert_eq!(
            s.process_info(panicking).unwrap().failure.as_deref(),
            Some("task panicked")
        );

        let ok = s.submit("after", 5, async { Ok(()) }.boxed()).unwrap();
        wait_for_state(&s, ok, ProcessState::Terminated).await;
    }

    #[tokio::test]
    async fn test_wait_parks_and_resume_requeues() {
        let s = sched(1);
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let ran = Arc::new(AtomicBool::new(false));

        let blocker = s
            .submit(
                "blocker",
                10,
                async move {
                    let _ = release_rx.await;
                    Ok(())
                }
                .boxed(),
            )
            .unwrap();
        wait_for_state(&s, blocker, ProcessState::Running).await;

        let ran2 = ran.clone();
        let parked = s
            .submit(
                "parked",
                5,
                async move {
                    ran2.store(true, Ordering::SeqCst);
                    Ok(())
                }
                .boxed(),
            )
            .unwrap();
        assert!(s.wait(parked));
        assert_eq!(
            s.process_info(parked).unwrap().state,
            ProcessState::Waiting
        );

        release_tx.send(()).unwrap();
        wait_for_state(&s, blocker, ProcessState::Terminated).await;

        // Parked work is skipped even with a free worker.
        sleep(Duration::from_millis(50)).await;
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(
            s.process_info(parked).unwrap().state,
            ProcessState::Waiting
        );

        assert!(s.resume(parked));
        wait_for_state(&s, parked, ProcessState::Terminated).await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_resume_requires_waiting() {
        let s = sched(1);
        let pid = s.submit("quick", 5, async { Ok(()) }.boxed()).unwrap();
        wait_for_state(&s, pid, ProcessState::Terminated).await;
        assert!(!s.resume(pid));
        assert!(!s.resume(9999));
    }

    #[tokio::test]
    async fn test_kill_removes_unconditionally() {
        let s = sched(1);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let blocker = s
            .submit(
                "blocker",
                10,
                async move {
                    let _ = release_rx.await;
                    Ok(())
                }
                .boxed(),
            )
            .unwrap();
        wait_for_state(&s, blocker, ProcessState::Running).await;

        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        let victim = s
            .submit(
                "victim",
                5,
                async move {
                    ran2.store(true, Ordering::SeqCst);
                    Ok(())
                }
                .boxed(),
            )
            .unwrap();

        assert!(s.kill(victim));
        assert!(s.process_info(victim).is_none());
        assert!(!s.kill(victim));

        release_tx.send(()).unwrap();
        wait_for_state(&s, blocker, ProcessState::Terminated).await;
        sleep(Duration::from_millis(50)).await;
        assert!(!ran.load(Ordering::SeqCst), "killed task must not run");
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_submissions() {
        let s = sched(1);
        s.shutdown(Duration::from_secs(1)).await;
        let err = s.submit("late", 5, async { Ok(()) }.boxed());
        assert!(matches!(err, Err(SchedError::ShuttingDown)));
    }

    #[tokio::test]
    async fn test_shutdown_drains_in_flight() {
        let s = sched(2);
        let counter = Arc::new(AtomicUsize::new(0));

        let mut pids = Vec::new();
        for i in 0..4 {
            let counter = counter.clone();
            pids.push(
                s.submit(
                    format!("work-{}", i),
                    5,
                    async move {
                        sleep(Duration::from_millis(20)).await;
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                    .boxed(),
                )
                .unwrap(),
            );
        }

        s.shutdown(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 4, "drain must finish work");
    }
}
