//! Per-node process scheduler with bounded concurrency.
//!
//! Work submitted to a node (chunk writes, maintenance) runs as a managed
//! process: it gets a pid, a priority, and a lifecycle
//! `New → Ready → Running → Terminated`, with `Waiting` modelling blocked
//! I/O without occupying a worker. A fixed pool of workers pulls from a
//! priority-ordered ready queue; equal priorities run in submission order,
//! so nothing starves beyond pool delay. Task failures (including panics)
//! are caught at the worker boundary and recorded as termination; they
//! never take a worker down.

pub mod process;
pub mod scheduler;

pub use process::{ProcessInfo, ProcessState};
pub use scheduler::{ProcessTask, Scheduler, TaskError};

/// Errors surfaced by the scheduler API.
#[derive(Debug, thiserror::Error)]
pub enum SchedError {
    #[error("scheduler is shutting down, not accepting submissions")]
    ShuttingDown,
}
