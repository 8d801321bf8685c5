//! Storage node runtime: one addressable storage unit.
//!
//! Composes a network identity, a virtual disk, the lifecycle manager and a
//! process scheduler. The runtime owns resource acquisition ordering on
//! start (identity → disk → lifecycle → scheduler) and releases in reverse
//! on stop; a failure mid-start leaves no partially-acquired resource
//! behind.

pub mod iface;
pub mod runtime;
pub mod spec;

pub use iface::{AddressPool, NetworkIdentity, PoolError};
pub use runtime::{RuntimeStatus, StorageNodeRuntime};
pub use spec::NodeSpec;

use chunknet_disk::DiskError;
use chunknet_lifecycle::LifecycleError;
use chunknet_sched::SchedError;

/// Errors surfaced by the node runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Disk(#[from] DiskError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Sched(#[from] SchedError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("invalid node spec: {0}")]
    InvalidSpec(String),
}
