//! Virtual disk: a fixed-capacity named-blob store backed by a real,
//! pre-allocated file.
//!
//! The backing allocation is created once, at construction, with its full
//! declared length, so disk-full conditions surface at allocation time rather
//! than hiding behind sparse files. Blobs are stored as individual files next
//! to the backing allocation; the file table is persisted as a JSON sidecar
//! so usage accounting survives restarts.
//!
//! All operations are synchronous (blocking I/O). The async boundary is at
//! the caller (the node runtime), which also provides mutual exclusion.

pub mod disk;
pub mod superblock;
pub mod table;

pub use disk::{DiskState, DiskStats, VirtualDisk};

/// Errors surfaced by virtual disk operations.
#[derive(Debug, thiserror::Error)]
pub enum DiskError {
    #[error("disk I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("disk serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("disk {0} is not formatted")]
    NotFormatted(String),

    #[error("disk {0} is not mounted")]
    NotMounted(String),

    #[error("insufficient space: need {requested} bytes, {available} available")]
    InsufficientSpace { requested: u64, available: u64 },

    #[error("no such entry: {0}")]
    NotFound(String),

    #[error("disk superblock corrupt: {0}")]
    Corrupt(String),

    #[error("capacity mismatch: backing file declares {on_disk} bytes, requested {requested}")]
    CapacityMismatch { on_disk: u64, requested: u64 },
}
