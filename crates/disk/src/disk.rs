//! The virtual disk itself: a pre-allocated backing file plus a named-blob
//! store with capacity accounting.

use crate::superblock::Superblock;
use crate::table::{FileEntry, FileTable};
use crate::DiskError;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Operational state of a virtual disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskState {
    /// Backing allocation exists, file system not initialised.
    Created,
    /// Formatted and ready to mount.
    Formatted,
    /// Attached; data operations permitted.
    Mounted,
    /// Detached; data operations rejected.
    Unmounted,
    /// Superblock failed verification.
    Error,
}

impl DiskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiskState::Created => "created",
            DiskState::Formatted => "formatted",
            DiskState::Mounted => "mounted",
            DiskState::Unmounted => "unmounted",
            DiskState::Error => "error",
        }
    }
}

/// Usage snapshot for one disk. All fields are read under the same borrow,
/// so a snapshot is internally consistent.
#[derive(Debug, Clone, PartialEq)]
pub struct DiskStats {
    pub disk_id: String,
    pub total_size_bytes: u64,
    pub used_bytes: u64,
    pub utilization_percent: f64,
    pub file_count: usize,
    pub state: DiskState,
    pub formatted: bool,
    pub mounted: bool,
}

/// A fixed-capacity blob store backed by a real, fully-allocated file.
///
/// Owned by exactly one node runtime. Mutating methods take `&mut self`;
/// the runtime wraps the disk in a lock, giving each disk a single-writer
/// critical section.
#[derive(Debug)]
pub struct VirtualDisk {
    disk_id: String,
    base_dir: PathBuf,
    backing_path: PathBuf,
    table_path: PathBuf,
    total_size_bytes: u64,
    used_bytes: u64,
    state: DiskState,
    formatted: bool,
    table: FileTable,
}

impl VirtualDisk {
    /// Create a disk, reserving `capacity_bytes` immediately by sizing the
    /// backing file to exactly that length.
    ///
    /// Reopening an existing backing file verifies the superblock, reloads
    /// the persisted file table and recomputes usage from it. The declared
    /// capacity must match the one recorded at creation; the allocation is
    /// never resized.
    pub fn create(
        disk_id: impl Into<String>,
        capacity_bytes: u64,
        base_dir: &Path,
    ) -> Result<Self, DiskError> {
        let disk_id = disk_id.into();
        std::fs::create_dir_all(base_dir)?;

        let backing_path = base_dir.join(format!("{}.vdisk", disk_id));
        let table_path = base_dir.join(format!("{}.table.json", disk_id));

        if backing_path.exists() {
            return Self::reopen(disk_id, capacity_bytes, base_dir, backing_path, table_path);
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&backing_path)?;
        file.set_len(capacity_bytes)?;
        Superblock::new(&disk_id, capacity_bytes).write_to(&mut file)?;

        tracing::info!(
            "virtual disk created: {} ({} bytes allocated at {:?})",
            disk_id,
            capacity_bytes,
            backing_path
        );

        Ok(Self {
            disk_id,
            base_dir: base_dir.to_path_buf(),
            backing_path,
            table_path,
            total_size_bytes: capacity_bytes,
            used_bytes: 0,
            state: DiskState::Created,
            formatted: false,
            table: FileTable::new(),
        })
    }

    fn reopen(
        disk_id: String,
        capacity_bytes: u64,
        base_dir: &Path,
        backing_path: PathBuf,
        table_path: PathBuf,
    ) -> Result<Self, DiskError> {
        let mut file = OpenOptions::new().read(true).write(true).open(&backing_path)?;

        let superblock = match Superblock::read_from(&mut file) {
            Ok(sb) => sb,
            Err(e @ DiskError::Corrupt(_)) => {
                tracing::error!("disk {} superblock corrupt: {}", disk_id, e);
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        if superblock.capacity_bytes != capacity_bytes {
            return Err(DiskError::CapacityMismatch {
                on_disk: superblock.capacity_bytes,
                requested: capacity_bytes,
            });
        }

        let table = FileTable::load(&table_path)?;
        let used_bytes = table.total_bytes();
        let formatted = !table.is_empty() || table_path.exists();

        tracing::info!(
            "virtual disk reopened: {} ({} entries, {} bytes used)",
            disk_id,
            table.len(),
            used_bytes
        );

        Ok(Self {
            disk_id,
            base_dir: base_dir.to_path_buf(),
            backing_path,
            table_path,
            total_size_bytes: capacity_bytes,
            used_bytes,
            state: if formatted {
                DiskState::Unmounted
            } else {
                DiskState::Created
            },
            formatted,
            table,
        })
    }

    /// Initialise the file system: empty table, zero usage.
    ///
    /// Formatting twice yields the same empty state both times. Existing
    /// blob files are removed so the physical layout matches the table.
    pub fn format(&mut self) -> Result<(), DiskError> {
        for (name, entry) in self.table.entries() {
            if let Err(e) = std::fs::remove_file(&entry.physical_path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("format: failed to remove blob {}: {}", name, e);
                }
            }
        }
        self.table.clear();
        self.table.save(&self.table_path)?;
        self.used_bytes = 0;
        self.formatted = true;
        self.state = DiskState::Formatted;

        tracing::info!("disk formatted: {}", self.disk_id);
        Ok(())
    }

    /// Attach the disk, enabling data operations.
    pub fn mount(&mut self) -> Result<(), DiskError> {
        if !self.formatted {
            return Err(DiskError::NotFormatted(self.disk_id.clone()));
        }
        self.state = DiskState::Mounted;
        tracing::info!("disk mounted: {}", self.disk_id);
        Ok(())
    }

    /// Detach the disk. Idempotent.
    pub fn unmount(&mut self) {
        if self.state == DiskState::Mounted {
            self.state = DiskState::Unmounted;
            tracing::info!("disk unmounted: {}", self.disk_id);
        }
    }

    fn require_mounted(&self) -> Result<(), DiskError> {
        if self.state != DiskState::Mounted {
            return Err(DiskError::NotMounted(self.disk_id.clone()));
        }
        Ok(())
    }

    /// Durably write a named blob.
    ///
    /// Rejected with `InsufficientSpace` when the write would push usage past
    /// the declared capacity; usage is unchanged on any failure. Writing an
    /// existing name replaces the old blob and its accounting.
    pub fn write(&mut self, name: &str, data: &[u8]) -> Result<(), DiskError> {
        self.require_mounted()?;

        let replaced_bytes = self.table.get(name).map(|e| e.size_bytes).unwrap_or(0);
        let projected = self.used_bytes - replaced_bytes + data.len() as u64;
        if projected > self.total_size_bytes {
            return Err(DiskError::InsufficientSpace {
                requested: data.len() as u64,
                available: self.total_size_bytes - (self.used_bytes - replaced_bytes),
            });
        }

        let blob_path = self.blob_path(name);
        std::fs::write(&blob_path, data)?;

        self.table
            .insert(name.to_string(), FileEntry::new(blob_path, data.len() as u64));
        self.table.save(&self.table_path)?;
        self.used_bytes = projected;

        tracing::debug!(
            "blob written: {} on {} ({} bytes, {}/{} used)",
            name,
            self.disk_id,
            data.len(),
            self.used_bytes,
            self.total_size_bytes
        );
        Ok(())
    }

    /// Read a named blob.
    pub fn read(&self, name: &str) -> Result<Vec<u8>, DiskError> {
        self.require_mounted()?;

        let entry = self
            .table
            .get(name)
            .ok_or_else(|| DiskError::NotFound(name.to_string()))?;
        let data = std::fs::read(&entry.physical_path)?;
        Ok(data)
    }

    /// Remove a named blob and release its accounting.
    pub fn delete(&mut self, name: &str) -> Result<(), DiskError> {
        self.require_mounted()?;

        let entry = self
            .table
            .remove(name)
            .ok_or_else(|| DiskError::NotFound(name.to_string()))?;

        if let Err(e) = std::fs::remove_file(&entry.physical_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                // Accounting already updated; report but keep going.
                tracing::warn!("failed to remove blob file for {}: {}", name, e);
            }
        }
        self.table.save(&self.table_path)?;
        self.used_bytes = self.used_bytes.saturating_sub(entry.size_bytes);

        tracing::debug!("blob deleted: {} from {}", name, self.disk_id);
        Ok(())
    }

    /// Names of all stored blobs.
    pub fn list(&self) -> Result<Vec<String>, DiskError> {
        self.require_mounted()?;
        Ok(self.table.names())
    }

    /// Consistent usage snapshot.
    pub fn stats(&self) -> DiskStats {
        let utilization_percent = if self.total_size_bytes > 0 {
            (self.used_bytes as f64 * 100.0) / self.total_size_bytes as f64
        } else {
            0.0
        };
        DiskStats {
            disk_id: self.disk_id.clone(),
            total_size_bytes: self.total_size_bytes,
            used_bytes: self.used_bytes,
            utilization_percent,
            file_count: self.table.len(),
            state: self.state,
            formatted: self.formatted,
            mounted: self.state == DiskState::Mounted,
        }
    }

    pub fn disk_id(&self) -> &str {
        &self.disk_id
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.total_size_bytes
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    pub fn state(&self) -> DiskState {
        self.state
    }

    pub fn is_formatted(&self) -> bool {
        self.formatted
    }

    pub fn is_mounted(&self) -> bool {
        self.state == DiskState::Mounted
    }

    /// Path of the backing allocation file.
    pub fn backing_path(&self) -> &Path {
        &self.backing_path
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(format!("{}_{}", self.disk_id, name))
    }
}
