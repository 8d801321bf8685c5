//! File table: name → blob entry mapping, persisted as a JSON sidecar.

use crate::superblock::now_ms;
use crate::DiskError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One named blob on the disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Location of the blob file on the host filesystem.
    pub physical_path: PathBuf,
    pub size_bytes: u64,
    pub created_at_ms: u64,
}

impl FileEntry {
    pub fn new(physical_path: PathBuf, size_bytes: u64) -> Self {
        Self {
            physical_path,
            size_bytes,
            created_at_ms: now_ms(),
        }
    }
}

/// In-memory file table with JSON persistence.
///
/// The sidecar is rewritten wholesale after every mutation; the table is
/// small (one entry per stored chunk) so this stays cheap.
#[derive(Debug, Default)]
pub struct FileTable {
    entries: HashMap<String, FileEntry>,
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a table from its sidecar path. A missing sidecar yields an
    /// empty table.
    pub fn load(path: &Path) -> Result<Self, DiskError> {
        match std::fs::read(path) {
            Ok(bytes) => {
                let entries: HashMap<String, FileEntry> = serde_json::from_slice(&bytes)?;
                Ok(Self { entries })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(DiskError::Io(e)),
        }
    }

    /// Persist the table to its sidecar path.
    pub fn save(&self, path: &Path) -> Result<(), DiskError> {
        let bytes = serde_json::to_vec_pretty(&self.entries)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FileEntry> {
        self.entries.get(name)
    }

    pub fn insert(&mut self, name: String, entry: FileEntry) -> Option<FileEntry> {
        self.entries.insert(name, entry)
    }

    pub fn remove(&mut self, name: &str) -> Option<FileEntry> {
        self.entries.remove(name)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &FileEntry)> {
        self.entries.iter()
    }

    /// Sum of entry sizes; the authoritative usage figure on reload.
    pub fn total_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.size_bytes).sum()
    }
}
