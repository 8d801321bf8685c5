//! Disk superblock: identity header at offset 0 of the backing allocation.
//!
//! Layout: `[4-byte magic][4-byte CRC32][4-byte length][JSON payload]`.
//! The CRC covers the JSON payload only. A reopened backing file whose
//! magic or CRC does not verify is treated as corrupt.

use crate::DiskError;
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

/// Magic number identifying a chunknet disk backing file.
pub const DISK_MAGIC: u32 = 0xD15C_D15C;

/// Identity metadata written at the head of the backing allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Superblock {
    pub disk_id: String,
    pub capacity_bytes: u64,
    pub created_at_ms: u64,
}

impl Superblock {
    pub fn new(disk_id: impl Into<String>, capacity_bytes: u64) -> Self {
        Self {
            disk_id: disk_id.into(),
            capacity_bytes,
            created_at_ms: now_ms(),
        }
    }

    /// Serialize and write at offset 0 of `file`.
    pub fn write_to(&self, file: &mut File) -> Result<(), DiskError> {
        let payload = serde_json::to_vec(self)?;

        let mut hasher = Hasher::new();
        hasher.update(&payload);
        let crc = hasher.finalize();

        file.seek(SeekFrom::Start(0))?;
        file.write_all(&DISK_MAGIC.to_le_bytes())?;
        file.write_all(&crc.to_le_bytes())?;
        file.write_all(&(payload.len() as u32).to_le_bytes())?;
        file.write_all(&payload)?;
        file.sync_all()?;
        Ok(())
    }

    /// Read and verify the superblock at offset 0 of `file`.
    pub fn read_from(file: &mut File) -> Result<Self, DiskError> {
        file.seek(SeekFrom::Start(0))?;

        let mut magic_buf = [0u8; 4];
        file.read_exact(&mut magic_buf)?;
        let magic = u32::from_le_bytes(magic_buf);
        if magic != DISK_MAGIC {
            return Err(DiskError::Corrupt(format!(
                "bad magic {:#010x}, expected {:#010x}",
                magic, DISK_MAGIC
            )));
        }

        let mut crc_buf = [0u8; 4];
        file.read_exact(&mut crc_buf)?;
        let expected_crc = u32::from_le_bytes(crc_buf);

        let mut len_buf = [0u8; 4];
        file.read_exact(&mut len_buf)?;
        let len = u32::from_le_bytes(len_buf) as usize;

        let mut payload = vec![0u8; len];
        file.read_exact(&mut payload)?;

        let mut hasher = Hasher::new();
        hasher.update(&payload);
        let actual_crc = hasher.finalize();
        if actual_crc != expected_crc {
            return Err(DiskError::Corrupt(format!(
                "CRC mismatch: expected {:#010x}, got {:#010x}",
                expected_crc, actual_crc
            )));
        }

        let superblock: Superblock = serde_json::from_slice(&payload)?;
        Ok(superblock)
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
