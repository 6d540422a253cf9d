//! Write-Ahead Log (WAL) for crash-safe mutations.
//!
//! Every mutation is written to the WAL before it is applied to the data file
//! and the in-memory row set. On open, the WAL is replayed to restore the
//! collection to its last consistent state.
//!
//! # Format
//!
//! Each WAL frame has the format:
//! ```text
//! [checksum:u32][length:u32][entry:json]
//! ```
//!
//! A frame cut short at the end of the file is a torn write and is ignored;
//! a complete frame with a bad checksum is corruption.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::document::{Row, RowId};
use crate::error::{Error, Result};

/// Sync mode for WAL writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Sync after every write (safest, slowest).
    Immediate,
    /// Flush every write to the OS, fsync after a batch.
    #[default]
    Batched,
    /// Never fsync (fastest, risk of data loss on power failure).
    NoSync,
}

/// A single logged operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum WalEntry {
    /// A row was appended.
    Append { row: Row },
    /// The listed rows were deleted.
    Delete { row_ids: Vec<RowId> },
    /// Everything before this point is in the data file.
    Checkpoint,
}

impl WalEntry {
    fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| Error::WalCorrupted(format!("serialization failed: {}", e)))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::WalCorrupted(format!("deserialization failed: {}", e)))
    }
}

/// Write-Ahead Log for durable operations.
pub struct Wal {
    path: PathBuf,
    writer: BufWriter<File>,
    sync_mode: SyncMode,
    /// Number of entries since last sync.
    entries_since_sync: usize,
    /// Batch size for syncing.
    batch_size: usize,
}

impl Wal {
    /// Opens or creates a WAL file.
    pub fn open<P: AsRef<Path>>(path: P, sync_mode: SyncMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::from_io("failed to open WAL", e))?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            sync_mode,
            entries_since_sync: 0,
            batch_size: 100,
        })
    }

    /// Appends an entry to the WAL.
    pub fn append(&mut self, entry: &WalEntry) -> Result<()> {
        let data = entry.to_bytes()?;
        let checksum = crc32fast::hash(&data);
        let length = data.len() as u32;

        let mut frame = Vec::with_capacity(8 + data.len());
        frame.extend_from_slice(&checksum.to_le_bytes());
        frame.extend_from_slice(&length.to_le_bytes());
        frame.extend_from_slice(&data);

        self.writer
            .write_all(&frame)
            .map_err(|e| Error::from_io("write WAL frame failed", e))?;

        self.entries_since_sync += 1;

        // Frames always reach the OS before returning; only fsync is batched.
        match self.sync_mode {
            SyncMode::Immediate => self.sync()?,
            SyncMode::Batched if self.entries_since_sync >= self.batch_size => self.sync()?,
            SyncMode::Batched | SyncMode::NoSync => self
                .writer
                .flush()
                .map_err(|e| Error::from_io("flush failed", e))?,
        }

        Ok(())
    }

    /// Forces a sync to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| Error::from_io("flush failed", e))?;
        self.writer
            .get_ref()
            .sync_all()
            .map_err(|e| Error::from_io("sync failed", e))?;
        self.entries_since_sync = 0;
        Ok(())
    }

    /// Writes a checkpoint and truncates the WAL.
    ///
    /// Callers must have made the data file durable first.
    pub fn checkpoint(&mut self) -> Result<()> {
        self.append(&WalEntry::Checkpoint)?;
        self.sync()?;

        let truncated = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| Error::from_io("truncate failed", e))?;
        drop(truncated);

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::from_io("reopen WAL failed", e))?;
        self.writer = BufWriter::new(file);

        Ok(())
    }

    /// Reads all entries from the WAL for recovery.
    pub fn read_all<P: AsRef<Path>>(path: P) -> Result<Vec<WalEntry>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file =
            File::open(path).map_err(|e| Error::from_io("failed to open WAL for read", e))?;
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();

        loop {
            let mut header = [0u8; 8];
            match read_full(&mut reader, &mut header) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => return Err(Error::from_io("read WAL header failed", e)),
            }
            let expected_checksum = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let length = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;

            let mut data = Vec::new();
            (&mut reader)
                .take(length as u64)
                .read_to_end(&mut data)
                .map_err(|e| Error::from_io("read WAL entry failed", e))?;
            if data.len() < length {
                tracing::warn!(path = %path.display(), "ignoring torn WAL frame");
                break;
            }

            let actual_checksum = crc32fast::hash(&data);
            if actual_checksum != expected_checksum {
                return Err(Error::WalCorrupted(format!(
                    "checksum mismatch: expected {}, got {}",
                    expected_checksum, actual_checksum
                )));
            }

            entries.push(WalEntry::from_bytes(&data)?);
        }

        Ok(entries)
    }
}

/// Fills `buf` completely. Returns `Ok(false)` on a clean or torn EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}
