//! Append-only data file holding the rows of one collection.
//!
//! Rows are never rewritten in place except for their one-byte tombstone
//! marker. Each record is addressed by its byte offset in the file.
//!
//! # Format
//!
//! ```text
//! [deleted:u8][row_id:u64][id_len:u32][id][text_len:u32][text][dim:u32][vector:f32*dim][meta_len:u32][meta]
//! ```
//!
//! All integers are little-endian; strings are UTF-8.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::document::Row;
use crate::error::{Error, Result};

/// Marker for deleted records.
const DELETED_MARKER: u8 = 1;
const ACTIVE_MARKER: u8 = 0;

/// A row read back from the data file.
#[derive(Debug, Clone)]
pub struct DataRecord {
    /// Byte offset in the file.
    pub offset: u64,
    pub deleted: bool,
    pub row: Row,
}

/// Append-only data file for row storage.
pub struct DataFile {
    path: PathBuf,
    writer: BufWriter<File>,
    /// Current write position (end of file).
    write_pos: u64,
}

impl DataFile {
    /// Opens or creates a data file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::from_io("failed to open data file", e))?;

        let write_pos = file
            .metadata()
            .map_err(|e| Error::from_io("data file metadata failed", e))?
            .len();

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            write_pos,
        })
    }

    /// Appends a row. Returns the byte offset of the written record.
    pub fn append(&mut self, row: &Row) -> Result<u64> {
        let offset = self.write_pos;
        let bytes = encode_record(row)?;

        self.writer
            .write_all(&bytes)
            .map_err(|e| Error::from_io("write record failed", e))?;

        self.write_pos += bytes.len() as u64;
        Ok(offset)
    }

    /// Marks the record at the given offset as deleted.
    pub fn mark_deleted(&mut self, offset: u64) -> Result<()> {
        // The record may still sit in the write buffer.
        self.writer
            .flush()
            .map_err(|e| Error::from_io("flush before delete failed", e))?;

        let mut file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| Error::from_io("open for delete failed", e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| Error::from_io("seek failed", e))?;
        file.write_all(&[DELETED_MARKER])
            .map_err(|e| Error::from_io("write delete marker failed", e))?;

        Ok(())
    }

    /// Reads every complete record, deleted or not, in file order.
    ///
    /// A torn record at the tail (from a crash mid-append) is cut off so that
    /// later appends start at a clean boundary.
    pub fn scan(&mut self) -> Result<Vec<DataRecord>> {
        self.writer
            .flush()
            .map_err(|e| Error::from_io("flush before scan failed", e))?;

        let file = File::open(&self.path)
            .map_err(|e| Error::from_io("open for scan failed", e))?;
        let file_len = file
            .metadata()
            .map_err(|e| Error::from_io("data file metadata failed", e))?
            .len();

        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut offset = 0u64;

        while offset < file_len {
            match read_record(&mut reader) {
                Ok((deleted, row, size)) => {
                    records.push(DataRecord {
                        offset,
                        deleted,
                        row,
                    });
                    offset += size;
                }
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(Error::from_io("read record failed", e)),
            }
        }

        if offset < file_len {
            tracing::warn!(
                path = %self.path.display(),
                valid = offset,
                len = file_len,
                "truncating torn record at end of data file"
            );
            let file = OpenOptions::new()
                .write(true)
                .open(&self.path)
                .map_err(|e| Error::from_io("open for truncate failed", e))?;
            file.set_len(offset)
                .map_err(|e| Error::from_io("truncate failed", e))?;
            self.write_pos = offset;
        }

        Ok(records)
    }

    /// Flushes pending writes to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| Error::from_io("flush failed", e))?;
        self.writer
            .get_ref()
            .sync_all()
            .map_err(|e| Error::from_io("sync failed", e))?;
        Ok(())
    }

    #[cfg(test)]
    fn write_position(&self) -> u64 {
        self.write_pos
    }
}

fn encode_record(row: &Row) -> Result<Vec<u8>> {
    let id = row.id.as_bytes();
    let text = row.text.as_bytes();
    let meta = row.metadata.as_bytes();

    let len_u32 = |n: usize, what: &str| -> Result<[u8; 4]> {
        u32::try_from(n)
            .map(u32::to_le_bytes)
            .map_err(|_| Error::InvalidInput(format!("{} too large to store", what)))
    };

    let mut buf = Vec::with_capacity(
        1 + 8 + 4 + id.len() + 4 + text.len() + 4 + row.vector.len() * 4 + 4 + meta.len(),
    );
    buf.push(ACTIVE_MARKER);
    buf.extend_from_slice(&row.row_id.to_le_bytes());
    buf.extend_from_slice(&len_u32(id.len(), "id")?);
    buf.extend_from_slice(id);
    buf.extend_from_slice(&len_u32(text.len(), "text")?);
    buf.extend_from_slice(text);
    buf.extend_from_slice(&len_u32(row.vector.len(), "vector")?);
    for v in &row.vector {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf.extend_from_slice(&len_u32(meta.len(), "metadata")?);
    buf.extend_from_slice(meta);
    Ok(buf)
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Reads exactly `len` bytes without trusting `len` for the allocation, so a
/// garbage length in a torn record surfaces as EOF instead of a huge buffer.
fn read_bytes<R: Read>(reader: &mut R, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    Ok(buf)
}

fn read_string<R: Read>(reader: &mut R) -> io::Result<(String, u64)> {
    let len = read_u32(reader)? as usize;
    let buf = read_bytes(reader, len)?;
    let s = String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok((s, 4 + len as u64))
}

/// Reads one record, returning its tombstone flag, row and byte size.
fn read_record<R: Read>(reader: &mut R) -> io::Result<(bool, Row, u64)> {
    let mut marker = [0u8; 1];
    reader.read_exact(&mut marker)?;

    let mut row_id = [0u8; 8];
    reader.read_exact(&mut row_id)?;

    let (id, id_size) = read_string(reader)?;
    let (text, text_size) = read_string(reader)?;

    let dim = read_u32(reader)? as usize;
    let raw = read_bytes(reader, dim * 4)?;
    let vector = raw
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    let (metadata, meta_size) = read_string(reader)?;

    let size = 1 + 8 + id_size + text_size + 4 + dim as u64 * 4 + meta_size;
    let row = Row {
        row_id: u64::from_le_bytes(row_id),
        id,
        text,
        vector,
        metadata,
    };
    Ok((marker[0] == DELETED_MARKER, row, size))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(row_id: u64, id: &str) -> Row {
        Row {
            row_id,
            id: id.to_string(),
            text: format!("text of {}", id),
            vector: vec![row_id as f32, 0.5, -1.0],
            metadata: r#"{"k":"v"}"#.to_string(),
        }
    }

    #[test]
    fn test_append_and_scan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.sdb");

        {
            let mut df = DataFile::open(&path).unwrap();
            df.append(&row(1, "a")).unwrap();
            df.append(&row(2, "b")).unwrap();
            df.flush().unwrap();
        }

        let mut df = DataFile::open(&path).unwrap();
        let records = df.scan().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].offset, 0);
        assert_eq!(records[1].row, row(2, "b"));
        assert!(records.iter().all(|r| !r.deleted));
    }

    #[test]
    fn test_mark_deleted_unflushed_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.sdb");

        let mut df = DataFile::open(&path).unwrap();
        df.append(&row(1, "a")).unwrap();
        let offset = df.append(&row(2, "b")).unwrap();
        df.mark_deleted(offset).unwrap();
        df.append(&row(3, "c")).unwrap();

        let records = df.scan().unwrap();
        assert_eq!(records.len(), 3);
        assert!(!records[0].deleted);
        assert!(records[1].deleted);
        assert_eq!(records[2].row.id, "c");
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.sdb");

        let good_len;
        {
            let mut df = DataFile::open(&path).unwrap();
            df.append(&row(1, "a")).unwrap();
            df.flush().unwrap();
            good_len = df.write_position();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[0u8, 2, 0, 0]).unwrap();
        }

        let mut df = DataFile::open(&path).unwrap();
        let records = df.scan().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(df.write_position(), good_len);

        df.append(&row(2, "b")).unwrap();
        assert_eq!(df.scan().unwrap().len(), 2);
    }
}
