//! Persistent collection handle with crash-safe storage.
//!
//! A `Table` owns one collection directory:
//! - `meta.json` with the fixed schema
//! - `wal.log`, written before every mutation
//! - `data.sdb`, the append-only row file
//! - `indices/`, optional index snapshots
//!
//! On open, active rows are loaded from the data file and the WAL is replayed
//! on top. Replay is idempotent: rows already present in the data file are
//! not appended twice.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};

use crate::config::BootstrapMode;
use crate::distance::DistanceMetric;
use crate::document::{Row, RowId};
use crate::error::{Error, Result};
use crate::filter::{Filter, RowView};
use crate::index::{
    self, IndexInfo, IndexKind, IndexRequest, IvfPqIndex, TextIndex,
};
use crate::metadata::Metadata;
use crate::storage::{DataFile, SyncMode, Wal, WalEntry};

/// Reserved id of the bootstrap seed row. Never visible to callers.
pub const SEED_ROW_ID: &str = "__semstore_seed__";

const FORMAT_VERSION: u32 = 1;
const META_FILE: &str = "meta.json";
const WAL_FILE: &str = "wal.log";
const DATA_FILE: &str = "data.sdb";
const INDEX_DIR: &str = "indices";

/// The fixed schema of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Length of every stored vector.
    pub dimension: usize,
    /// Default metric for similarity search.
    pub metric: DistanceMetric,
}

/// Persisted form of `meta.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableMeta {
    format_version: u32,
    dimension: usize,
    metric: DistanceMetric,
    bootstrap: BootstrapMode,
    next_row_id: RowId,
    created_at: String,
}

/// A row held in memory with its position in the data file.
#[derive(Debug, Clone)]
pub(crate) struct StoredRow {
    pub(crate) row: Row,
    pub(crate) offset: u64,
}

/// Mutable storage state, serialized behind one lock so row ids, WAL order
/// and data file order always agree.
struct Writer {
    wal: Wal,
    data_file: DataFile,
    next_row_id: RowId,
    /// Tombstones logged in the WAL but not yet written to the data file.
    pending_tombstones: Vec<u64>,
}

/// A persistent collection.
///
/// Reads take a shared lock on the in-memory rows; mutations are serialized
/// through the writer. Handles are shared behind `Arc` by the schema manager.
///
/// # Example
///
/// ```no_run
/// use semstore_core::{DistanceMetric, SyncMode, Table, TableSchema};
///
/// let schema = TableSchema { dimension: 3, metric: DistanceMetric::Cosine };
/// let table = Table::create("./data/profiles", "profiles", schema, SyncMode::Batched, Default::default()).unwrap();
/// table.append("doc-1".into(), "hello".into(), vec![0.1, 0.2, 0.3], "{}".into()).unwrap();
/// table.flush().unwrap();
/// ```
pub struct Table {
    name: String,
    path: PathBuf,
    schema: TableSchema,
    bootstrap: BootstrapMode,
    created_at: String,
    rows: RwLock<BTreeMap<RowId, StoredRow>>,
    writer: Mutex<Writer>,
    vector_index: RwLock<Option<Arc<IvfPqIndex>>>,
    text_index: RwLock<Option<Arc<TextIndex>>>,
    dropped: AtomicBool,
}

impl Table {
    /// True if `path` holds a collection.
    pub fn exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().join(META_FILE).is_file()
    }

    /// Creates a new collection at `path`.
    ///
    /// With [`BootstrapMode::SeedAndPurge`] a seed row is written first and
    /// the schema is taken from it; the seed is purged before this returns.
    pub fn create<P: AsRef<Path>>(
        path: P,
        name: &str,
        schema: TableSchema,
        sync_mode: SyncMode,
        bootstrap: BootstrapMode,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if schema.dimension == 0 {
            return Err(Error::Configuration(
                "collection dimension must be at least 1".into(),
            ));
        }
        if Self::exists(&path) {
            return Err(Error::IoError(format!(
                "collection already exists at {}",
                path.display()
            )));
        }
        fs::create_dir_all(&path).map_err(|e| Error::from_io("create collection dir failed", e))?;

        let mut meta = TableMeta {
            format_version: FORMAT_VERSION,
            dimension: schema.dimension,
            metric: schema.metric,
            bootstrap,
            next_row_id: 0,
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        match bootstrap {
            BootstrapMode::Declared => {
                write_meta(&path, &meta)?;
                Self::load(path, name, sync_mode)
            }
            BootstrapMode::SeedAndPurge => {
                let seed = Row {
                    row_id: 0,
                    id: SEED_ROW_ID.to_string(),
                    text: String::new(),
                    vector: vec![0.0; schema.dimension],
                    metadata: "{}".to_string(),
                };
                {
                    let mut data_file = DataFile::open(path.join(DATA_FILE))?;
                    data_file.append(&seed)?;
                    data_file.flush()?;
                }
                meta.dimension = seed.vector.len();
                meta.next_row_id = seed.row_id + 1;
                write_meta(&path, &meta)?;

                let table = Self::load(path, name, sync_mode)?;
                let purged = table.purge_seed_rows()?;
                table.flush()?;
                tracing::debug!(collection = name, purged, "bootstrap seed purged");
                Ok(table)
            }
        }
    }

    /// Opens an existing collection, recovering from the WAL.
    pub fn open<P: AsRef<Path>>(path: P, name: &str, sync_mode: SyncMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !Self::exists(&path) {
            return Err(Error::CollectionNotFound(name.to_string()));
        }
        let table = Self::load(path, name, sync_mode)?;
        let purged = table.purge_seed_rows()?;
        if purged > 0 {
            tracing::warn!(collection = name, purged, "purged leftover bootstrap seed rows");
        }
        Ok(table)
    }

    fn load(path: PathBuf, name: &str, sync_mode: SyncMode) -> Result<Self> {
        let meta = read_meta(&path)?;
        if meta.format_version > FORMAT_VERSION {
            return Err(Error::Configuration(format!(
                "collection format {} is newer than supported format {}",
                meta.format_version, FORMAT_VERSION
            )));
        }

        let mut data_file = DataFile::open(path.join(DATA_FILE))?;
        let wal_path = path.join(WAL_FILE);

        let mut rows = BTreeMap::new();
        let mut seen = HashSet::new();
        let mut max_row_id = None;
        for record in data_file.scan()? {
            seen.insert(record.row.row_id);
            max_row_id = max_row_id.max(Some(record.row.row_id));
            if !record.deleted {
                rows.insert(
                    record.row.row_id,
                    StoredRow {
                        row: record.row,
                        offset: record.offset,
                    },
                );
            }
        }

        let entries = Wal::read_all(&wal_path)?;
        let replayed = entries.len();
        for entry in entries {
            match entry {
                WalEntry::Append { row } => {
                    max_row_id = max_row_id.max(Some(row.row_id));
                    if seen.insert(row.row_id) {
                        let offset = data_file.append(&row)?;
                        rows.insert(row.row_id, StoredRow { row, offset });
                    }
                }
                WalEntry::Delete { row_ids } => {
                    for row_id in row_ids {
                        if let Some(stored) = rows.remove(&row_id) {
                            data_file.mark_deleted(stored.offset)?;
                        }
                    }
                }
                WalEntry::Checkpoint => {}
            }
        }

        for stored in rows.values() {
            if stored.row.vector.len() != meta.dimension {
                return Err(Error::IoError(format!(
                    "row {} has {} dimensions, collection has {}",
                    stored.row.id,
                    stored.row.vector.len(),
                    meta.dimension
                )));
            }
        }

        let next_row_id = meta.next_row_id.max(max_row_id.map_or(0, |id| id + 1));
        let mut wal = Wal::open(&wal_path, sync_mode)?;
        if replayed > 0 {
            data_file.flush()?;
            wal.checkpoint()?;
            write_meta(
                &path,
                &TableMeta {
                    next_row_id,
                    ..meta.clone()
                },
            )?;
            tracing::debug!(collection = name, replayed, "replayed WAL entries");
        }

        let vector_index = load_index::<IvfPqIndex>(&path, IndexKind::Vector, name)
            .filter(|idx| idx.dimension() == meta.dimension);
        let text_index = load_index::<TextIndex>(&path, IndexKind::Text, name);

        Ok(Self {
            name: name.to_string(),
            path,
            schema: TableSchema {
                dimension: meta.dimension,
                metric: meta.metric,
            },
            bootstrap: meta.bootstrap,
            created_at: meta.created_at,
            rows: RwLock::new(rows),
            writer: Mutex::new(Writer {
                wal,
                data_file,
                next_row_id,
                pending_tombstones: Vec::new(),
            }),
            vector_index: RwLock::new(vector_index.map(Arc::new)),
            text_index: RwLock::new(text_index.map(Arc::new)),
            dropped: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> TableSchema {
        self.schema
    }

    pub fn dimension(&self) -> usize {
        self.schema.dimension
    }

    pub fn metric(&self) -> DistanceMetric {
        self.schema.metric
    }

    pub fn bootstrap(&self) -> BootstrapMode {
        self.bootstrap
    }

    /// RFC 3339 creation time.
    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    /// Number of live rows.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Appends one row. The row is visible to readers once this returns.
    pub fn append(&self, id: String, text: String, vector: Vec<f32>, metadata: String) -> Result<Row> {
        self.check_live()?;
        if vector.len() != self.schema.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.schema.dimension,
                got: vector.len(),
            });
        }
        if id == SEED_ROW_ID {
            return Err(Error::InvalidInput(format!("id '{}' is reserved", SEED_ROW_ID)));
        }

        let mut writer = self.writer.lock();
        let row = Row {
            row_id: writer.next_row_id,
            id,
            text,
            vector,
            metadata,
        };

        writer.wal.append(&WalEntry::Append { row: row.clone() })?;
        writer.next_row_id += 1;

        let offset = match writer.data_file.append(&row) {
            Ok(offset) => offset,
            Err(e) => {
                // Keep replay from resurrecting a row the caller saw fail.
                if let Err(undo) = writer.wal.append(&WalEntry::Delete {
                    row_ids: vec![row.row_id],
                }) {
                    tracing::error!(collection = %self.name, error = %undo, "failed to log compensating delete");
                }
                return Err(e);
            }
        };

        self.rows.write().insert(
            row.row_id,
            StoredRow {
                row: row.clone(),
                offset,
            },
        );
        Ok(row)
    }

    /// Deletes every row matching `filter`. Returns the number removed.
    pub fn delete_where(&self, filter: &Filter) -> Result<usize> {
        self.check_live()?;
        let mut writer = self.writer.lock();
        let targets: Vec<(RowId, u64)> = {
            let rows = self.rows.read();
            rows.values()
                .filter(|stored| self.matches(filter, &stored.row))
                .map(|stored| (stored.row.row_id, stored.offset))
                .collect()
        };
        self.remove_rows(&mut writer, &targets)?;
        Ok(targets.len())
    }

    fn remove_rows(&self, writer: &mut Writer, targets: &[(RowId, u64)]) -> Result<()> {
        if targets.is_empty() {
            return Ok(());
        }
        writer.wal.append(&WalEntry::Delete {
            row_ids: targets.iter().map(|(id, _)| *id).collect(),
        })?;

        {
            let mut rows = self.rows.write();
            for (row_id, _) in targets {
                rows.remove(row_id);
            }
        }

        for (_, offset) in targets {
            if let Err(e) = writer.data_file.mark_deleted(*offset) {
                tracing::warn!(collection = %self.name, error = %e, "tombstone deferred to next flush");
                writer.pending_tombstones.push(*offset);
            }
        }
        Ok(())
    }

    fn purge_seed_rows(&self) -> Result<usize> {
        let mut writer = self.writer.lock();
        let targets: Vec<(RowId, u64)> = self
            .rows
            .read()
            .values()
            .filter(|stored| stored.row.id == SEED_ROW_ID)
            .map(|stored| (stored.row.row_id, stored.offset))
            .collect();
        self.remove_rows(&mut writer, &targets)?;
        Ok(targets.len())
    }

    /// Counts live rows, optionally narrowed by a filter.
    pub fn count(&self, filter: Option<&Filter>) -> Result<usize> {
        self.check_live()?;
        let rows = self.rows.read();
        Ok(match filter {
            None => rows.len(),
            Some(filter) => rows
                .values()
                .filter(|stored| self.matches(filter, &stored.row))
                .count(),
        })
    }

    /// Returns the most recently written row with this id.
    pub fn get(&self, id: &str) -> Result<Option<Row>> {
        self.check_live()?;
        let rows = self.rows.read();
        Ok(rows
            .values()
            .rev()
            .find(|stored| stored.row.id == id)
            .map(|stored| stored.row.clone()))
    }

    /// Makes all writes durable, checkpoints the WAL and saves the schema.
    pub fn flush(&self) -> Result<()> {
        let mut writer = self.writer.lock();

        let pending = std::mem::take(&mut writer.pending_tombstones);
        for (i, offset) in pending.iter().enumerate() {
            if let Err(e) = writer.data_file.mark_deleted(*offset) {
                writer.pending_tombstones.extend_from_slice(&pending[i..]);
                return Err(e);
            }
        }

        writer.data_file.flush()?;
        writer.wal.checkpoint()?;
        write_meta(
            &self.path,
            &TableMeta {
                format_version: FORMAT_VERSION,
                dimension: self.schema.dimension,
                metric: self.schema.metric,
                bootstrap: self.bootstrap,
                next_row_id: writer.next_row_id,
                created_at: self.created_at.clone(),
            },
        )
    }

    /// Builds (or rebuilds) an index. A failed build leaves the previous
    /// index in place.
    pub fn build_index(&self, request: &IndexRequest) -> Result<IndexInfo> {
        self.check_live()?;
        match request {
            IndexRequest::Vector(config) => {
                config.validate()?;
                let (snapshot, watermark) = self.snapshot(|row| row.vector.clone());
                let refs: Vec<(RowId, &[f32])> = snapshot
                    .iter()
                    .map(|(id, v)| (*id, v.as_slice()))
                    .collect();
                let built = IvfPqIndex::build(
                    &refs,
                    self.schema.dimension,
                    watermark,
                    self.schema.metric,
                    config,
                )?;
                index::save_snapshot(&self.index_path(IndexKind::Vector), &built)?;
                tracing::info!(
                    collection = %self.name,
                    rows = built.indexed_rows(),
                    partitions = built.partitions(),
                    subvectors = built.subvectors(),
                    "vector index built"
                );
                *self.vector_index.write() = Some(Arc::new(built));
            }
            IndexRequest::Text => {
                let (snapshot, watermark) = self.snapshot(|row| row.text.clone());
                let built = TextIndex::build(
                    snapshot.iter().map(|(id, text)| (*id, text.as_str())),
                    watermark,
                );
                index::save_snapshot(&self.index_path(IndexKind::Text), &built)?;
                tracing::info!(
                    collection = %self.name,
                    rows = built.indexed_rows(),
                    terms = built.term_count(),
                    "text index built"
                );
                *self.text_index.write() = Some(Arc::new(built));
            }
        }

        self.list_indices()?
            .into_iter()
            .find(|info| info.kind == request.kind())
            .ok_or_else(|| Error::IndexError("index vanished after build".into()))
    }

    /// Describes the indexes currently in use.
    pub fn list_indices(&self) -> Result<Vec<IndexInfo>> {
        self.check_live()?;
        let rows = self.rows.read();
        let unindexed = |watermark: RowId| rows.range(watermark..).count();

        let mut out = Vec::new();
        if let Some(idx) = self.vector_index() {
            out.push(IndexInfo {
                kind: IndexKind::Vector,
                indexed_rows: idx.indexed_rows(),
                unindexed_rows: unindexed(idx.watermark()),
                built_at: idx.built_at().to_string(),
                metric: Some(idx.metric()),
                partitions: Some(idx.partitions()),
                subvectors: Some(idx.subvectors()),
            });
        }
        if let Some(idx) = self.text_index() {
            out.push(IndexInfo {
                kind: IndexKind::Text,
                indexed_rows: idx.indexed_rows(),
                unindexed_rows: unindexed(idx.watermark()),
                built_at: idx.built_at().to_string(),
                metric: None,
                partitions: None,
                subvectors: None,
            });
        }
        Ok(out)
    }

    /// Copies one column of every live row, plus the first row id the copy
    /// does not cover.
    fn snapshot<T, F>(&self, column: F) -> (Vec<(RowId, T)>, RowId)
    where
        F: Fn(&Row) -> T,
    {
        let rows = self.rows.read();
        let values: Vec<(RowId, T)> = rows
            .values()
            .map(|stored| (stored.row.row_id, column(&stored.row)))
            .collect();
        let watermark = rows.keys().next_back().map_or(0, |id| id + 1);
        (values, watermark)
    }

    fn index_path(&self, kind: IndexKind) -> PathBuf {
        self.path.join(INDEX_DIR).join(kind.file_name())
    }

    pub(crate) fn vector_index(&self) -> Option<Arc<IvfPqIndex>> {
        self.vector_index.read().clone()
    }

    pub(crate) fn text_index(&self) -> Option<Arc<TextIndex>> {
        self.text_index.read().clone()
    }

    /// Shared view of the live rows.
    pub(crate) fn rows(&self) -> RwLockReadGuard<'_, BTreeMap<RowId, StoredRow>> {
        self.rows.read()
    }

    fn matches(&self, filter: &Filter, row: &Row) -> bool {
        let metadata = if filter.needs_decoded_metadata() {
            decode_metadata(&self.name, row)
        } else {
            Metadata::new()
        };
        filter.matches(&RowView {
            id: &row.id,
            text: &row.text,
            raw_metadata: &row.metadata,
            metadata: &metadata,
        })
    }

    /// Marks the handle unusable after its collection was dropped.
    pub(crate) fn mark_dropped(&self) {
        self.dropped.store(true, Ordering::SeqCst);
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }

    fn check_live(&self) -> Result<()> {
        if self.is_dropped() {
            return Err(Error::CollectionNotFound(self.name.clone()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("schema", &self.schema)
            .field("rows", &self.len())
            .finish()
    }
}

/// Decodes a row's stored metadata. A malformed string yields an empty map
/// and a warning rather than an error.
pub(crate) fn decode_metadata(collection: &str, row: &Row) -> Metadata {
    match Metadata::decode(&row.metadata) {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::warn!(
                collection,
                id = %row.id,
                error = %e,
                "stored metadata could not be decoded; returning empty metadata"
            );
            Metadata::new()
        }
    }
}

fn read_meta(path: &Path) -> Result<TableMeta> {
    let content = fs::read_to_string(path.join(META_FILE))
        .map_err(|e| Error::from_io("read meta failed", e))?;
    serde_json::from_str(&content).map_err(|e| Error::IoError(format!("parse meta failed: {}", e)))
}

fn write_meta(path: &Path, meta: &TableMeta) -> Result<()> {
    let content = serde_json::to_string_pretty(meta)
        .map_err(|e| Error::IoError(format!("serialize meta failed: {}", e)))?;
    let tmp = path.join("meta.json.tmp");
    fs::write(&tmp, content).map_err(|e| Error::from_io("write meta failed", e))?;
    fs::rename(&tmp, path.join(META_FILE)).map_err(|e| Error::from_io("publish meta failed", e))
}

/// Loads a persisted index. An unreadable snapshot is ignored; queries fall
/// back to a full scan.
fn load_index<T: serde::de::DeserializeOwned>(path: &Path, kind: IndexKind, name: &str) -> Option<T> {
    match index::load_snapshot(&path.join(INDEX_DIR).join(kind.file_name())) {
        Ok(index) => index,
        Err(e) => {
            tracing::warn!(collection = name, kind = %kind, error = %e, "ignoring unreadable index");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::VectorIndexConfig;

    fn schema(dimension: usize) -> TableSchema {
        TableSchema {
            dimension,
            metric: DistanceMetric::Euclidean,
        }
    }

    fn create(dir: &Path, bootstrap: BootstrapMode) -> Table {
        Table::create(dir.join("t"), "t", schema(3), SyncMode::Immediate, bootstrap).unwrap()
    }

    #[test]
    fn test_create_and_append() {
        let dir = tempfile::tempdir().unwrap();
        let table = create(dir.path(), BootstrapMode::Declared);
        assert!(table.is_empty());

        let row = table
            .append("a".into(), "alpha".into(), vec![1.0, 2.0, 3.0], r#"{"k":"v"}"#.into())
            .unwrap();
        assert_eq!(row.row_id, 0);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("a").unwrap().unwrap().text, "alpha");
    }

    #[test]
    fn test_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let table = create(dir.path(), BootstrapMode::Declared);
        let err = table
            .append("a".into(), "alpha".into(), vec![1.0, 2.0], "{}".into())
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 3, got: 2 }));
        assert!(table.is_empty());
    }

    #[test]
    fn test_seed_and_purge_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let table = create(dir.path(), BootstrapMode::SeedAndPurge);
        assert!(table.is_empty());
        assert!(table.get(SEED_ROW_ID).unwrap().is_none());

        // Seed consumed row id 0.
        let row = table
            .append("a".into(), "alpha".into(), vec![0.0; 3], "{}".into())
            .unwrap();
        assert_eq!(row.row_id, 1);
        drop(table);

        let reopened = Table::open(dir.path().join("t"), "t", SyncMode::Immediate).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.bootstrap(), BootstrapMode::SeedAndPurge);
    }

    #[test]
    fn test_reserved_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let table = create(dir.path(), BootstrapMode::Declared);
        assert!(table
            .append(SEED_ROW_ID.into(), "x".into(), vec![0.0; 3], "{}".into())
            .is_err());
    }

    #[test]
    fn test_delete_where() {
        let dir = tempfile::tempdir().unwrap();
        let table = create(dir.path(), BootstrapMode::Declared);
        for id in ["a", "b", "c"] {
            table
                .append(id.into(), format!("text {}", id), vec![0.0; 3], "{}".into())
                .unwrap();
        }

        assert_eq!(table.delete_where(&Filter::parse("id = 'b'").unwrap()).unwrap(), 1);
        assert_eq!(table.delete_where(&Filter::parse("id = 'zzz'").unwrap()).unwrap(), 0);
        assert_eq!(table.len(), 2);
        assert!(table.get("b").unwrap().is_none());
    }

    #[test]
    fn test_recovery_without_flush() {
        let dir = tempfile::tempdir().unwrap();
        {
            let table = create(dir.path(), BootstrapMode::Declared);
            table.append("a".into(), "x".into(), vec![1.0; 3], "{}".into()).unwrap();
            table.append("b".into(), "y".into(), vec![2.0; 3], "{}".into()).unwrap();
            table.delete_where(&Filter::parse("id = 'a'").unwrap()).unwrap();
            // No flush: the WAL carries everything.
        }

        let table = Table::open(dir.path().join("t"), "t", SyncMode::Immediate).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.get("b").unwrap().is_some());

        let row = table.append("c".into(), "z".into(), vec![3.0; 3], "{}".into()).unwrap();
        assert_eq!(row.row_id, 2);
    }

    #[test]
    fn test_replay_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        {
            let table = create(dir.path(), BootstrapMode::Declared);
            table.append("a".into(), "x".into(), vec![1.0; 3], "{}".into()).unwrap();
        }
        for _ in 0..3 {
            let table = Table::open(dir.path().join("t"), "t", SyncMode::Immediate).unwrap();
            assert_eq!(table.len(), 1);
        }
    }

    #[test]
    fn test_open_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = Table::open(dir.path().join("nope"), "nope", SyncMode::Immediate).unwrap_err();
        assert!(matches!(err, Error::CollectionNotFound(_)));
    }

    #[test]
    fn test_dropped_handle_rejects_operations() {
        let dir = tempfile::tempdir().unwrap();
        let table = create(dir.path(), BootstrapMode::Declared);
        table.mark_dropped();
        let err = table
            .append("a".into(), "x".into(), vec![1.0; 3], "{}".into())
            .unwrap_err();
        assert!(matches!(err, Error::CollectionNotFound(_)));
    }

    #[test]
    fn test_index_build_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        {
            let table = create(dir.path(), BootstrapMode::Declared);
            for i in 0..20 {
                table
                    .append(format!("d{}", i), format!("doc number {}", i), vec![i as f32, 1.0, 0.0], "{}".into())
                    .unwrap();
            }
            let info = table
                .build_index(&IndexRequest::Vector(
                    VectorIndexConfig::new().with_partitions(4).with_subvectors(3),
                ))
                .unwrap();
            assert_eq!(info.indexed_rows, 20);
            assert!(!info.is_stale());

            table.build_index(&IndexRequest::Text).unwrap();
            table.append("late".into(), "late".into(), vec![0.0; 3], "{}".into()).unwrap();
            table.flush().unwrap();
        }

        let table = Table::open(dir.path().join("t"), "t", SyncMode::Immediate).unwrap();
        let infos = table.list_indices().unwrap();
        assert_eq!(infos.len(), 2);
        assert!(infos.iter().all(|i| i.unindexed_rows == 1));
    }

    #[test]
    fn test_failed_build_keeps_previous_index() {
        let dir = tempfile::tempdir().unwrap();
        let table = create(dir.path(), BootstrapMode::Declared);
        for i in 0..4 {
            table
                .append(format!("d{}", i), "t".into(), vec![i as f32, 0.0, 1.0], "{}".into())
                .unwrap();
        }
        table
            .build_index(&IndexRequest::Vector(VectorIndexConfig::new().with_partitions(2).with_subvectors(1)))
            .unwrap();

        let err = table
            .build_index(&IndexRequest::Vector(VectorIndexConfig::new().with_partitions(8).with_subvectors(1)))
            .unwrap_err();
        assert!(matches!(err, Error::IndexError(_)));
        assert_eq!(table.list_indices().unwrap()[0].partitions, Some(2));
    }
}
