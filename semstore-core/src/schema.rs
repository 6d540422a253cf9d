//! Collection lifecycle: lazy creation, handle caching and drop.
//!
//! Handles are cached for the lifetime of the manager and evicted only by
//! [`SchemaManager::drop_collection`]. Creation of a given name is serialized
//! by a per-name async guard held only across the create-or-open step and
//! forgotten once uncontended; traffic on an already-resolved handle never
//! touches it.
//!
//! A new collection is assembled in a hidden staging directory and published
//! with a single rename, so a failed or cancelled creation never leaves a
//! half-built collection under the real name.

use std::collections::HashMap;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::config::{validate_collection_name, BootstrapMode};
use crate::distance::DistanceMetric;
use crate::error::{Error, Result, ResultExt};
use crate::storage::SyncMode;
use crate::table::{Table, TableSchema};

const STAGING_MARKER: &str = ".creating-";
const DROPPED_MARKER: &str = ".dropped-";

/// Runs blocking storage work off the async executor.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::IoError(format!("blocking task failed: {}", e)))?
}

/// Operation deadline shared by every phase of one store call.
///
/// Phases that can be abandoned (resolving a handle, embedding) run under
/// [`Deadline::run`]. A mutation handed to the blocking pool cannot be
/// cancelled, so it calls [`Deadline::check`] when it starts and is then
/// awaited to completion: once a mutation has begun, the caller sees its real
/// result rather than a timeout.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    at: Option<(Instant, Duration)>,
}

impl Deadline {
    pub(crate) fn after(limit: Option<Duration>) -> Self {
        Self {
            at: limit.map(|limit| (Instant::now() + limit, limit)),
        }
    }

    pub(crate) fn none() -> Self {
        Self { at: None }
    }

    /// Fails with `Timeout` once the deadline has passed.
    pub(crate) fn check(&self) -> Result<()> {
        match self.at {
            Some((at, limit)) if Instant::now() >= at => Err(Error::Timeout(limit)),
            _ => Ok(()),
        }
    }

    /// Runs an abandonable phase, dropping it when the deadline passes.
    pub(crate) async fn run<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.at {
            Some((at, limit)) => {
                tokio::time::timeout_at(tokio::time::Instant::from_std(at), operation)
                    .await
                    .map_err(|_| Error::Timeout(limit))?
            }
            None => operation.await,
        }
    }

    /// Runs a mutation on the blocking pool. The mutation is skipped if the
    /// deadline passed while it was queued; otherwise its result is returned
    /// however long it takes.
    pub(crate) async fn commit<T, F>(&self, mutation: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let deadline = *self;
        run_blocking(move || {
            deadline.check()?;
            mutation()
        })
        .await
    }
}

/// Owns the mapping from collection name to its live handle.
pub struct SchemaManager {
    root: PathBuf,
    metric: DistanceMetric,
    sync_mode: SyncMode,
    bootstrap: BootstrapMode,
    handles: RwLock<HashMap<String, Arc<Table>>>,
    guards: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SchemaManager {
    /// Creates a manager over `root`. Does no I/O.
    pub fn new<P: AsRef<Path>>(
        root: P,
        metric: DistanceMetric,
        sync_mode: SyncMode,
        bootstrap: BootstrapMode,
    ) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            metric,
            sync_mode,
            bootstrap,
            handles: RwLock::new(HashMap::new()),
            guards: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the root directory and removes leftovers of interrupted
    /// creations and drops.
    pub async fn prepare_root(&self) -> Result<()> {
        let root = self.root.clone();
        run_blocking(move || {
            fs::create_dir_all(&root)
                .map_err(|e| Error::from_io("create storage root failed", e))?;
            let entries =
                fs::read_dir(&root).map_err(|e| Error::from_io("read storage root failed", e))?;
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.')
                    && (name.contains(STAGING_MARKER) || name.contains(DROPPED_MARKER))
                {
                    tracing::warn!(dir = %name, "removing leftover collection directory");
                    if let Err(e) = fs::remove_dir_all(entry.path()) {
                        tracing::warn!(dir = %name, error = %e, "could not remove leftover directory");
                    }
                }
            }
            Ok(())
        })
        .await
    }

    /// Returns the handle for `name`, opening or creating the collection on
    /// first access. `dimension` is the embedding dimensionality the caller
    /// expects; an existing collection with another dimensionality is a
    /// configuration error.
    pub async fn resolve(&self, name: &str, dimension: usize) -> Result<Arc<Table>> {
        validate_collection_name(name)?;
        if let Some(table) = self.cached(name) {
            return check_dimension(table, dimension);
        }

        let guard = self.guard(name);
        let creating = guard.lock().await;
        // Another caller may have finished while we waited.
        let resolved = match self.cached(name) {
            Some(table) => check_dimension(table, dimension),
            None => self.open_or_create(name, dimension).await,
        };
        drop(creating);
        self.release_guard(name, guard);
        resolved
    }

    async fn open_or_create(&self, name: &str, dimension: usize) -> Result<Arc<Table>> {
        let path = self.collection_path(name);
        let staging = self
            .root
            .join(format!(".{}{}{}", name, STAGING_MARKER, uuid::Uuid::new_v4()));
        let schema = TableSchema {
            dimension,
            metric: self.metric,
        };
        let (sync_mode, bootstrap) = (self.sync_mode, self.bootstrap);
        let table_name = name.to_string();

        let (table, created) = run_blocking(move || {
            let created = if Table::exists(&path) {
                false
            } else {
                create_staged(&staging, &path, &table_name, schema, sync_mode, bootstrap)?
            };
            let table = Table::open(&path, &table_name, sync_mode)?;
            Ok((table, created))
        })
        .await
        .in_collection(name, "resolve collection")?;

        if created {
            tracing::info!(
                collection = name,
                dimension,
                metric = %self.metric,
                "collection created"
            );
        } else {
            tracing::debug!(collection = name, rows = table.len(), "collection opened");
        }

        let table = check_dimension(Arc::new(table), dimension)?;
        self.handles
            .write()
            .insert(name.to_string(), Arc::clone(&table));
        Ok(table)
    }

    /// Destroys a collection and evicts its handle. Handles already held by
    /// callers fail with `CollectionNotFound` afterwards.
    pub async fn drop_collection(&self, name: &str) -> Result<()> {
        self.drop_within(name, Deadline::none()).await
    }

    /// Drops `name`, giving up only while waiting for the per-name guard. Once
    /// the handle is evicted the removal runs to completion.
    pub(crate) async fn drop_within(&self, name: &str, deadline: Deadline) -> Result<()> {
        validate_collection_name(name)?;
        let guard = self.guard(name);
        let dropping = deadline.run(async { Ok(guard.lock().await) }).await?;
        deadline.check()?;

        if let Some(table) = self.handles.write().remove(name) {
            table.mark_dropped();
        }

        let path = self.collection_path(name);
        let graveyard = self
            .root
            .join(format!(".{}{}{}", name, DROPPED_MARKER, uuid::Uuid::new_v4()));
        let collection = name.to_string();
        let removed = run_blocking(move || {
            if !Table::exists(&path) {
                return Err(Error::CollectionNotFound(collection));
            }
            fs::rename(&path, &graveyard)
                .map_err(|e| Error::from_io("move collection aside failed", e))?;
            if let Err(e) = fs::remove_dir_all(&graveyard) {
                tracing::warn!(
                    collection = %collection,
                    error = %e,
                    "dropped collection files could not be removed"
                );
            }
            Ok(())
        })
        .await;
        drop(dropping);
        self.release_guard(name, guard);
        removed?;

        tracing::info!(collection = name, "collection dropped");
        Ok(())
    }

    /// Names of all persisted collections, sorted.
    pub async fn list_collections(&self) -> Result<Vec<String>> {
        let root = self.root.clone();
        run_blocking(move || {
            if !root.exists() {
                return Ok(Vec::new());
            }
            let entries =
                fs::read_dir(&root).map_err(|e| Error::from_io("read storage root failed", e))?;
            let mut names: Vec<String> = entries
                .flatten()
                .filter(|entry| Table::exists(entry.path()))
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .filter(|name| !name.starts_with('.'))
                .collect();
            names.sort();
            Ok(names)
        })
        .await
    }

    /// Handles currently cached.
    pub fn cached_handles(&self) -> Vec<Arc<Table>> {
        self.handles.read().values().cloned().collect()
    }

    fn cached(&self, name: &str) -> Option<Arc<Table>> {
        self.handles.read().get(name).cloned()
    }

    fn guard(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.guards
                .lock()
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Forgets the guard for `name` unless another caller holds it.
    fn release_guard(&self, name: &str, guard: Arc<tokio::sync::Mutex<()>>) {
        let mut guards = self.guards.lock();
        if let Some(current) = guards.get(name) {
            // One reference in the map, one in `guard`.
            if Arc::ptr_eq(current, &guard) && Arc::strong_count(&guard) == 2 {
                guards.remove(name);
            }
        }
    }

    #[cfg(test)]
    fn guard_count(&self) -> usize {
        self.guards.lock().len()
    }

    fn collection_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl std::fmt::Debug for SchemaManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaManager")
            .field("root", &self.root)
            .field("metric", &self.metric)
            .field("cached", &self.handles.read().len())
            .finish()
    }
}

fn check_dimension(table: Arc<Table>, expected: usize) -> Result<Arc<Table>> {
    if table.dimension() != expected {
        return Err(Error::Configuration(format!(
            "collection '{}' stores {}-dimensional vectors but the embedding provider produces {}; \
             changing dimensionality of an existing collection is not supported",
            table.name(),
            table.dimension(),
            expected
        )));
    }
    Ok(table)
}

/// Builds the collection in `staging` and renames it into place. Returns
/// false if another process published the collection first.
fn create_staged(
    staging: &Path,
    path: &Path,
    name: &str,
    schema: TableSchema,
    sync_mode: SyncMode,
    bootstrap: BootstrapMode,
) -> Result<bool> {
    let built = Table::create(staging, name, schema, sync_mode, bootstrap).and_then(|table| {
        table.flush()?;
        drop(table);
        Ok(())
    });
    if let Err(e) = built {
        let _ = fs::remove_dir_all(staging);
        return Err(e);
    }

    match fs::rename(staging, path) {
        Ok(()) => Ok(true),
        Err(_) if Table::exists(path) => {
            let _ = fs::remove_dir_all(staging);
            Ok(false)
        }
        Err(e) => {
            let _ = fs::remove_dir_all(staging);
            Err(Error::from_io("publish collection failed", e))
        }
    }
}
