//! Async store facade.
//!
//! `Store` ties the pieces together: it resolves collections through the
//! [`SchemaManager`], embeds text through the configured provider and runs
//! the blocking storage work on tokio's blocking pool. Every public operation
//! obeys the configured operation timeout. Mutations observe it only until
//! they start: a write, delete, index build or drop that has begun is awaited
//! to completion, so a timeout always means nothing was changed.

use std::future::Future;
use std::sync::Arc;

use crate::config::{validate_collection_name, StoreConfig};
use crate::document::NewDocument;
use crate::embedding::{EmbeddingProvider, LazyEmbedder};
use crate::error::{Error, Result, ResultExt};
use crate::filter::Filter;
use crate::index::{IndexInfo, IndexRequest};
use crate::metadata::TIMESTAMP_KEY;
use crate::query::{self, ColumnSet, PreparedQuery, QueryHit, QueryRequest};
use crate::schema::{run_blocking, Deadline, SchemaManager};
use crate::table::Table;

/// A persistent semantic document store.
///
/// # Example
///
/// ```no_run
/// use semstore_core::{Metadata, NewDocument, QueryRequest, Store, StoreConfig};
///
/// #[tokio::main]
/// async fn main() -> semstore_core::Result<()> {
///     let store = Store::open(StoreConfig::new("./semstore-data")).await?;
///
///     store
///         .write(
///             "profiles",
///             NewDocument::new("Apple Inc designs consumer electronics")
///                 .with_metadata(Metadata::new().with_field("symbol", "AAPL")),
///         )
///         .await?;
///
///     let hits = store
///         .query(QueryRequest::semantic("consumer electronics company").in_collection("profiles").with_limit(1))
///         .await?;
///     println!("{:?}", hits);
///     Ok(())
/// }
/// ```
pub struct Store {
    config: StoreConfig,
    schema: SchemaManager,
    embedder: LazyEmbedder,
}

impl Store {
    /// Opens a store with the embedding backend named in the config. The
    /// backend itself is constructed on first use.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let embedder = LazyEmbedder::new(config.embedder.clone());
        Self::open_inner(config, embedder).await
    }

    /// Opens a store around an already constructed embedding provider.
    /// `config.embedder` is ignored.
    pub async fn open_with_provider(
        config: StoreConfig,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        if provider.dimension() == 0 {
            return Err(Error::Configuration(
                "embedding provider reports dimension 0".into(),
            ));
        }
        let mut checked = config.clone();
        checked.embedder = crate::embedding::EmbedderConfig::hashing(provider.dimension());
        checked.validate()?;
        Self::open_inner(config, LazyEmbedder::with_provider(provider)).await
    }

    async fn open_inner(config: StoreConfig, embedder: LazyEmbedder) -> Result<Self> {
        let schema = SchemaManager::new(
            &config.root,
            config.metric,
            config.sync_mode,
            config.bootstrap,
        );
        let store = Self {
            config,
            schema,
            embedder,
        };
        store.bounded(store.schema.prepare_root()).await?;
        tracing::info!(
            root = %store.config.root.display(),
            default_collection = %store.config.default_collection,
            dimension = store.embedder.dimension(),
            "store opened"
        );
        Ok(store)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn default_collection(&self) -> &str {
        &self.config.default_collection
    }

    /// Dimensionality given to new collections.
    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// Appends one document and returns its id.
    ///
    /// The text is embedded unless the document carries a vector. The
    /// `timestamp` metadata key is overwritten with the insertion time.
    pub async fn write(&self, collection: &str, document: NewDocument) -> Result<String> {
        document.validate()?;
        validate_collection_name(collection)?;
        let id = document
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.write_inner(collection, id.clone(), document)
            .await
            .in_collection(collection, format!("write document {}", id))?;
        Ok(id)
    }

    async fn write_inner(&self, collection: &str, id: String, document: NewDocument) -> Result<()> {
        let deadline = self.deadline();
        let NewDocument {
            text,
            metadata,
            vector,
            ..
        } = document;
        let (table, vector) = deadline
            .run(async {
                let table = self.resolve(collection).await?;
                let vector = match vector {
                    Some(vector) => vector,
                    None => self.embedder.embed(&text).await?,
                };
                Ok((table, vector))
            })
            .await?;
        let mut metadata = metadata.unwrap_or_default();
        metadata.set(TIMESTAMP_KEY, chrono::Utc::now().to_rfc3339());
        let encoded = metadata.encode()?;

        let row = deadline
            .commit(move || table.append(id, text, vector, encoded))
            .await?;
        tracing::debug!(collection, id = %row.id, row_id = row.row_id, "document written");
        Ok(())
    }

    /// Appends documents one at a time, stopping at the first failure. The
    /// error names the documents already written.
    pub async fn write_batch(&self, collection: &str, documents: Vec<NewDocument>) -> Result<Vec<String>> {
        validate_collection_name(collection)?;
        let total = documents.len();
        let mut written = Vec::with_capacity(total);
        for document in documents {
            match self.write(collection, document).await {
                Ok(id) => written.push(id),
                Err(e) => {
                    return Err(e.in_collection(
                        collection,
                        format!(
                            "write batch (stopped after {} of {} documents; written: [{}])",
                            written.len(),
                            total,
                            written.join(", ")
                        ),
                    ))
                }
            }
        }
        Ok(written)
    }

    /// Runs a retrieval request. Malformed requests fail before any I/O.
    pub async fn query(&self, request: QueryRequest) -> Result<Vec<QueryHit>> {
        let prepared = request.prepare()?;
        let collection = prepared
            .collection
            .clone()
            .unwrap_or_else(|| self.config.default_collection.clone());
        validate_collection_name(&collection)?;

        self.bounded(self.query_inner(&collection, prepared))
            .await
            .in_collection(&collection, "query")
    }

    async fn query_inner(&self, collection: &str, mut prepared: PreparedQuery) -> Result<Vec<QueryHit>> {
        let table = self.resolve(collection).await?;
        if let Some(text) = prepared.semantic_text() {
            let vector = self.embedder.embed(text).await?;
            prepared.resolve_semantic(vector);
        }
        run_blocking(move || query::execute(&table, &prepared)).await
    }

    /// Embeds text with the active provider.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("text to embed must not be empty".into()));
        }
        self.bounded(self.embedder.embed(text)).await
    }

    /// Deletes every row matching `predicate`. Matching nothing is not an
    /// error. Deleting all rows requires the explicit predicate `TRUE`.
    pub async fn delete(&self, collection: &str, predicate: &str) -> Result<usize> {
        if predicate.trim().is_empty() {
            return Err(Error::InvalidInput(
                "delete predicate is empty; use TRUE to delete every row".into(),
            ));
        }
        let filter = Filter::parse(predicate)?;
        validate_collection_name(collection)?;

        let deadline = self.deadline();
        let removed = async {
            let table = deadline.run(self.resolve(collection)).await?;
            deadline.commit(move || table.delete_where(&filter)).await
        }
        .await
        .in_collection(collection, format!("delete where {}", predicate))?;
        tracing::debug!(collection, removed, "rows deleted");
        Ok(removed)
    }

    /// Irreversibly destroys a collection. A later write or query recreates
    /// it empty.
    pub async fn drop_collection(&self, collection: &str) -> Result<()> {
        self.schema.drop_within(collection, self.deadline()).await
    }

    /// Builds or rebuilds an index. The collection stays queryable by full
    /// scan whether or not the build succeeds.
    pub async fn create_index(&self, collection: &str, request: IndexRequest) -> Result<IndexInfo> {
        if let IndexRequest::Vector(config) = &request {
            config.validate()?;
        }
        validate_collection_name(collection)?;
        let kind = request.kind();
        let deadline = self.deadline();
        async {
            let table = deadline.run(self.resolve(collection)).await?;
            deadline.commit(move || table.build_index(&request)).await
        }
        .await
        .in_collection(collection, format!("create {} index", kind))
    }

    pub async fn list_indices(&self, collection: &str) -> Result<Vec<IndexInfo>> {
        validate_collection_name(collection)?;
        self.bounded(async {
            let table = self.resolve(collection).await?;
            run_blocking(move || table.list_indices()).await
        })
        .await
        .in_collection(collection, "list indices")
    }

    /// Counts rows, optionally narrowed by a predicate.
    pub async fn count_rows(&self, collection: &str, filter: Option<&str>) -> Result<usize> {
        let filter = filter.map(Filter::parse).transpose()?;
        validate_collection_name(collection)?;
        self.bounded(async {
            let table = self.resolve(collection).await?;
            run_blocking(move || table.count(filter.as_ref())).await
        })
        .await
        .in_collection(collection, "count rows")
    }

    pub async fn list_collections(&self) -> Result<Vec<String>> {
        self.bounded(self.schema.list_collections()).await
    }

    /// Fetches the latest row with `id`, all columns materialized.
    pub async fn get(&self, collection: &str, id: &str) -> Result<Option<QueryHit>> {
        validate_collection_name(collection)?;
        let id = id.to_string();
        self.bounded(async {
            let table = self.resolve(collection).await?;
            run_blocking(move || {
                Ok(table
                    .get(&id)?
                    .map(|row| query::to_hit(table.name(), &row, ColumnSet::ALL, None)))
            })
            .await
        })
        .await
        .in_collection(collection, "get")
    }

    /// Makes a collection's writes durable and checkpoints its WAL.
    pub async fn flush(&self, collection: &str) -> Result<()> {
        validate_collection_name(collection)?;
        self.bounded(async {
            let table = self.resolve(collection).await?;
            run_blocking(move || table.flush()).await
        })
        .await
        .in_collection(collection, "flush")
    }

    /// Flushes every open collection.
    pub async fn flush_all(&self) -> Result<()> {
        for table in self.schema.cached_handles() {
            let name = table.name().to_string();
            self.bounded(run_blocking(move || table.flush()))
                .await
                .in_collection(&name, "flush")?;
        }
        Ok(())
    }

    async fn resolve(&self, collection: &str) -> Result<Arc<Table>> {
        self.schema
            .resolve(collection, self.embedder.dimension())
            .await
    }

    fn deadline(&self) -> Deadline {
        Deadline::after(self.config.operation_timeout)
    }

    /// Bounds read-only and idempotent operations by the operation timeout.
    async fn bounded<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.deadline().run(operation).await
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.config)
            .field("schema", &self.schema)
            .field("embedder", &self.embedder)
            .finish()
    }
}
