//! # semstore Core
//!
//! Core library for semstore, a persistent semantic document store.
//!
//! Documents (`id`, `text`, `vector`, `metadata`) live in named collections
//! that are created lazily on first access and persist across restarts. Text
//! is embedded at write time by a pluggable [`EmbeddingProvider`]; queries
//! combine structured predicates with vector, semantic or BM25 keyword search.
//!
//! ## Crate Features
//!
//! - `remote` (default) - HTTP embedding backends ([`RemoteEmbedder`])
//!
//! ## Core Types
//!
//! ### Store
//!
//! - [`Store`] - Async facade: write, query, delete, drop, index management
//! - [`StoreConfig`] - Storage root, default collection, metric, timeouts, embedder
//! - [`SchemaManager`] - Lazy per-name collection creation and handle cache
//!
//! ### Persistence
//!
//! - [`Table`] - One collection on disk with WAL durability
//!
//! ### Querying
//!
//! - [`QueryRequest`] - One search criterion plus filter, columns and limit
//! - [`Filter`] - Predicate over `id`, `text` and `metadata`
//!
//! ### Indexes
//!
//! - [`IvfPqIndex`] - Partitioned, product-quantized approximate vector index
//! - [`TextIndex`] - Inverted index for BM25 full-text search
//!
//! ### Embeddings
//!
//! - [`EmbeddingProvider`] - Capability interface for text embedding
//! - [`HashingEmbedder`] - Local deterministic feature-hashing model

pub mod config;
pub mod distance;
pub mod document;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod index;
pub mod metadata;
pub mod query;
pub mod schema;
pub mod storage;
pub mod store;
pub mod table;

// Re-exports for convenient access
pub use config::{validate_collection_name, BootstrapMode, StoreConfig, DEFAULT_COLLECTION};
pub use distance::DistanceMetric;
pub use document::{Column, NewDocument, Row, RowId};
#[cfg(feature = "remote")]
pub use embedding::{RemoteApi, RemoteEmbedder, RemoteEmbedderConfig};
pub use embedding::{EmbedderConfig, EmbeddingProvider, HashingEmbedder, DEFAULT_DIMENSION};
pub use error::{Error, ErrorKind, Result, ResultExt};
pub use filter::{Filter, FilterCondition};
pub use index::{IndexInfo, IndexKind, IndexRequest, IvfPqIndex, TextIndex, VectorIndexConfig};
pub use metadata::{Metadata, MetadataValue, TIMESTAMP_KEY};
pub use query::{QueryBody, QueryHit, QueryRequest, SearchCriterion, SearchOptions};
pub use schema::SchemaManager;
pub use storage::SyncMode;
pub use store::Store;
pub use table::{Table, TableSchema};

/// Re-export commonly used types for convenience.
///
/// # Example
///
/// ```rust
/// use semstore_core::prelude::*;
///
/// let doc = NewDocument::new("Apple Inc designs consumer electronics")
///     .with_metadata(Metadata::new().with_field("symbol", "AAPL"));
/// let request = QueryRequest::semantic("consumer electronics company").with_limit(1);
/// assert!(doc.validate().is_ok());
/// assert_eq!(request.limit, Some(1));
/// ```
pub mod prelude {
    pub use crate::{
        DistanceMetric, EmbedderConfig, EmbeddingProvider, Error, ErrorKind, Filter, IndexRequest,
        Metadata, MetadataValue, NewDocument, QueryHit, QueryRequest, Result, SearchOptions,
        Store, StoreConfig, VectorIndexConfig,
    };
}
