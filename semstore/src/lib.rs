//! # semstore
//!
//! **A persistent semantic document store for retrieval-augmented tools.**
//!
//! semstore keeps text documents together with their embeddings and
//! metadata, and answers structured, semantic and keyword queries over them:
//!
//! - **Lazy collections** - A collection exists once it is first written or queried
//! - **Pluggable embeddings** - Local hashing model or an HTTP backend (Ollama, OpenAI-compatible)
//! - **Hybrid queries** - Vector similarity narrowed by metadata predicates
//! - **Durability** - WAL-based crash-safe storage, one directory per collection
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | **Search Criteria** | Predicate, vector, semantic (embed then search), BM25 full text |
//! | **Distance Metrics** | Euclidean, Cosine, DotProduct |
//! | **Indexes** | IVF-PQ for vectors, inverted index for text; both optional |
//! | **Predicates** | SQL-like filters over `id`, `text`, `metadata.<key>` |
//! | **Timeouts** | Every operation bounded by a configurable timeout |
//!
//! ## Quick Start
//!
//! ```no_run
//! use semstore::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let store = Store::open(StoreConfig::new("./semstore-data")).await?;
//!
//!     store
//!         .write(
//!             "profiles",
//!             NewDocument::new("Apple Inc designs consumer electronics").with_metadata(
//!                 Metadata::new()
//!                     .with_field("symbol", "AAPL")
//!                     .with_field("data_type", "profile"),
//!             ),
//!         )
//!         .await?;
//!
//!     let hits = store
//!         .query(
//!             QueryRequest::semantic("consumer electronics company")
//!                 .in_collection("profiles")
//!                 .with_filter("metadata.data_type = 'profile'")
//!                 .with_limit(1),
//!         )
//!         .await?;
//!
//!     for hit in hits {
//!         println!("{} {:?}", hit.id, hit.score);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Predicates
//!
//! ```rust
//! use semstore::prelude::*;
//!
//! let parsed = Filter::parse("metadata.symbol IN ('AAPL', 'MSFT') AND text LIKE '%cloud%'").unwrap();
//! let built = Filter::field("metadata.symbol").eq("AAPL").and(Filter::field("text").like("%cloud%"));
//! # let _ = (parsed, built);
//! ```
//!
//! ## Crate Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `remote` (default) | HTTP embedding backends via `reqwest` |
//!
//! ## Architecture
//!
//! semstore is organized into three crates:
//!
//! - **`semstore-core`** - Storage, indexes, embedding providers and the async store
//! - **`semstore`** - Main crate that re-exports everything
//! - **`semstore-server`** - HTTP/JSON front end for out-of-process callers
//!
//! ### Core Components
//!
//! - [`Store`] - Async facade, bounded by the operation timeout
//! - [`SchemaManager`] - Lazy collection creation and handle cache
//! - [`Table`] - One collection on disk with WAL durability
//! - [`IvfPqIndex`] - Approximate nearest neighbor index
//! - [`TextIndex`] - BM25 inverted index
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`](crate::Result). Branch on
//! [`Error::kind`] to decide between fixing configuration, reporting bad
//! input, or retrying a [`ErrorKind::TransientIo`] failure. The store never
//! retries internally.
//!
//! ## Thread Safety
//!
//! - [`Store`] is `Send + Sync`; share it behind an `Arc`
//! - [`Table`] uses internal locks; reads proceed concurrently with each other

// Re-export everything from core
pub use semstore_core::*;
