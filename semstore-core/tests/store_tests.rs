//! End-to-end tests for the async store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use semstore_core::prelude::*;
use semstore_core::{BootstrapMode, IndexKind, SearchCriterion, TIMESTAMP_KEY};

const DIM: usize = 64;

async fn open(dir: &std::path::Path) -> Store {
    Store::open(StoreConfig::new(dir).with_embedder(EmbedderConfig::hashing(DIM)))
        .await
        .unwrap()
}

fn profile(text: &str, symbol: &str) -> NewDocument {
    NewDocument::new(text).with_metadata(
        Metadata::new()
            .with_field("symbol", symbol)
            .with_field("data_type", "profile"),
    )
}

#[tokio::test]
async fn test_profile_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;

    store
        .write("profiles", profile("Apple Inc designs consumer electronics", "AAPL"))
        .await
        .unwrap();
    store
        .write("profiles", profile("JPMorgan Chase provides banking services", "JPM"))
        .await
        .unwrap();
    store
        .write("profiles", profile("Exxon Mobil explores for oil and gas", "XOM"))
        .await
        .unwrap();

    let query = store.embed("consumer electronics company").await.unwrap();
    let hits = store
        .query(QueryRequest::vector(query).in_collection("profiles").with_limit(1))
        .await
        .unwrap();

    assert_eq!(hits.len(), 1);
    let metadata = hits[0].metadata.clone().unwrap();
    assert_eq!(metadata.get_str("symbol"), Some("AAPL"));
    assert_eq!(metadata.get_str("data_type"), Some("profile"));
    assert!(metadata.get_str(TIMESTAMP_KEY).is_some());
    assert_eq!(metadata.len(), 3);
    assert!(hits[0].score.is_some());
}

#[tokio::test]
async fn test_semantic_query_matches_vector_query() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    for (text, symbol) in [
        ("Apple Inc designs consumer electronics", "AAPL"),
        ("Pfizer develops vaccines and medicines", "PFE"),
    ] {
        store.write("profiles", profile(text, symbol)).await.unwrap();
    }

    let semantic = store
        .query(QueryRequest::semantic("vaccines").in_collection("profiles"))
        .await
        .unwrap();
    let vector = store.embed("vaccines").await.unwrap();
    let explicit = store
        .query(QueryRequest::vector(vector).in_collection("profiles"))
        .await
        .unwrap();

    assert_eq!(semantic, explicit);
    assert_eq!(
        semantic[0].metadata.as_ref().unwrap().get_str("symbol"),
        Some("PFE")
    );
}

#[tokio::test]
async fn test_metadata_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    let original = Metadata::new()
        .with_field("symbol", "AAPL")
        .with_field("year", 2024i64)
        .with_field("ratio", 1.5)
        .with_field("audited", true)
        .with_field("note", MetadataValue::Null);

    let id = store
        .write("filings", NewDocument::new("annual report").with_metadata(original.clone()))
        .await
        .unwrap();

    let hits = store
        .query(QueryRequest::predicate(format!("id = '{}'", id)).in_collection("filings"))
        .await
        .unwrap();
    let mut returned = hits[0].metadata.clone().unwrap();
    assert!(returned.remove(TIMESTAMP_KEY).is_some());
    assert_eq!(returned, original);
    assert!(hits[0].score.is_none());
}

#[tokio::test]
async fn test_dimension_mismatch_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;

    let err = store
        .write("notes", NewDocument::new("short").with_vector(vec![0.5; 3]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.to_string().contains("expected 64, got 3"));
    assert_eq!(store.count_rows("notes", None).await.unwrap(), 0);

    let err = store
        .query(QueryRequest::vector(vec![0.5; 3]).in_collection("notes"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn test_reopen_with_other_dimension_fails_loudly() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = open(dir.path()).await;
        store.write("notes", NewDocument::new("hello")).await.unwrap();
    }
    let store = Store::open(StoreConfig::new(dir.path()).with_embedder(EmbedderConfig::hashing(32)))
        .await
        .unwrap();
    let err = store.write("notes", NewDocument::new("again")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(err.to_string().contains("notes"));
}

#[tokio::test]
async fn test_concurrent_lazy_creation() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(
        Store::open(
            StoreConfig::new(dir.path())
                .with_embedder(EmbedderConfig::hashing(DIM))
                .with_bootstrap(BootstrapMode::SeedAndPurge),
        )
        .await
        .unwrap(),
    );

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .write("shared", NewDocument::new(format!("document number {}", i)))
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(store.list_collections().await.unwrap(), vec!["shared"]);
    assert_eq!(store.count_rows("shared", None).await.unwrap(), 16);
    let seeds = store
        .count_rows("shared", Some("id = '__semstore_seed__'"))
        .await
        .unwrap();
    assert_eq!(seeds, 0);
}

#[tokio::test]
async fn test_delete_then_query() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    store
        .write("notes", NewDocument::new("keep me").with_id("K"))
        .await
        .unwrap();
    store
        .write("notes", NewDocument::new("remove me").with_id("X"))
        .await
        .unwrap();

    assert_eq!(store.delete("notes", "id = 'nobody'").await.unwrap(), 0);
    assert_eq!(store.count_rows("notes", None).await.unwrap(), 2);

    assert_eq!(store.delete("notes", "id = 'X'").await.unwrap(), 1);
    let hits = store
        .query(QueryRequest::predicate("id = 'X'").in_collection("notes"))
        .await
        .unwrap();
    assert!(hits.is_empty());

    let everything = store.embed("remove me").await.unwrap();
    let hits = store
        .query(QueryRequest::vector(everything).in_collection("notes"))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "K");
}

#[tokio::test]
async fn test_drop_then_write() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    store.write("news", NewDocument::new("old headline")).await.unwrap();

    store.drop_collection("news").await.unwrap();
    let err = store.drop_collection("news").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    assert_eq!(store.count_rows("news", None).await.unwrap(), 0);
    store.write("news", NewDocument::new("new headline")).await.unwrap();
    assert_eq!(store.count_rows("news", None).await.unwrap(), 1);
}

#[tokio::test]
async fn test_empty_collection_query() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    let hits = store
        .query(QueryRequest::vector(vec![0.1; DIM]).in_collection("never_written"))
        .await
        .unwrap();
    assert!(hits.is_empty());

    let hits = store
        .query(QueryRequest::full_text("anything").in_collection("never_written"))
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_default_collection_used_when_unspecified() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    store
        .write(store.default_collection(), NewDocument::new("in the default"))
        .await
        .unwrap();
    let hits = store
        .query(QueryRequest::predicate("text LIKE '%default%'"))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(store.list_collections().await.unwrap(), vec!["default"]);
}

#[tokio::test]
async fn test_index_policy_with_too_few_rows() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    for text in ["alpha report", "beta report", "gamma report"] {
        store.write("small", NewDocument::new(text)).await.unwrap();
    }

    let err = store
        .create_index(
            "small",
            IndexRequest::Vector(VectorIndexConfig::new().with_partitions(4).with_subvectors(2)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert!(err.to_string().contains("needs at least 4 rows"));
    assert!(store.list_indices("small").await.unwrap().is_empty());

    let query = store.embed("beta report").await.unwrap();
    let hits = store
        .query(QueryRequest::vector(query).in_collection("small").with_limit(3))
        .await
        .unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].text.as_deref(), Some("beta report"));
}

#[tokio::test]
async fn test_indexed_search_and_persistence() {
    let dir = tempfile::tempdir().unwrap();
    let topics = [
        "interest rates", "oil prices", "chip shortage", "retail sales", "housing market",
        "vaccine trial", "cloud revenue", "electric vehicles", "airline demand", "crop yields",
    ];
    {
        let store = open(dir.path()).await;
        for round in 0..3 {
            for topic in topics {
                store
                    .write(
                        "news",
                        NewDocument::new(format!("{} update {}", topic, round)),
                    )
                    .await
                    .unwrap();
            }
        }
        let info = store
            .create_index(
                "news",
                IndexRequest::Vector(VectorIndexConfig::new().with_partitions(4)),
            )
            .await
            .unwrap();
        assert_eq!(info.indexed_rows, 30);
        store.create_index("news", IndexRequest::Text).await.unwrap();
        store
            .write("news", NewDocument::new("breaking semiconductor tariff news"))
            .await
            .unwrap();
        store.flush("news").await.unwrap();
    }

    let store = open(dir.path()).await;
    let indices = store.list_indices("news").await.unwrap();
    assert_eq!(indices.len(), 2);
    assert!(indices.iter().all(|info| info.unindexed_rows == 1));
    assert!(indices.iter().any(|info| info.kind == IndexKind::Text));

    // A row written after the build is still found.
    let query = store.embed("breaking semiconductor tariff news").await.unwrap();
    let options = SearchOptions {
        nprobes: 4,
        refine_factor: 4,
        ..SearchOptions::default()
    };
    let hits = store
        .query(
            QueryRequest::vector(query)
                .in_collection("news")
                .with_limit(1)
                .with_options(options),
        )
        .await
        .unwrap();
    assert_eq!(hits[0].text.as_deref(), Some("breaking semiconductor tariff news"));

    let hits = store
        .query(QueryRequest::full_text("semiconductor tariff").in_collection("news"))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].score.unwrap() > 0.0);

    let hits = store
        .query(
            QueryRequest::full_text("oil prices")
                .in_collection("news")
                .with_filter("text LIKE '%update 2'"),
        )
        .await
        .unwrap();
    assert_eq!(hits[0].text.as_deref(), Some("oil prices update 2"));
}

#[tokio::test]
async fn test_query_body_round_trip_from_json() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path()).await;
    store
        .write("profiles", profile("Apple Inc designs consumer electronics", "AAPL"))
        .await
        .unwrap();

    let body: semstore_core::QueryBody = serde_json::from_str(
        r#"{"collection":"profiles","semantic":"electronics","select":["id","metadata"],"limit":5}"#,
    )
    .unwrap();
    let request = QueryRequest::try_from(body).unwrap();
    assert!(matches!(request.criterion, Some(SearchCriterion::Semantic(_))));

    let hits = store.query(request).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].text.is_none());
    assert!(hits[0].metadata.is_some());
}

struct SlowProvider;

#[async_trait]
impl EmbeddingProvider for SlowProvider {
    async fn embed(&self, _text: &str) -> semstore_core::Result<Vec<f32>> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(vec![1.0; 4])
    }

    fn dimension(&self) -> usize {
        4
    }
}

#[tokio::test]
async fn test_timeout_is_transient_and_leaves_store_usable() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(dir.path()).with_operation_timeout(Some(Duration::from_millis(100)));
    let store = Store::open_with_provider(config, Arc::new(SlowProvider))
        .await
        .unwrap();

    let err = store.write("slow", NewDocument::new("text")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransientIo);
    assert!(err.is_transient());

    assert_eq!(store.count_rows("slow", None).await.unwrap(), 0);
    store
        .write("slow", NewDocument::new("precomputed").with_vector(vec![0.5; 4]))
        .await
        .unwrap();
    assert_eq!(store.count_rows("slow", None).await.unwrap(), 1);
}

/// Runs `test` on a runtime whose blocking pool has a single thread, so that
/// storage work can be made to queue behind a busy thread.
fn with_one_blocking_thread<F: std::future::Future<Output = ()>>(test: F) {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .max_blocking_threads(1)
        .enable_all()
        .build()
        .unwrap()
        .block_on(test);
}

async fn occupy_blocking_pool(hold: Duration) -> tokio::task::JoinHandle<()> {
    let busy = tokio::task::spawn_blocking(move || std::thread::sleep(hold));
    tokio::time::sleep(Duration::from_millis(20)).await;
    busy
}

#[test]
fn test_timed_out_write_is_not_persisted() {
    with_one_blocking_thread(async {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path())
            .with_embedder(EmbedderConfig::hashing(4))
            .with_operation_timeout(Some(Duration::from_millis(100)));
        let store = Store::open(config).await.unwrap();
        store
            .write("c", NewDocument::new("first").with_vector(vec![1.0; 4]))
            .await
            .unwrap();

        let busy = occupy_blocking_pool(Duration::from_millis(400)).await;
        let err = store
            .write(
                "c",
                NewDocument::new("second").with_id("X").with_vector(vec![0.5; 4]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransientIo);
        busy.await.unwrap();

        assert_eq!(store.count_rows("c", None).await.unwrap(), 1);
        assert!(store.get("c", "X").await.unwrap().is_none());

        // A retry succeeds exactly once.
        store
            .write(
                "c",
                NewDocument::new("second").with_id("X").with_vector(vec![0.5; 4]),
            )
            .await
            .unwrap();
        assert_eq!(store.count_rows("c", Some("id = 'X'")).await.unwrap(), 1);
    });
}

#[test]
fn test_timed_out_delete_removes_nothing() {
    with_one_blocking_thread(async {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path())
            .with_embedder(EmbedderConfig::hashing(4))
            .with_operation_timeout(Some(Duration::from_millis(100)));
        let store = Store::open(config).await.unwrap();
        for value in [0.1, 0.2, 0.3] {
            store
                .write("c", NewDocument::new("row").with_vector(vec![value; 4]))
                .await
                .unwrap();
        }

        let busy = occupy_blocking_pool(Duration::from_millis(400)).await;
        let err = store.delete("c", "TRUE").await.unwrap_err();
        assert!(err.is_transient());
        busy.await.unwrap();

        assert_eq!(store.count_rows("c", None).await.unwrap(), 3);
    });
}
