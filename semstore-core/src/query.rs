//! Query engine: request model and execution against a [`Table`].
//!
//! A request carries exactly one search criterion plus an optional filter,
//! column selection and limit. Everything that can be checked without
//! storage is checked in [`QueryRequest::prepare`].

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::distance::DistanceMetric;
use crate::document::{Column, Row};
use crate::error::{Error, Result};
use crate::filter::{Filter, RowView};
use crate::index::text::{bm25_search, TextIndex};
use crate::index::{is_covered, SearchResult, TopK};
use crate::metadata::Metadata;
use crate::table::{decode_metadata, Table};

/// Rows returned when a request gives no limit.
pub const DEFAULT_LIMIT: usize = 10;
pub const DEFAULT_NPROBES: usize = 20;
pub const DEFAULT_REFINE_FACTOR: usize = 1;

/// What a query searches by.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchCriterion {
    /// Structured predicate over `id`, `text` and `metadata`. No ranking.
    Predicate(String),
    /// Similarity search with a caller-supplied vector.
    Vector(Vec<f32>),
    /// Embed the text with the active provider, then search by similarity.
    Semantic(String),
    /// BM25 keyword search over the text column.
    FullText(String),
}

/// Tuning knobs for similarity and keyword search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Overrides the collection metric. An index trained for another metric
    /// is bypassed.
    pub metric: Option<DistanceMetric>,
    /// IVF partitions probed per query.
    pub nprobes: usize,
    /// Index candidates fetched per result slot before exact re-ranking.
    pub refine_factor: usize,
    /// Apply the filter before ranking. When false, the filter runs after
    /// top-k selection and may return fewer rows than the limit.
    pub prefilter: bool,
    /// Ignore any index and scan every row.
    pub bypass_index: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            metric: None,
            nprobes: DEFAULT_NPROBES,
            refine_factor: DEFAULT_REFINE_FACTOR,
            prefilter: true,
            bypass_index: false,
        }
    }
}

impl SearchOptions {
    fn validate(&self) -> Result<()> {
        if self.nprobes == 0 {
            return Err(Error::InvalidInput("nprobes must be at least 1".into()));
        }
        if self.refine_factor == 0 {
            return Err(Error::InvalidInput("refine_factor must be at least 1".into()));
        }
        Ok(())
    }
}

/// A retrieval request.
///
/// # Example
///
/// ```
/// use semstore_core::QueryRequest;
///
/// let request = QueryRequest::semantic("consumer electronics company")
///     .in_collection("profiles")
///     .with_filter("metadata.data_type = 'profile'")
///     .with_limit(1);
/// assert_eq!(request.limit, Some(1));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRequest {
    /// Target collection; the store default when absent.
    pub collection: Option<String>,
    pub criterion: Option<SearchCriterion>,
    /// Additional conjunctive predicate.
    pub filter: Option<String>,
    /// Columns to materialize. `id` and `score` are always present.
    pub select: Option<Vec<String>>,
    pub limit: Option<usize>,
    pub options: SearchOptions,
}

impl QueryRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn predicate(predicate: impl Into<String>) -> Self {
        Self::with_criterion(SearchCriterion::Predicate(predicate.into()))
    }

    pub fn vector(vector: Vec<f32>) -> Self {
        Self::with_criterion(SearchCriterion::Vector(vector))
    }

    pub fn semantic(text: impl Into<String>) -> Self {
        Self::with_criterion(SearchCriterion::Semantic(text.into()))
    }

    pub fn full_text(text: impl Into<String>) -> Self {
        Self::with_criterion(SearchCriterion::FullText(text.into()))
    }

    fn with_criterion(criterion: SearchCriterion) -> Self {
        Self {
            criterion: Some(criterion),
            ..Self::default()
        }
    }

    /// Targets a collection. Chainable.
    pub fn in_collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    /// Adds a structured filter. Chainable.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Restricts the materialized columns. Chainable.
    pub fn with_select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the result limit. Chainable.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Replaces the search options. Chainable.
    pub fn with_options(mut self, options: SearchOptions) -> Self {
        self.options = options;
        self
    }

    /// Validates the request. Fails before any storage access.
    pub(crate) fn prepare(self) -> Result<PreparedQuery> {
        let criterion = match self.criterion {
            None => return Err(Error::InvalidInput("no search criterion provided".into())),
            Some(SearchCriterion::Predicate(p)) => Criterion::Predicate(Filter::parse(&p)?),
            Some(SearchCriterion::Vector(v)) => {
                if v.is_empty() {
                    return Err(Error::InvalidInput("query vector is empty".into()));
                }
                if v.iter().any(|x| !x.is_finite()) {
                    return Err(Error::InvalidInput(
                        "query vector contains non-finite values".into(),
                    ));
                }
                Criterion::Vector(v)
            }
            Some(SearchCriterion::Semantic(t)) => {
                if t.trim().is_empty() {
                    return Err(Error::InvalidInput("semantic query text is empty".into()));
                }
                Criterion::Semantic(t)
            }
            Some(SearchCriterion::FullText(t)) => {
                if t.trim().is_empty() {
                    return Err(Error::InvalidInput("full-text query is empty".into()));
                }
                Criterion::FullText(t)
            }
        };

        let filter = self.filter.as_deref().map(Filter::parse).transpose()?;
        let columns = match &self.select {
            Some(select) => ColumnSet::from_names(select)?,
            None => ColumnSet::default(),
        };
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if limit == 0 {
            return Err(Error::InvalidInput("limit must be at least 1".into()));
        }
        self.options.validate()?;

        Ok(PreparedQuery {
            collection: self.collection,
            criterion,
            filter,
            columns,
            limit,
            options: self.options,
        })
    }
}

/// JSON form of a retrieval request.
///
/// `text` is a structured predicate; `semantic` is text to embed;
/// `full_text` is a keyword query. Exactly one of `text`, `vector`,
/// `semantic` and `full_text` must be present.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryBody {
    pub collection: Option<String>,
    pub text: Option<String>,
    pub vector: Option<Vec<f32>>,
    pub semantic: Option<String>,
    pub full_text: Option<String>,
    pub filter: Option<String>,
    pub select: Option<Vec<String>>,
    pub limit: Option<usize>,
    pub metric: Option<DistanceMetric>,
    pub nprobes: Option<usize>,
    pub refine_factor: Option<usize>,
    pub prefilter: Option<bool>,
    pub bypass_index: Option<bool>,
}

impl TryFrom<QueryBody> for QueryRequest {
    type Error = Error;

    fn try_from(body: QueryBody) -> Result<Self> {
        let mut criteria = Vec::with_capacity(1);
        if let Some(p) = body.text {
            criteria.push(SearchCriterion::Predicate(p));
        }
        if let Some(v) = body.vector {
            criteria.push(SearchCriterion::Vector(v));
        }
        if let Some(t) = body.semantic {
            criteria.push(SearchCriterion::Semantic(t));
        }
        if let Some(t) = body.full_text {
            criteria.push(SearchCriterion::FullText(t));
        }
        if criteria.len() > 1 {
            return Err(Error::InvalidInput(
                "exactly one of text, vector, semantic or full_text may be given".into(),
            ));
        }

        let defaults = SearchOptions::default();
        Ok(QueryRequest {
            collection: body.collection,
            criterion: criteria.pop(),
            filter: body.filter,
            select: body.select,
            limit: body.limit,
            options: SearchOptions {
                metric: body.metric,
                nprobes: body.nprobes.unwrap_or(defaults.nprobes),
                refine_factor: body.refine_factor.unwrap_or(defaults.refine_factor),
                prefilter: body.prefilter.unwrap_or(defaults.prefilter),
                bypass_index: body.bypass_index.unwrap_or(defaults.bypass_index),
            },
        })
    }
}

/// One result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    /// Distance for similarity search (lower is better), BM25 score for
    /// full-text search (higher is better), absent for predicate queries.
    pub score: Option<f32>,
}

/// Which optional columns a result materializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSet {
    pub text: bool,
    pub vector: bool,
    pub metadata: bool,
}

impl Default for ColumnSet {
    fn default() -> Self {
        Self {
            text: true,
            vector: false,
            metadata: true,
        }
    }
}

impl ColumnSet {
    /// Every column.
    pub const ALL: ColumnSet = ColumnSet {
        text: true,
        vector: true,
        metadata: true,
    };

    fn from_names(names: &[String]) -> Result<Self> {
        let mut set = ColumnSet {
            text: false,
            vector: false,
            metadata: false,
        };
        for name in names {
            match Column::from_str(name)? {
                Column::Id => {}
                Column::Text => set.text = true,
                Column::Vector => set.vector = true,
                Column::Metadata => set.metadata = true,
            }
        }
        Ok(set)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Criterion {
    Predicate(Filter),
    Vector(Vec<f32>),
    Semantic(String),
    FullText(String),
}

/// A validated request.
#[derive(Debug, Clone)]
pub(crate) struct PreparedQuery {
    pub(crate) collection: Option<String>,
    pub(crate) criterion: Criterion,
    pub(crate) filter: Option<Filter>,
    pub(crate) columns: ColumnSet,
    pub(crate) limit: usize,
    pub(crate) options: SearchOptions,
}

impl PreparedQuery {
    /// Text still to be embedded, if this is a semantic query.
    pub(crate) fn semantic_text(&self) -> Option<&str> {
        match &self.criterion {
            Criterion::Semantic(t) => Some(t),
            _ => None,
        }
    }

    /// Replaces a semantic criterion with its embedding.
    pub(crate) fn resolve_semantic(&mut self, vector: Vec<f32>) {
        if matches!(self.criterion, Criterion::Semantic(_)) {
            self.criterion = Criterion::Vector(vector);
        }
    }
}

/// Evaluates the optional filter against rows of one table.
struct Matcher<'a> {
    collection: &'a str,
    filter: Option<&'a Filter>,
}

impl Matcher<'_> {
    fn accepts(&self, row: &Row) -> bool {
        match self.filter {
            None => true,
            Some(filter) => matches_filter(self.collection, filter, row),
        }
    }
}

fn matches_filter(collection: &str, filter: &Filter, row: &Row) -> bool {
    let metadata = if filter.needs_decoded_metadata() {
        decode_metadata(collection, row)
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

/// Runs a prepared query against a table.
pub(crate) fn execute(table: &Table, query: &PreparedQuery) -> Result<Vec<QueryHit>> {
    let hits = match &query.criterion {
        Criterion::Predicate(predicate) => predicate_scan(table, predicate, query),
        Criterion::Vector(vector) => vector_search(table, vector, query)?,
        Criterion::FullText(text) => full_text_search(table, text, query),
        Criterion::Semantic(_) => {
            return Err(Error::InvalidInput(
                "semantic query reached execution without an embedding".into(),
            ))
        }
    };
    tracing::debug!(collection = table.name(), hits = hits.len(), "query executed");
    Ok(hits)
}

fn predicate_scan(table: &Table, predicate: &Filter, query: &PreparedQuery) -> Vec<QueryHit> {
    let matcher = Matcher {
        collection: table.name(),
        filter: query.filter.as_ref(),
    };
    let rows = table.rows();
    rows.values()
        .map(|stored| &stored.row)
        .filter(|row| matches_filter(table.name(), predicate, row) && matcher.accepts(row))
        .take(query.limit)
        .map(|row| to_hit(table.name(), row, query.columns, None))
        .collect()
}

fn vector_search(table: &Table, vector: &[f32], query: &PreparedQuery) -> Result<Vec<QueryHit>> {
    if vector.len() != table.dimension() {
        return Err(Error::DimensionMismatch {
            expected: table.dimension(),
            got: vector.len(),
        });
    }
    let metric = query.options.metric.unwrap_or(table.metric());
    let prefilter = query.options.prefilter;
    let matcher = Matcher {
        collection: table.name(),
        filter: query.filter.as_ref(),
    };

    let rows = table.rows();
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let eligible = |row: &Row| !prefilter || matcher.accepts(row);
    let mut top = TopK::new(query.limit);

    let index = table
        .vector_index()
        .filter(|idx| !query.options.bypass_index && idx.metric() == metric);

    match index {
        Some(idx) => {
            let candidates = query.limit.saturating_mul(query.options.refine_factor);
            let approximate = idx.search(vector, query.options.nprobes, candidates, |row_id| {
                rows.get(&row_id).map_or(false, |stored| eligible(&stored.row))
            });
            for candidate in approximate {
                if let Some(stored) = rows.get(&candidate.row_id) {
                    top.push(SearchResult::new(
                        candidate.row_id,
                        metric.compute(vector, &stored.row.vector),
                    ));
                }
            }
            // Rows written after the build are scanned exactly.
            for (row_id, stored) in rows.range(idx.watermark()..) {
                debug_assert!(!is_covered(*row_id, idx.watermark()));
                if eligible(&stored.row) {
                    top.push(SearchResult::new(*row_id, metric.compute(vector, &stored.row.vector)));
                }
            }
        }
        None => {
            for (row_id, stored) in rows.iter() {
                if eligible(&stored.row) {
                    top.push(SearchResult::new(*row_id, metric.compute(vector, &stored.row.vector)));
                }
            }
        }
    }

    Ok(top
        .into_sorted_vec()
        .into_iter()
        .filter_map(|result| rows.get(&result.row_id).map(|s| (s, result.distance)))
        .filter(|(stored, _)| prefilter || matcher.accepts(&stored.row))
        .map(|(stored, distance)| to_hit(table.name(), &stored.row, query.columns, Some(distance)))
        .collect())
}

fn full_text_search(table: &Table, text: &str, query: &PreparedQuery) -> Vec<QueryHit> {
    let prefilter = query.options.prefilter;
    let matcher = Matcher {
        collection: table.name(),
        filter: query.filter.as_ref(),
    };
    let rows = table.rows();
    if rows.is_empty() {
        return Vec::new();
    }

    let index = table.text_index().filter(|_| !query.options.bypass_index);
    let watermark = index.as_ref().map_or(0, |idx| idx.watermark());
    let delta = TextIndex::build(
        rows.range(watermark..)
            .map(|(row_id, stored)| (*row_id, stored.row.text.as_str())),
        watermark,
    );
    let mut sources: Vec<&TextIndex> = Vec::with_capacity(2);
    if let Some(idx) = index.as_deref() {
        sources.push(idx);
    }
    sources.push(&delta);

    let alive = |row_id| rows.contains_key(&row_id);
    let accept = |row_id| {
        rows.get(&row_id)
            .map_or(false, |stored| !prefilter || matcher.accepts(&stored.row))
    };

    bm25_search(&sources, text, alive, accept, Some(query.limit))
        .into_iter()
        .filter_map(|(row_id, score)| rows.get(&row_id).map(|s| (s, score)))
        .filter(|(stored, _)| prefilter || matcher.accepts(&stored.row))
        .map(|(stored, score)| to_hit(table.name(), &stored.row, query.columns, Some(score)))
        .collect()
}

pub(crate) fn to_hit(collection: &str, row: &Row, columns: ColumnSet, score: Option<f32>) -> QueryHit {
    QueryHit {
        id: row.id.clone(),
        text: columns.text.then(|| row.text.clone()),
        vector: columns.vector.then(|| row.vector.clone()),
        metadata: columns.metadata.then(|| decode_metadata(collection, row)),
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BootstrapMode;
    use crate::index::{IndexRequest, VectorIndexConfig};
    use crate::storage::SyncMode;
    use crate::table::TableSchema;

    fn table(dir: &std::path::Path) -> Table {
        let schema = TableSchema {
            dimension: 2,
            metric: DistanceMetric::Euclidean,
        };
        let table = Table::create(dir.join("q"), "q", schema, SyncMode::NoSync, BootstrapMode::Declared)
            .unwrap();
        let docs = [
            ("a", "apple designs consumer electronics", [0.0, 0.0], r#"{"symbol":"AAPL","n":1}"#),
            ("b", "bank offers mortgages", [1.0, 0.0], r#"{"symbol":"JPM","n":2}"#),
            ("c", "chip maker for consumer devices", [2.0, 0.0], r#"{"symbol":"NVDA","n":3}"#),
            ("d", "drug research company", [3.0, 0.0], "not json"),
        ];
        for (id, text, v, meta) in docs {
            table
                .append(id.into(), text.into(), v.to_vec(), meta.into())
                .unwrap();
        }
        table
    }

    fn run(table: &Table, request: QueryRequest) -> Vec<QueryHit> {
        execute(table, &request.prepare().unwrap()).unwrap()
    }

    fn ids(hits: &[QueryHit]) -> Vec<&str> {
        hits.iter().map(|h| h.id.as_str()).collect()
    }

    #[test]
    fn test_no_criterion() {
        let err = QueryRequest::new().prepare().unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(err.to_string().contains("no search criterion"));
    }

    #[test]
    fn test_invalid_requests() {
        assert!(QueryRequest::vector(vec![1.0]).with_limit(0).prepare().is_err());
        assert!(QueryRequest::vector(vec![]).prepare().is_err());
        assert!(QueryRequest::vector(vec![1.0])
            .with_select(["id", "embedding"])
            .prepare()
            .is_err());
        assert!(QueryRequest::vector(vec![1.0])
            .with_filter("vector = 1")
            .prepare()
            .is_err());
        assert!(QueryRequest::predicate("   ").prepare().is_err());
    }

    #[test]
    fn test_body_requires_exactly_one_criterion() {
        let body: QueryBody =
            serde_json::from_str(r#"{"text":"id = 'a'","vector":[1.0,2.0]}"#).unwrap();
        assert!(QueryRequest::try_from(body).is_err());

        let body: QueryBody = serde_json::from_str(r#"{"limit":3}"#).unwrap();
        let request = QueryRequest::try_from(body).unwrap();
        assert!(request.prepare().is_err());

        let body: QueryBody =
            serde_json::from_str(r#"{"vector":[1.0],"nprobes":4,"prefilter":false}"#).unwrap();
        let request = QueryRequest::try_from(body).unwrap();
        assert_eq!(request.options.nprobes, 4);
        assert!(!request.options.prefilter);
        assert_eq!(request.options.refine_factor, DEFAULT_REFINE_FACTOR);
    }

    #[test]
    fn test_vector_search_ranks_ascending() {
        let dir = tempfile::tempdir().unwrap();
        let table = table(dir.path());
        let hits = run(&table, QueryRequest::vector(vec![2.1, 0.0]).with_limit(3));
        assert_eq!(ids(&hits), vec!["c", "d", "b"]);
        let scores: Vec<f32> = hits.iter().map(|h| h.score.unwrap()).collect();
        assert!(scores.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_vector_search_with_filter() {
        let dir = tempfile::tempdir().unwrap();
        let table = table(dir.path());
        let hits = run(
            &table,
            QueryRequest::vector(vec![3.0, 0.0]).with_filter("metadata.n <= 2"),
        );
        assert_eq!(ids(&hits), vec!["b", "a"]);
    }

    #[test]
    fn test_postfilter_may_return_fewer() {
        let dir = tempfile::tempdir().unwrap();
        let table = table(dir.path());
        let options = SearchOptions {
            prefilter: false,
            ..SearchOptions::default()
        };
        let hits = run(
            &table,
            QueryRequest::vector(vec![3.0, 0.0])
                .with_filter("metadata.symbol = 'AAPL'")
                .with_limit(2)
                .with_options(options),
        );
        assert!(hits.is_empty());
    }

    #[test]
    fn test_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let table = table(dir.path());
        let prepared = QueryRequest::vector(vec![1.0, 2.0, 3.0]).prepare().unwrap();
        let err = execute(&table, &prepared).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, got: 3 }));
    }

    #[test]
    fn test_predicate_scan_has_no_score() {
        let dir = tempfile::tempdir().unwrap();
        let table = table(dir.path());
        let hits = run(&table, QueryRequest::predicate("text LIKE '%consumer%'"));
        assert_eq!(ids(&hits), vec!["a", "c"]);
        assert!(hits.iter().all(|h| h.score.is_none()));
    }

    #[test]
    fn test_column_selection() {
        let dir = tempfile::tempdir().unwrap();
        let table = table(dir.path());
        let hits = run(
            &table,
            QueryRequest::predicate("id = 'a'").with_select(["vector"]),
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].vector, Some(vec![0.0, 0.0]));
        assert!(hits[0].text.is_none());
        assert!(hits[0].metadata.is_none());
    }

    #[test]
    fn test_bad_metadata_yields_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let table = table(dir.path());
        let hits = run(&table, QueryRequest::predicate("id = 'd'"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata, Some(Metadata::new()));
    }

    #[test]
    fn test_full_text_with_and_without_index() {
        let dir = tempfile::tempdir().unwrap();
        let table = table(dir.path());
        let scan = run(&table, QueryRequest::full_text("consumer"));
        assert_eq!(scan.len(), 2);

        table.build_index(&IndexRequest::Text).unwrap();
        table
            .append("e".into(), "consumer consumer consumer".into(), vec![9.0, 9.0], "{}".into())
            .unwrap();
        let indexed = run(&table, QueryRequest::full_text("consumer"));
        assert_eq!(indexed.len(), 3);
        assert_eq!(indexed[0].id, "e");
        assert!(indexed[0].score.unwrap() >= indexed[1].score.unwrap());
    }

    #[test]
    fn test_index_merges_unindexed_rows_and_skips_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let table = table(dir.path());
        table
            .build_index(&IndexRequest::Vector(
                VectorIndexConfig::new().with_partitions(2).with_subvectors(1),
            ))
            .unwrap();
        table
            .append("fresh".into(), "new".into(), vec![10.0, 0.0], "{}".into())
            .unwrap();
        table.delete_where(&Filter::parse("id = 'd'").unwrap()).unwrap();

        let options = SearchOptions {
            nprobes: 2,
            ..SearchOptions::default()
        };
        let hits = run(
            &table,
            QueryRequest::vector(vec![9.0, 0.0]).with_limit(2).with_options(options),
        );
        assert_eq!(ids(&hits), vec!["fresh", "c"]);
    }

    #[test]
    fn test_metric_override_bypasses_index() {
        let dir = tempfile::tempdir().unwrap();
        let table = table(dir.path());
        table
            .build_index(&IndexRequest::Vector(
                VectorIndexConfig::new().with_partitions(2).with_subvectors(1),
            ))
            .unwrap();
        let options = SearchOptions {
            metric: Some(DistanceMetric::DotProduct),
            ..SearchOptions::default()
        };
        let hits = run(
            &table,
            QueryRequest::vector(vec![1.0, 0.0]).with_limit(1).with_options(options),
        );
        // Largest dot product wins.
        assert_eq!(ids(&hits), vec!["d"]);
    }
}
