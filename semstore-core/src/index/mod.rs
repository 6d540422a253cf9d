//! Optional accelerating structures over a collection.
//!
//! Two kinds exist: an IVF-PQ index over the vector column and an inverted
//! BM25 index over the text column. Neither is required for correctness;
//! queries fall back to a full scan when no usable index is present.
//!
//! Indexes are snapshots. A rebuild always covers every live row at build
//! time and replaces the previous index of the same kind.

pub mod flat;
pub mod ivf_pq;
pub mod kmeans;
pub mod text;

use std::fmt;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::distance::DistanceMetric;
use crate::document::RowId;
use crate::error::{Error, Result};

pub use flat::{SearchResult, TopK};
pub use ivf_pq::IvfPqIndex;
pub use text::TextIndex;

/// Which column an index covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Vector,
    Text,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Vector => "vector",
            IndexKind::Text => "text",
        }
    }

    /// File name of the persisted snapshot under `indices/`.
    pub(crate) fn file_name(&self) -> &'static str {
        match self {
            IndexKind::Vector => "vector.json",
            IndexKind::Text => "text.json",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for an IVF-PQ build. Unset fields are derived from the data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorIndexConfig {
    /// Number of IVF partitions. Default: ⌈√rows⌉.
    pub partitions: Option<usize>,
    /// Number of PQ sub-vectors. Must divide the dimension.
    pub subvectors: Option<usize>,
    /// Metric the index is trained for. Default: the collection's metric.
    pub metric: Option<DistanceMetric>,
    /// K-means iteration cap. Default: 50.
    pub max_iterations: Option<usize>,
    /// Training rows per partition. Default: 256.
    pub sample_rate: Option<usize>,
}

impl VectorIndexConfig {
    pub const DEFAULT_MAX_ITERATIONS: usize = 50;
    pub const DEFAULT_SAMPLE_RATE: usize = 256;

    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the partition count. Chainable.
    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = Some(partitions);
        self
    }

    /// Sets the sub-vector count. Chainable.
    pub fn with_subvectors(mut self, subvectors: usize) -> Self {
        self.subvectors = Some(subvectors);
        self
    }

    /// Sets the metric. Chainable.
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = Some(metric);
        self
    }

    /// Sets the k-means iteration cap. Chainable.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// Checks parameters that do not depend on the data.
    pub fn validate(&self) -> Result<()> {
        if self.partitions == Some(0) {
            return Err(Error::InvalidInput("partitions must be at least 1".into()));
        }
        if self.subvectors == Some(0) {
            return Err(Error::InvalidInput("subvectors must be at least 1".into()));
        }
        if self.max_iterations == Some(0) {
            return Err(Error::InvalidInput("max_iterations must be at least 1".into()));
        }
        if self.sample_rate == Some(0) {
            return Err(Error::InvalidInput("sample_rate must be at least 1".into()));
        }
        Ok(())
    }
}

/// Largest divisor of `dimension` that is at most `dimension / 8` (minimum 1).
pub fn default_subvectors(dimension: usize) -> usize {
    let cap = (dimension / 8).max(1);
    (1..=cap).rev().find(|m| dimension % m == 0).unwrap_or(1)
}

/// An index build request, as accepted by `create_index`.
///
/// On the wire this is `{"type": "vector", "partitions": 4, "subvectors": 2}`
/// or `{"type": "text"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IndexRequest {
    Vector(VectorIndexConfig),
    Text,
}

impl IndexRequest {
    /// A vector index with derived parameters.
    pub fn vector() -> Self {
        IndexRequest::Vector(VectorIndexConfig::default())
    }

    pub fn text() -> Self {
        IndexRequest::Text
    }

    pub fn kind(&self) -> IndexKind {
        match self {
            IndexRequest::Vector(_) => IndexKind::Vector,
            IndexRequest::Text => IndexKind::Text,
        }
    }
}

/// Description of a built index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub kind: IndexKind,
    /// Rows covered when the index was built.
    pub indexed_rows: usize,
    /// Live rows written after the build, answered by exact scan.
    pub unindexed_rows: usize,
    /// RFC 3339 build time.
    pub built_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<DistanceMetric>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partitions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subvectors: Option<usize>,
}

impl IndexInfo {
    /// True when rows were written after the build.
    pub fn is_stale(&self) -> bool {
        self.unindexed_rows > 0
    }
}

/// Rows with ids at or above the watermark were written after the build.
pub(crate) fn is_covered(row_id: RowId, watermark: RowId) -> bool {
    row_id < watermark
}

/// Writes an index snapshot atomically (temp file, then rename).
pub(crate) fn save_snapshot<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::from_io("create index dir failed", e))?;
    }
    let bytes = serde_json::to_vec(value)
        .map_err(|e| Error::IndexError(format!("serialize index failed: {}", e)))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).map_err(|e| Error::from_io("write index failed", e))?;
    fs::rename(&tmp, path).map_err(|e| Error::from_io("publish index failed", e))?;
    Ok(())
}

/// Loads an index snapshot if one exists.
pub(crate) fn load_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path).map_err(|e| Error::from_io("read index failed", e))?;
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| Error::IndexError(format!("parse index {} failed: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_subvectors() {
        assert_eq!(default_subvectors(384), 48);
        assert_eq!(default_subvectors(16), 2);
        assert_eq!(default_subvectors(3), 1);
        assert_eq!(default_subvectors(100), 10);
        assert_eq!(default_subvectors(1), 1);
    }

    #[test]
    fn test_index_request_wire_format() {
        let req: IndexRequest =
            serde_json::from_str(r#"{"type":"vector","partitions":4,"subvectors":2}"#).unwrap();
        assert_eq!(
            req,
            IndexRequest::Vector(VectorIndexConfig::new().with_partitions(4).with_subvectors(2))
        );

        let req: IndexRequest = serde_json::from_str(r#"{"type":"text"}"#).unwrap();
        assert_eq!(req.kind(), IndexKind::Text);

        assert!(serde_json::from_str::<IndexRequest>(r#"{"type":"graph"}"#).is_err());
    }

    #[test]
    fn test_config_validation() {
        assert!(VectorIndexConfig::new().validate().is_ok());
        assert!(VectorIndexConfig::new().with_partitions(0).validate().is_err());
        assert!(VectorIndexConfig::new().with_subvectors(0).validate().is_err());
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indices").join("x.json");
        assert!(load_snapshot::<Vec<u32>>(&path).unwrap().is_none());
        save_snapshot(&path, &vec![1u32, 2, 3]).unwrap();
        assert_eq!(load_snapshot::<Vec<u32>>(&path).unwrap(), Some(vec![1, 2, 3]));
    }
}
