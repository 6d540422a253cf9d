//! IVF-PQ approximate nearest-neighbor index.
//!
//! Vectors are partitioned with k-means (the inverted file); each vector's
//! residual against its partition centroid is compressed with product
//! quantization into one byte per sub-vector. A query probes the `nprobes`
//! closest partitions and ranks their entries by asymmetric distance against
//! per-partition lookup tables.
//!
//! Cosine is handled by normalizing vectors at build and query time, which
//! makes squared L2 rank identically to cosine distance.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::flat::{SearchResult, TopK};
use super::kmeans::{kmeans, nearest_centroid};
use super::{default_subvectors, VectorIndexConfig};
use crate::distance::{dot_product, euclidean_distance_squared, normalize_in_place, DistanceMetric};
use crate::document::RowId;
use crate::error::{Error, Result};

/// Centroids per PQ codebook; codes are stored as one byte.
const MAX_CODEWORDS: usize = 256;

/// Seed for k-means so a rebuild over identical rows is reproducible.
const TRAINING_SEED: u64 = 0x5eed_1f_9a;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    row_id: RowId,
    codes: Vec<u8>,
}

/// A trained IVF-PQ index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IvfPqIndex {
    metric: DistanceMetric,
    dimension: usize,
    subvectors: usize,
    centroids: Vec<Vec<f32>>,
    /// `[subvector][codeword][component]`
    codebooks: Vec<Vec<Vec<f32>>>,
    lists: Vec<Vec<Entry>>,
    /// First row id not covered by this index.
    watermark: RowId,
    indexed_rows: usize,
    built_at: String,
}

impl IvfPqIndex {
    /// Trains an index over `rows`.
    ///
    /// `watermark` is the collection's next row id at build time; rows at or
    /// above it are answered by exact scan instead.
    pub fn build(
        rows: &[(RowId, &[f32])],
        dimension: usize,
        watermark: RowId,
        default_metric: DistanceMetric,
        config: &VectorIndexConfig,
    ) -> Result<Self> {
        config.validate()?;
        let n = rows.len();
        if n == 0 {
            return Err(Error::IndexError(
                "cannot build a vector index on an empty collection".into(),
            ));
        }

        let partitions = config
            .partitions
            .unwrap_or_else(|| (n as f64).sqrt().ceil() as usize)
            .max(1);
        if n < partitions {
            return Err(Error::IndexError(format!(
                "vector index with {} partitions needs at least {} rows, collection has {}",
                partitions, partitions, n
            )));
        }

        let subvectors = config
            .subvectors
            .unwrap_or_else(|| default_subvectors(dimension));
        if dimension % subvectors != 0 {
            return Err(Error::InvalidInput(format!(
                "dimension {} is not divisible by {} subvectors",
                dimension, subvectors
            )));
        }
        let sub_dim = dimension / subvectors;

        let metric = config.metric.unwrap_or(default_metric);
        let max_iterations = config
            .max_iterations
            .unwrap_or(VectorIndexConfig::DEFAULT_MAX_ITERATIONS);
        let sample_rate = config
            .sample_rate
            .unwrap_or(VectorIndexConfig::DEFAULT_SAMPLE_RATE);

        let prepared: Vec<Vec<f32>> = rows
            .iter()
            .map(|(_, v)| {
                if v.len() != dimension {
                    return Err(Error::DimensionMismatch {
                        expected: dimension,
                        got: v.len(),
                    });
                }
                Ok(prepare(metric, v))
            })
            .collect::<Result<_>>()?;

        let mut rng = StdRng::seed_from_u64(TRAINING_SEED);
        let sample_size = partitions.saturating_mul(sample_rate).min(n);
        let sample: Vec<usize> = if sample_size < n {
            let mut picked = rand::seq::index::sample(&mut rng, n, sample_size).into_vec();
            picked.sort_unstable();
            picked
        } else {
            (0..n).collect()
        };

        let training: Vec<&[f32]> = sample.iter().map(|&i| prepared[i].as_slice()).collect();
        let centroids = kmeans(&training, partitions, max_iterations, &mut rng);

        let assignments: Vec<usize> = prepared
            .iter()
            .map(|v| nearest_centroid(&centroids, v))
            .collect();
        let residuals: Vec<Vec<f32>> = prepared
            .iter()
            .zip(&assignments)
            .map(|(v, &c)| v.iter().zip(&centroids[c]).map(|(a, b)| a - b).collect())
            .collect();

        let codewords = MAX_CODEWORDS.min(sample.len());
        let mut codebooks = Vec::with_capacity(subvectors);
        for m in 0..subvectors {
            let range = m * sub_dim..(m + 1) * sub_dim;
            let points: Vec<&[f32]> = sample
                .iter()
                .map(|&i| &residuals[i][range.clone()])
                .collect();
            codebooks.push(kmeans(&points, codewords, max_iterations, &mut rng));
        }

        let mut lists: Vec<Vec<Entry>> = vec![Vec::new(); centroids.len()];
        for (i, (row_id, _)) in rows.iter().enumerate() {
            let codes = (0..subvectors)
                .map(|m| {
                    let sub = &residuals[i][m * sub_dim..(m + 1) * sub_dim];
                    nearest_centroid(&codebooks[m], sub) as u8
                })
                .collect();
            lists[assignments[i]].push(Entry {
                row_id: *row_id,
                codes,
            });
        }

        Ok(Self {
            metric,
            dimension,
            subvectors,
            centroids,
            codebooks,
            lists,
            watermark,
            indexed_rows: n,
            built_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Returns up to `k` candidates ranked by approximate distance.
    ///
    /// Only rows for which `accept` returns true are considered, so filters
    /// and deletions never consume result slots.
    pub fn search<F>(&self, query: &[f32], nprobes: usize, k: usize, accept: F) -> Vec<SearchResult>
    where
        F: Fn(RowId) -> bool,
    {
        if query.len() != self.dimension || k == 0 {
            return Vec::new();
        }
        let q = prepare(self.metric, query);
        let sub_dim = self.dimension / self.subvectors;

        let mut probes: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, self.coarse_distance(&q, c)))
            .collect();
        probes.sort_by(|a, b| a.1.total_cmp(&b.1));
        probes.truncate(nprobes.max(1));

        // Dot-product tables do not depend on the partition.
        let dot_table = match self.metric {
            DistanceMetric::DotProduct => Some(self.lookup_table(&q, sub_dim, dot_product)),
            _ => None,
        };

        let mut top = TopK::new(k);
        for (partition, _) in probes {
            let centroid = &self.centroids[partition];
            let (table, base) = match &dot_table {
                Some(_) => (None, -dot_product(&q, centroid)),
                None => {
                    let residual: Vec<f32> = q.iter().zip(centroid).map(|(a, b)| a - b).collect();
                    (
                        Some(self.lookup_table(&residual, sub_dim, euclidean_distance_squared)),
                        0.0,
                    )
                }
            };

            for entry in &self.lists[partition] {
                if !accept(entry.row_id) {
                    continue;
                }
                let distance = match (&table, &dot_table) {
                    (Some(table), _) => adc(table, &entry.codes),
                    (None, Some(dot)) => base - adc(dot, &entry.codes),
                    (None, None) => continue,
                };
                top.push(SearchResult::new(entry.row_id, distance));
            }
        }

        top.into_sorted_vec()
    }

    fn coarse_distance(&self, q: &[f32], centroid: &[f32]) -> f32 {
        match self.metric {
            DistanceMetric::DotProduct => -dot_product(q, centroid),
            DistanceMetric::Euclidean | DistanceMetric::Cosine => euclidean_distance_squared(q, centroid),
        }
    }

    fn lookup_table<F>(&self, q: &[f32], sub_dim: usize, f: F) -> Vec<Vec<f32>>
    where
        F: Fn(&[f32], &[f32]) -> f32,
    {
        self.codebooks
            .iter()
            .enumerate()
            .map(|(m, book)| {
                let sub = &q[m * sub_dim..(m + 1) * sub_dim];
                book.iter().map(|word| f(sub, word)).collect()
            })
            .collect()
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn partitions(&self) -> usize {
        self.centroids.len()
    }

    pub fn subvectors(&self) -> usize {
        self.subvectors
    }

    /// First row id not covered by this index.
    pub fn watermark(&self) -> RowId {
        self.watermark
    }

    pub fn indexed_rows(&self) -> usize {
        self.indexed_rows
    }

    pub fn built_at(&self) -> &str {
        &self.built_at
    }
}

fn prepare(metric: DistanceMetric, v: &[f32]) -> Vec<f32> {
    let mut out = v.to_vec();
    if metric == DistanceMetric::Cosine {
        normalize_in_place(&mut out);
    }
    out
}

/// Asymmetric distance: sum of table lookups for each code.
#[inline]
fn adc(table: &[Vec<f32>], codes: &[u8]) -> f32 {
    codes
        .iter()
        .enumerate()
        .map(|(m, &c)| table[m].get(c as usize).copied().unwrap_or(0.0))
        .sum()
}
