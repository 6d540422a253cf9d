//! Inverted full-text index with BM25 scoring.
//!
//! Each term maps to a roaring bitmap of the rows containing it plus the
//! per-row term frequency. Scoring reads collection statistics (document
//! count, document frequency, average length) from live rows only, so rows
//! deleted after a build do not skew results.

use std::collections::HashMap;

use roaring::RoaringTreemap;
use serde::{Deserialize, Serialize};

use crate::document::RowId;

/// Term-frequency saturation.
pub const BM25_K1: f32 = 1.2;
/// Length normalization.
pub const BM25_B: f32 = 0.75;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// Splits text into lowercase alphanumeric terms, dropping one-character
/// tokens and English stopwords.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.chars().count() >= 2)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

#[derive(Debug, Clone)]
struct Postings {
    rows: RoaringTreemap,
    freqs: HashMap<RowId, u32>,
}

impl Postings {
    fn new() -> Self {
        Self {
            rows: RoaringTreemap::new(),
            freqs: HashMap::new(),
        }
    }
}

/// Inverted index over the text column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "TextIndexSnapshot", from = "TextIndexSnapshot")]
pub struct TextIndex {
    terms: HashMap<String, Postings>,
    doc_lengths: HashMap<RowId, u32>,
    watermark: RowId,
    built_at: String,
}

impl TextIndex {
    /// Creates an empty index covering rows below `watermark`.
    pub fn new(watermark: RowId) -> Self {
        Self {
            terms: HashMap::new(),
            doc_lengths: HashMap::new(),
            watermark,
            built_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Indexes every given row.
    pub fn build<'a, I>(rows: I, watermark: RowId) -> Self
    where
        I: IntoIterator<Item = (RowId, &'a str)>,
    {
        let mut index = Self::new(watermark);
        for (row_id, text) in rows {
            index.add(row_id, text);
        }
        index
    }

    /// Adds one row's text.
    pub fn add(&mut self, row_id: RowId, text: &str) {
        let tokens = tokenize(text);
        self.doc_lengths.insert(row_id, tokens.len() as u32);

        let mut tf: HashMap<String, u32> = HashMap::new();
        for token in tokens {
            *tf.entry(token).or_insert(0) += 1;
        }
        for (term, count) in tf {
            let postings = self.terms.entry(term).or_insert_with(Postings::new);
            postings.rows.insert(row_id);
            postings.freqs.insert(row_id, count);
        }
    }

    pub fn indexed_rows(&self) -> usize {
        self.doc_lengths.len()
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// First row id not covered by this index.
    pub fn watermark(&self) -> RowId {
        self.watermark
    }

    pub fn built_at(&self) -> &str {
        &self.built_at
    }
}

/// Scores rows across one or more indexes with BM25.
///
/// `alive` decides which rows count toward collection statistics; `accept`
/// additionally narrows which rows may be returned. Results are ordered by
/// descending score, ties by row id, and truncated to `limit` when given.
pub fn bm25_search<A, F>(
    sources: &[&TextIndex],
    query: &str,
    alive: A,
    accept: F,
    limit: Option<usize>,
) -> Vec<(RowId, f32)>
where
    A: Fn(RowId) -> bool,
    F: Fn(RowId) -> bool,
{
    let mut query_terms = tokenize(query);
    query_terms.sort();
    query_terms.dedup();
    if query_terms.is_empty() {
        return Vec::new();
    }

    let mut doc_count = 0usize;
    let mut total_len = 0u64;
    for source in sources {
        for (row_id, len) in &source.doc_lengths {
            if alive(*row_id) {
                doc_count += 1;
                total_len += *len as u64;
            }
        }
    }
    if doc_count == 0 {
        return Vec::new();
    }
    let n = doc_count as f32;
    let avgdl = (total_len as f32 / n).max(f32::EPSILON);

    let mut scores: HashMap<RowId, f32> = HashMap::new();
    for term in &query_terms {
        let postings: Vec<(&TextIndex, &Postings)> = sources
            .iter()
            .filter_map(|s| s.terms.get(term).map(|p| (*s, p)))
            .collect();

        let mut matching = RoaringTreemap::new();
        for (_, p) in &postings {
            matching |= &p.rows;
        }
        let live: Vec<RowId> = matching.iter().filter(|id| alive(*id)).collect();
        if live.is_empty() {
            continue;
        }

        let df = live.len() as f32;
        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

        for row_id in live {
            if !accept(row_id) {
                continue;
            }
            let Some((source, p)) = postings.iter().find(|(_, p)| p.rows.contains(row_id)) else {
                continue;
            };
            let tf = p.freqs.get(&row_id).copied().unwrap_or(0) as f32;
            let dl = source.doc_lengths.get(&row_id).copied().unwrap_or(0) as f32;
            let tf_norm = (tf * (BM25_K1 + 1.0)) / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * dl / avgdl));
            *scores.entry(row_id).or_insert(0.0) += idf * tf_norm;
        }
    }

    let mut ranked: Vec<(RowId, f32)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    if let Some(limit) = limit {
        ranked.truncate(limit);
    }
    ranked
}

#[derive(Serialize, Deserialize)]
struct TextIndexSnapshot {
    watermark: RowId,
    built_at: String,
    doc_lengths: Vec<(RowId, u32)>,
    terms: Vec<(String, Vec<(RowId, u32)>)>,
}

impl From<TextIndex> for TextIndexSnapshot {
    fn from(index: TextIndex) -> Self {
        let mut doc_lengths: Vec<(RowId, u32)> = index.doc_lengths.into_iter().collect();
        doc_lengths.sort_unstable();
        let mut terms: Vec<(String, Vec<(RowId, u32)>)> = index
            .terms
            .into_iter()
            .map(|(term, p)| {
                let postings = p
                    .rows
                    .iter()
                    .map(|id| (id, p.freqs.get(&id).copied().unwrap_or(0)))
                    .collect();
                (term, postings)
            })
            .collect();
        terms.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            watermark: index.watermark,
            built_at: index.built_at,
            doc_lengths,
            terms,
        }
    }
}

impl From<TextIndexSnapshot> for TextIndex {
    fn from(snapshot: TextIndexSnapshot) -> Self {
        let terms = snapshot
            .terms
            .into_iter()
            .map(|(term, postings)| {
                let mut p = Postings::new();
                for (row_id, tf) in postings {
                    p.rows.insert(row_id);
                    p.freqs.insert(row_id, tf);
                }
                (term, p)
            })
            .collect();
        Self {
            terms,
            doc_lengths: snapshot.doc_lengths.into_iter().collect(),
            watermark: snapshot.watermark,
            built_at: snapshot.built_at,
        }
    }
}
