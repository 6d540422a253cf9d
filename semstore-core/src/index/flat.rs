//! Exact (flat) ranking helpers.
//!
//! The flat scan is the fallback for every vector query: it computes the
//! distance to each candidate row and keeps the best `k`. Index-backed search
//! reuses the same collector to merge and re-rank candidates.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::document::RowId;

/// A ranked row. Lower distance is better.
#[derive(Debug, Clone, Copy)]
pub struct SearchResult {
    pub row_id: RowId,
    pub distance: f32,
}

impl SearchResult {
    pub fn new(row_id: RowId, distance: f32) -> Self {
        Self { row_id, distance }
    }
}

impl PartialEq for SearchResult {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SearchResult {}

impl PartialOrd for SearchResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SearchResult {
    fn cmp(&self, other: &Self) -> Ordering {
        // Ties resolve by insertion order so results are stable.
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.row_id.cmp(&other.row_id))
    }
}

/// Keeps the `k` smallest results seen so far.
#[derive(Debug)]
pub struct TopK {
    k: usize,
    heap: BinaryHeap<SearchResult>,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(4096)),
        }
    }

    /// Offers a candidate.
    pub fn push(&mut self, result: SearchResult) {
        if self.k == 0 {
            return;
        }
        if self.heap.len() < self.k {
            self.heap.push(result);
        } else if let Some(worst) = self.heap.peek() {
            if result < *worst {
                self.heap.pop();
                self.heap.push(result);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Returns the kept results, best first.
    pub fn into_sorted_vec(self) -> Vec<SearchResult> {
        self.heap.into_sorted_vec()
    }
}
