//! HNSW search: greedy descent through the upper layers and best-first search on a layer.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use serde::Serialize;

use super::graph::HnswIndex;
use super::visited::VisitedSet;
use super::{IndexError, NodeId};
use crate::catalog::ProductId;
use crate::embedding::dot;

/// A node paired with its similarity to the current query.
///
/// Ordering puts higher similarity first and breaks ties by lower node id, so every
/// traversal is deterministic.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Neighbor {
    pub(crate) id: NodeId,
    pub(crate) similarity: f32,
}

impl Neighbor {
    pub(crate) fn new(id: NodeId, similarity: f32) -> Self {
        Self { id, similarity }
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.similarity
            .total_cmp(&other.similarity)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Neighbor {}

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub product_id: ProductId,
    pub version: u32,
    pub similarity: f32,
}

impl HnswIndex {
    /// Return up to `k` live products closest to `query`, best first.
    ///
    /// `ef_search` is raised to `k` when smaller. If tombstones crowd live nodes out of
    /// the candidate list the search is retried with a doubled list size.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        ef_search: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        self.check_query(query)?;
        let Some(entry) = self.entry_point else {
            return Ok(Vec::new());
        };
        if k == 0 || self.live.is_empty() {
            return Ok(Vec::new());
        }

        let start = Neighbor::new(entry, dot(query, self.vector(entry)));
        let start = self.descend(query, start, 0);

        let mut ef = ef_search.max(k);
        loop {
            let hits: Vec<SearchHit> = self
                .search_layer(query, &[start], ef, 0)
                .into_iter()
                .filter(|n| !self.nodes[n.id as usize].tombstone)
                .take(k)
                .map(|n| self.hit(n))
                .collect();

            if hits.len() >= k || hits.len() >= self.live.len() || ef >= self.nodes.len() {
                return Ok(hits);
            }
            ef = (ef * 2).min(self.nodes.len());
        }
    }

    /// Greedy descent from `start` through every layer above `target_layer`.
    pub(super) fn descend(&self, query: &[f32], start: Neighbor, target_layer: u8) -> Neighbor {
        let mut current = start;
        for layer in (target_layer as usize + 1..=self.max_level as usize).rev() {
            current = self.greedy_closest(query, current, layer);
        }
        current
    }

    fn greedy_closest(&self, query: &[f32], start: Neighbor, layer: usize) -> Neighbor {
        let mut current = start;
        loop {
            let mut improved = false;
            for &id in self.nodes[current.id as usize].neighbors(layer) {
                let candidate = Neighbor::new(id, dot(query, self.vector(id)));
                if candidate > current {
                    current = candidate;
                    improved = true;
                }
            }
            if !improved {
                return current;
            }
        }
    }

    /// Best-first search on one layer keeping the `ef` closest nodes found.
    /// Returns them best first.
    pub(super) fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[Neighbor],
        ef: usize,
        layer: usize,
    ) -> Vec<Neighbor> {
        let ef = ef.max(1);
        let mut visited = VisitedSet::new(self.nodes.len());
        let mut candidates: BinaryHeap<Neighbor> = BinaryHeap::new();
        let mut results: BinaryHeap<Reverse<Neighbor>> = BinaryHeap::new();

        for &entry in entry_points {
            if visited.insert(entry.id) {
                candidates.push(entry);
                results.push(Reverse(entry));
                if results.len() > ef {
                    results.pop();
                }
            }
        }

        while let Some(current) = candidates.pop() {
            if let Some(Reverse(worst)) = results.peek() {
                if results.len() >= ef && current < *worst {
                    break;
                }
            }

            for &id in self.nodes[current.id as usize].neighbors(layer) {
                if !visited.insert(id) {
                    continue;
                }
                let candidate = Neighbor::new(id, dot(query, self.vector(id)));
                let admit = results.len() < ef
                    || results
                        .peek()
                        .map(|Reverse(worst)| candidate > *worst)
                        .unwrap_or(true);
                if admit {
                    candidates.push(candidate);
                    results.push(Reverse(candidate));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut found: Vec<Neighbor> = results.into_iter().map(|Reverse(n)| n).collect();
        found.sort_by(|a, b| b.cmp(a));
        found
    }
}
