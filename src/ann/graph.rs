//! HNSW graph structure, configuration, and node arena.

use std::collections::{HashMap, VecDeque};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use super::search::{Neighbor, SearchHit};
use super::visited::VisitedSet;
use super::{IndexError, NodeId, MAX_LEVEL};
use crate::catalog::ProductId;
use crate::embedding::dot;

pub const DEFAULT_M: usize = 32;
pub const DEFAULT_EF_CONSTRUCTION: usize = 200;
pub const DEFAULT_EF_SEARCH: usize = 100;
pub const DEFAULT_SEED: u64 = 0x5eed_5eed;

/// Upper bound on connectivity repair passes after one write batch.
const MAX_REPAIR_ROUNDS: usize = 8;

/// Construction and search parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HnswConfig {
    pub dimensions: usize,
    /// Max neighbors per node per layer.
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    /// Seed for level sampling.
    pub seed: u64,
}

impl HnswConfig {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            m: DEFAULT_M,
            ef_construction: DEFAULT_EF_CONSTRUCTION,
            ef_search: DEFAULT_EF_SEARCH,
            seed: DEFAULT_SEED,
        }
    }

    pub fn validate(&self) -> Result<(), IndexError> {
        if self.dimensions == 0 {
            return Err(IndexError::InvalidConfig("dimensions must be positive".to_string()));
        }
        if self.m < 2 || self.m > u16::MAX as usize {
            return Err(IndexError::InvalidConfig(format!(
                "m must be between 2 and {}, got {}",
                u16::MAX,
                self.m
            )));
        }
        if self.ef_construction == 0 || self.ef_search == 0 {
            return Err(IndexError::InvalidConfig(
                "ef_construction and ef_search must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// mL = 1/ln(M)
    pub fn level_multiplier(&self) -> f64 {
        1.0 / (self.m as f64).ln()
    }
}

/// One graph node: a single version of one product.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) product_id: ProductId,
    pub(crate) version: u32,
    pub(crate) tombstone: bool,
    /// One adjacency list per layer, `0..=level`.
    pub(crate) neighbors: Vec<Vec<NodeId>>,
}

impl Node {
    pub fn new(product_id: ProductId, version: u32, level: u8) -> Self {
        Self {
            product_id,
            version,
            tombstone: false,
            neighbors: vec![Vec::new(); level as usize + 1],
        }
    }

    pub fn from_parts(
        product_id: ProductId,
        version: u32,
        tombstone: bool,
        neighbors: Vec<Vec<NodeId>>,
    ) -> Self {
        Self {
            product_id,
            version,
            tombstone,
            neighbors,
        }
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_tombstone(&self) -> bool {
        self.tombstone
    }

    pub fn level(&self) -> u8 {
        self.neighbors.len().saturating_sub(1) as u8
    }

    pub fn neighbors(&self, layer: usize) -> &[NodeId] {
        self.neighbors.get(layer).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Snapshot of index shape, reported by `stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub dimensions: usize,
    pub nodes: usize,
    pub live: usize,
    pub tombstones: usize,
    pub max_level: u8,
    /// Number of nodes present at each layer, layer 0 first.
    pub layer_counts: Vec<usize>,
    pub mean_degree: f32,
}

/// HNSW index over unit-normalized vectors.
#[derive(Debug, Clone)]
pub struct HnswIndex {
    pub(super) config: HnswConfig,
    /// Flat vector arena, node `i` at `i*D..(i+1)*D`.
    pub(super) vectors: Vec<f32>,
    pub(super) nodes: Vec<Node>,
    /// Product id -> node holding its live version.
    pub(super) live: HashMap<ProductId, NodeId>,
    pub(super) entry_point: Option<NodeId>,
    pub(super) max_level: u8,
    /// Layer-0 in-degree per node.
    pub(super) in_degree: Vec<u32>,
    pub(super) rng: StdRng,
}

impl HnswIndex {
    pub fn new(config: HnswConfig) -> Result<Self, IndexError> {
        config.validate()?;
        Ok(Self {
            config,
            vectors: Vec::new(),
            nodes: Vec::new(),
            live: HashMap::new(),
            entry_point: None,
            max_level: 0,
            in_degree: Vec::new(),
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    /// Rebuild an index from persisted parts, validating graph references.
    ///
    /// The level-sampling RNG is reseeded from the configured seed and the node count.
    pub fn from_parts(
        config: HnswConfig,
        vectors: Vec<f32>,
        nodes: Vec<Node>,
        entry_point: Option<NodeId>,
        max_level: u8,
    ) -> Result<Self, IndexError> {
        config.validate()?;
        let count = nodes.len();
        if vectors.len() != count * config.dimensions {
            return Err(IndexError::Corrupt(format!(
                "vector block holds {} floats, expected {}",
                vectors.len(),
                count * config.dimensions
            )));
        }
        match entry_point {
            None if count > 0 => {
                return Err(IndexError::Corrupt("non-empty index without entry point".to_string()))
            }
            Some(ep) if ep as usize >= count => {
                return Err(IndexError::Corrupt(format!("entry point {ep} out of range")))
            }
            Some(ep) if nodes[ep as usize].level() != max_level => {
                return Err(IndexError::Corrupt(format!(
                    "entry point level {} does not match max level {max_level}",
                    nodes[ep as usize].level()
                )))
            }
            _ => {}
        }

        let mut live = HashMap::new();
        let mut in_degree = vec![0u32; count];
        for (id, node) in nodes.iter().enumerate() {
            if node.neighbors.is_empty() || node.level() > MAX_LEVEL {
                return Err(IndexError::Corrupt(format!("node {id} has invalid level")));
            }
            for layer in &node.neighbors {
                for &neighbor in layer {
                    if neighbor as usize >= count {
                        return Err(IndexError::Corrupt(format!(
                            "node {id} links to missing node {neighbor}"
                        )));
                    }
                }
            }
            for &neighbor in node.neighbors(0) {
                in_degree[neighbor as usize] += 1;
            }
            if !node.tombstone
                && live
                    .insert(node.product_id.clone(), id as NodeId)
                    .is_some()
            {
                return Err(IndexError::Corrupt(format!(
                    "product {} has more than one live node",
                    node.product_id
                )));
            }
        }

        Ok(Self {
            config,
            vectors,
            nodes,
            live,
            entry_point,
            max_level,
            in_degree,
            rng: StdRng::seed_from_u64(config.seed ^ count as u64),
        })
    }

    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    /// Number of live (searchable) products.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Number of nodes including tombstones.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn entry_point(&self) -> Option<NodeId> {
        self.entry_point
    }

    pub fn max_level(&self) -> u8 {
        self.max_level
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn vectors(&self) -> &[f32] {
        &self.vectors
    }

    pub fn contains(&self, id: &ProductId) -> bool {
        self.live.contains_key(id)
    }

    /// Stored vector of a node.
    pub fn vector(&self, node: NodeId) -> &[f32] {
        let d = self.config.dimensions;
        let start = node as usize * d;
        &self.vectors[start..start + d]
    }

    pub(super) fn similarity(&self, a: NodeId, b: NodeId) -> f32 {
        dot(self.vector(a), self.vector(b))
    }

    /// Tombstone the live node of `id`. Returns false if the product is not indexed.
    pub fn remove(&mut self, id: &ProductId) -> bool {
        match self.live.remove(id) {
            Some(node) => {
                self.nodes[node as usize].tombstone = true;
                true
            }
            None => false,
        }
    }

    /// Brute-force k-nearest search over live nodes.
    pub fn exact_search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        self.check_query(query)?;
        let mut scored: Vec<Neighbor> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.tombstone)
            .map(|(id, _)| Neighbor::new(id as NodeId, dot(query, self.vector(id as NodeId))))
            .collect();
        scored.sort_by(|a, b| b.cmp(a));
        scored.truncate(k);
        Ok(scored.into_iter().map(|n| self.hit(n)).collect())
    }

    pub fn stats(&self) -> IndexStats {
        let mut layer_counts = vec![0usize; self.max_level as usize + 1];
        for node in &self.nodes {
            for count in layer_counts.iter_mut().take(node.neighbors.len()) {
                *count += 1;
            }
        }
        let degree_sum: usize = self.nodes.iter().map(|n| n.neighbors(0).len()).sum();
        let mean_degree = if self.nodes.is_empty() {
            0.0
        } else {
            degree_sum as f32 / self.nodes.len() as f32
        };
        if self.nodes.is_empty() {
            layer_counts.clear();
        }

        IndexStats {
            dimensions: self.config.dimensions,
            nodes: self.nodes.len(),
            live: self.live.len(),
            tombstones: self.nodes.len() - self.live.len(),
            max_level: self.max_level,
            layer_counts,
            mean_degree,
        }
    }

    /// Nodes that cannot be reached from the entry point on layer 0.
    pub fn unreachable_nodes(&self) -> Vec<NodeId> {
        let Some(entry) = self.entry_point else {
            return Vec::new();
        };
        let mut reached = VisitedSet::new(self.nodes.len());
        self.extend_reachable(&mut reached, entry);
        (0..self.nodes.len() as NodeId)
            .filter(|id| !reached.contains(*id))
            .collect()
    }

    /// Link every unreachable node back to the nearest reachable one.
    /// Returns the number of nodes re-attached.
    pub fn repair_connectivity(&mut self) -> usize {
        let Some(entry) = self.entry_point else {
            return 0;
        };
        let mut repaired = 0;
        for _ in 0..MAX_REPAIR_ROUNDS {
            let mut reached = VisitedSet::new(self.nodes.len());
            self.extend_reachable(&mut reached, entry);
            let orphans: Vec<NodeId> = (0..self.nodes.len() as NodeId)
                .filter(|id| !reached.contains(*id))
                .collect();
            if orphans.is_empty() {
                break;
            }
            for orphan in orphans {
                if reached.contains(orphan) {
                    continue;
                }
                let anchor = self.nearest_reachable(orphan, entry, &reached);
                self.link(anchor, orphan, 0);
                self.link(orphan, anchor, 0);
                self.extend_reachable(&mut reached, orphan);
                repaired += 1;
            }
        }
        if repaired > 0 {
            log::debug!("hnsw: re-attached {repaired} unreachable nodes");
        }
        repaired
    }

    fn nearest_reachable(&self, orphan: NodeId, entry: NodeId, reached: &VisitedSet) -> NodeId {
        let query = self.vector(orphan);
        let start = Neighbor::new(entry, dot(query, self.vector(entry)));
        self.search_layer(query, &[start], self.config.ef_construction, 0)
            .into_iter()
            .find(|n| n.id != orphan && reached.contains(n.id))
            .map(|n| n.id)
            .unwrap_or(entry)
    }

    fn extend_reachable(&self, reached: &mut VisitedSet, start: NodeId) {
        let mut queue = VecDeque::new();
        if reached.insert(start) {
            queue.push_back(start);
        }
        while let Some(node) = queue.pop_front() {
            for &neighbor in self.nodes[node as usize].neighbors(0) {
                if reached.insert(neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }
    }

    pub(super) fn check_query(&self, query: &[f32]) -> Result<(), IndexError> {
        if query.len() != self.config.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.config.dimensions,
                got: query.len(),
            });
        }
        Ok(())
    }

    pub(super) fn hit(&self, neighbor: Neighbor) -> SearchHit {
        let node = &self.nodes[neighbor.id as usize];
        SearchHit {
            product_id: node.product_id.clone(),
            version: node.version,
            similarity: neighbor.similarity,
        }
    }
}
