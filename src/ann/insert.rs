//! HNSW insertion with bidirectional links and diversity-aware pruning.

use rand::Rng;

use super::graph::{HnswIndex, Node};
use super::search::Neighbor;
use super::{IndexError, NodeId, MAX_LEVEL};
use crate::catalog::ProductId;
use crate::embedding::{dot, Embedding};

impl HnswIndex {
    /// Insert one version of a product.
    ///
    /// If the product already has a live node, that node is tombstoned first.
    /// The embedding must have the index dimensions and be unit-normalized.
    pub fn insert(
        &mut self,
        product_id: ProductId,
        version: u32,
        embedding: &Embedding,
    ) -> Result<NodeId, IndexError> {
        embedding.check_dimensions(self.config.dimensions)?;
        embedding.check_unit()?;
        if self.nodes.len() >= NodeId::MAX as usize {
            return Err(IndexError::InvalidConfig("index node capacity exhausted".to_string()));
        }

        if let Some(previous) = self.live.remove(&product_id) {
            self.nodes[previous as usize].tombstone = true;
        }

        let level = self.sample_level();
        let node_id = self.nodes.len() as NodeId;
        self.vectors.extend_from_slice(embedding.as_slice());
        self.nodes.push(Node::new(product_id.clone(), version, level));
        self.in_degree.push(0);
        self.live.insert(product_id, node_id);

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(node_id);
            self.max_level = level;
            return Ok(node_id);
        };

        let query = embedding.as_slice();
        let start = Neighbor::new(entry, dot(query, self.vector(entry)));
        let mut entry_points = vec![self.descend(query, start, level)];

        for layer in (0..=level.min(self.max_level) as usize).rev() {
            let candidates: Vec<Neighbor> = self
                .search_layer(query, &entry_points, self.config.ef_construction, layer)
                .into_iter()
                .filter(|n| n.id != node_id)
                .collect();
            let selected = self.select_neighbors(&candidates, self.config.m);
            for &neighbor in &selected {
                self.link(node_id, neighbor, layer);
                self.link(neighbor, node_id, layer);
            }
            if !candidates.is_empty() {
                entry_points = candidates;
            }
        }

        if level > self.max_level {
            self.max_level = level;
            self.entry_point = Some(node_id);
        }

        Ok(node_id)
    }

    /// Sample a level from the geometric distribution with parameter mL.
    fn sample_level(&mut self) -> u8 {
        // random() is in [0,1); flip it so ln() never sees zero.
        let uniform = 1.0 - self.rng.random::<f64>();
        let level = (-uniform.ln() * self.config.level_multiplier()).floor();
        level.min(MAX_LEVEL as f64) as u8
    }

    /// Pick up to `m` neighbors from `candidates` (best first).
    ///
    /// A candidate is preferred when it is closer to the base node than to any neighbor
    /// already selected. Skipped candidates fill remaining slots in order.
    pub(super) fn select_neighbors(&self, candidates: &[Neighbor], m: usize) -> Vec<NodeId> {
        let mut selected: Vec<Neighbor> = Vec::with_capacity(m);
        let mut skipped: Vec<Neighbor> = Vec::new();

        for &candidate in candidates {
            if selected.len() >= m {
                break;
            }
            let diverse = selected
                .iter()
                .all(|s| self.similarity(candidate.id, s.id) < candidate.similarity);
            if diverse {
                selected.push(candidate);
            } else {
                skipped.push(candidate);
            }
        }

        for candidate in skipped {
            if selected.len() >= m {
                break;
            }
            selected.push(candidate);
        }

        selected.into_iter().map(|n| n.id).collect()
    }

    /// Add the directed edge `from -> to` on `layer`, pruning `from` if it overflows.
    pub(super) fn link(&mut self, from: NodeId, to: NodeId, layer: usize) {
        if from == to {
            return;
        }
        let Some(list) = self.nodes[from as usize].neighbors.get_mut(layer) else {
            return;
        };
        if list.contains(&to) {
            return;
        }
        list.push(to);
        let overflow = list.len() > self.config.m;
        if layer == 0 {
            self.in_degree[to as usize] += 1;
        }
        if overflow {
            self.prune(from, layer);
        }
    }

    /// Shrink the adjacency list of `node` on `layer` back to M entries.
    fn prune(&mut self, node: NodeId, layer: usize) {
        let current = self.nodes[node as usize].neighbors[layer].clone();
        let mut scored: Vec<Neighbor> = current
            .iter()
            .map(|&n| Neighbor::new(n, self.similarity(node, n)))
            .collect();
        scored.sort_by(|a, b| b.cmp(a));

        let mut kept = self.select_neighbors(&scored, self.config.m);

        if layer == 0 {
            self.protect_last_in_edges(&current, &mut kept);
            for &n in &current {
                if !kept.contains(&n) {
                    self.in_degree[n as usize] = self.in_degree[n as usize].saturating_sub(1);
                }
            }
        }

        self.nodes[node as usize].neighbors[layer] = kept;
    }

    /// Keep edges that are the only layer-0 way into their target by swapping out kept
    /// neighbors that have other in-edges.
    fn protect_last_in_edges(&self, current: &[NodeId], kept: &mut [NodeId]) {
        let dropped: Vec<NodeId> = current
            .iter()
            .copied()
            .filter(|n| !kept.contains(n))
            .collect();

        for orphan in dropped {
            if self.in_degree[orphan as usize] > 1 {
                continue;
            }
            if let Some(slot) = kept
                .iter()
                .rposition(|&k| self.in_degree[k as usize] > 1)
            {
                kept[slot] = orphan;
            }
        }
    }
}
