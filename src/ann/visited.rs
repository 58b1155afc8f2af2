//! Dense bitset of visited nodes for one graph traversal.

use super::NodeId;

pub(crate) struct VisitedSet {
    bits: Vec<u64>,
}

impl VisitedSet {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            bits: vec![0; capacity.div_ceil(64)],
        }
    }

    /// Mark `id` visited. Returns false if it already was.
    pub(crate) fn insert(&mut self, id: NodeId) -> bool {
        let (word, bit) = Self::position(id);
        if word >= self.bits.len() {
            self.bits.resize(word + 1, 0);
        }
        let mask = 1u64 << bit;
        let fresh = self.bits[word] & mask == 0;
        self.bits[word] |= mask;
        fresh
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        let (word, bit) = Self::position(id);
        self.bits
            .get(word)
            .map(|w| w & (1u64 << bit) != 0)
            .unwrap_or(false)
    }

    fn position(id: NodeId) -> (usize, u32) {
        ((id / 64) as usize, id % 64)
    }
}
