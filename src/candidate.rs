use std::sync::Arc;

use crate::catalog::{Product, ProductId};
use crate::scoring::ContextScores;

/// One ANN candidate as it moves through scoring and reranking.
///
/// `relevance` is the pre-diversity score
/// `similarity + attention + λ1·sentiment + λ2·occasion`; `final_score` and `rank`
/// are set by the diversity pass.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub product: Arc<Product>,
    pub similarity: f32,
    pub sentiment_score: f32,
    pub occasion_score: f32,
    pub attention_score: f32,
    pub relevance: f32,
    pub final_score: f32,
    pub rank: usize,
    pub matched: Vec<String>,
}

impl ScoredCandidate {
    pub fn new(product: Arc<Product>, similarity: f32) -> Self {
        Self {
            product,
            similarity,
            sentiment_score: 0.0,
            occasion_score: 0.0,
            attention_score: 0.0,
            relevance: similarity,
            final_score: similarity,
            rank: 0,
            matched: Vec::new(),
        }
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product.id
    }

    pub fn version(&self) -> u32 {
        self.product.version
    }

    pub fn embedding(&self) -> &[f32] {
        self.product.embedding.as_slice()
    }

    pub fn apply_context(&mut self, scores: ContextScores) {
        self.sentiment_score = scores.sentiment;
        self.occasion_score = scores.occasion;
        self.matched = scores.matched;
    }
}

/// Descending by `key`, ties broken by product id so orderings are deterministic.
pub fn sort_by_score(candidates: &mut [ScoredCandidate], key: impl Fn(&ScoredCandidate) -> f32) {
    candidates.sort_by(|a, b| {
        key(b)
            .total_cmp(&key(a))
            .then_with(|| a.product_id().cmp(b.product_id()))
    });
}

/// Number candidates 1..=n in their current order and copy `key` into `final_score`.
pub fn assign_ranks(candidates: &mut [ScoredCandidate], key: impl Fn(&ScoredCandidate) -> f32) {
    for (position, candidate) in candidates.iter_mut().enumerate() {
        candidate.final_score = key(candidate);
        candidate.rank = position + 1;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::catalog::ProductMetadata;
    use crate::embedding::Embedding;

    pub(crate) fn candidate(id: &str, embedding: Vec<f32>, similarity: f32) -> ScoredCandidate {
        let product = Product {
            id: ProductId::from(id),
            version: 1,
            embedding: Embedding::normalized(embedding).unwrap(),
            metadata: ProductMetadata::default(),
        };
        ScoredCandidate::new(Arc::new(product), similarity)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::candidate;
    use super::*;

    #[test]
    fn test_sort_breaks_ties_by_id() {
        let mut candidates = vec![
            candidate("b", vec![1.0, 0.0], 0.5),
            candidate("c", vec![1.0, 0.0], 0.9),
            candidate("a", vec![1.0, 0.0], 0.5),
        ];
        sort_by_score(&mut candidates, |c| c.similarity);
        let ids: Vec<_> = candidates.iter().map(|c| c.product_id().as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);

        assign_ranks(&mut candidates, |c| c.similarity);
        assert_eq!(candidates[0].rank, 1);
        assert_eq!(candidates[2].rank, 3);
        assert_eq!(candidates[2].final_score, 0.5);
    }
}
