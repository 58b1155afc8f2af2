//! Diversity passes over a relevance-ranked candidate list.

use crate::candidate::{assign_ranks, sort_by_score, ScoredCandidate};
use crate::embedding::dot;

/// Maximal marginal relevance selection.
///
/// Greedily picks the candidate maximizing
/// `lambda · relevance - (1 - lambda) · max_sim(selected)` until `k` are chosen. The
/// marginal score at selection time becomes the candidate's `final_score`. Ties go to
/// the candidate earlier in `ranked`. `max_sim` is floored at 0, so pointing away from
/// the selected set earns no bonus.
pub fn mmr_select(ranked: Vec<ScoredCandidate>, k: usize, lambda: f32) -> Vec<ScoredCandidate> {
    if ranked.is_empty() || k == 0 {
        return Vec::new();
    }

    let lambda = lambda.clamp(0.0, 1.0);
    let mut remaining = ranked;
    // Highest similarity of each remaining candidate to anything selected so far.
    let mut max_sim = vec![0.0f32; remaining.len()];
    let mut selected: Vec<ScoredCandidate> = Vec::with_capacity(k.min(remaining.len()));

    while selected.len() < k && !remaining.is_empty() {
        let mut best = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (idx, candidate) in remaining.iter().enumerate() {
            let score = lambda * candidate.relevance - (1.0 - lambda) * max_sim[idx];
            if score > best_score {
                best = idx;
                best_score = score;
            }
        }

        let mut chosen = remaining.remove(best);
        max_sim.remove(best);
        for (idx, candidate) in remaining.iter().enumerate() {
            let sim = dot(candidate.embedding(), chosen.embedding());
            if sim > max_sim[idx] {
                max_sim[idx] = sim;
            }
        }

        chosen.final_score = best_score;
        chosen.rank = selected.len() + 1;
        selected.push(chosen);
    }

    selected
}

/// Additive novelty bonus: `final = relevance + weight · (1 - max_sim(above))`, where
/// `above` are the candidates ranked higher by relevance. Sorted by `final`, cut to `k`.
pub fn additive_select(ranked: Vec<ScoredCandidate>, k: usize, weight: f32) -> Vec<ScoredCandidate> {
    let mut scored: Vec<(f32, ScoredCandidate)> = Vec::with_capacity(ranked.len());
    for (position, candidate) in ranked.iter().enumerate() {
        let max_sim = ranked[..position]
            .iter()
            .map(|above| dot(candidate.embedding(), above.embedding()))
            .fold(0.0f32, f32::max);
        let novelty = 1.0 - max_sim;
        scored.push((candidate.relevance + weight * novelty, candidate.clone()));
    }

    let mut candidates: Vec<ScoredCandidate> = scored
        .into_iter()
        .map(|(score, mut candidate)| {
            candidate.final_score = score;
            candidate
        })
        .collect();
    sort_by_score(&mut candidates, |c| c.final_score);
    candidates.truncate(k);
    assign_ranks(&mut candidates, |c| c.final_score);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::testing::candidate;
    use std::collections::HashSet;

    fn pool() -> Vec<ScoredCandidate> {
        let mut a = candidate("a", vec![1.0, 0.0, 0.0], 0.95);
        let mut a2 = candidate("a-twin", vec![0.99, 0.01, 0.0], 0.94);
        let mut b = candidate("b", vec![0.0, 1.0, 0.0], 0.80);
        let mut c = candidate("c", vec![0.0, 0.0, 1.0], 0.60);
        for x in [&mut a, &mut a2, &mut b, &mut c] {
            x.relevance = x.similarity;
        }
        vec![a, a2, b, c]
    }

    #[test]
    fn test_mmr_prefers_diverse_items() {
        let selected = mmr_select(pool(), 2, 0.5);
        let ids: Vec<_> = selected.iter().map(|c| c.product_id().as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_mmr_lambda_one_is_relevance_order() {
        let selected = mmr_select(pool(), 4, 1.0);
        let ids: Vec<_> = selected.iter().map(|c| c.product_id().as_str()).collect();
        assert_eq!(ids, vec!["a", "a-twin", "b", "c"]);
    }

    #[test]
    fn test_mmr_scores_are_non_increasing_and_unique() {
        for lambda in [0.0, 0.3, 0.7, 1.0] {
            let selected = mmr_select(pool(), 10, lambda);
            assert_eq!(selected.len(), 4);
            for pair in selected.windows(2) {
                assert!(pair[0].final_score >= pair[1].final_score, "lambda {lambda}");
            }
            let ids: HashSet<_> = selected.iter().map(|c| c.product_id().clone()).collect();
            assert_eq!(ids.len(), selected.len());
            assert_eq!(selected.last().unwrap().rank, 4);
        }
    }

    #[test]
    fn test_mmr_opposite_items_earn_no_bonus() {
        let mut a = candidate("a", vec![1.0, 0.0, 0.0], 0.9);
        let mut opposite = candidate("opposite", vec![-1.0, 0.0, 0.0], 0.5);
        let mut b = candidate("b", vec![0.0, 1.0, 0.0], 0.6);
        for x in [&mut a, &mut opposite, &mut b] {
            x.relevance = x.similarity;
        }
        let selected = mmr_select(vec![a, opposite, b], 3, 0.5);
        let ids: Vec<_> = selected.iter().map(|c| c.product_id().as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "opposite"]);
        assert!((selected[2].final_score - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_mmr_empty_inputs() {
        assert!(mmr_select(Vec::new(), 3, 0.7).is_empty());
        assert!(mmr_select(pool(), 0, 0.7).is_empty());
    }

    #[test]
    fn test_additive_demotes_near_duplicates() {
        let selected = additive_select(pool(), 3, 0.5);
        let ids: Vec<_> = selected.iter().map(|c| c.product_id().as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        for pair in selected.windows(2) {
            assert!(pair[0].final_score >= pair[1].final_score);
        }
    }
}
