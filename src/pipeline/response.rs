use serde::Serialize;

use super::budget::StageTiming;
use super::Stage;
use crate::candidate::ScoredCandidate;
use crate::catalog::ProductId;
use crate::request_id::RequestId;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComponentScores {
    pub similarity: f32,
    pub sentiment: f32,
    pub occasion: f32,
    pub attention: f32,
    pub relevance: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedProduct {
    pub rank: usize,
    pub product_id: ProductId,
    pub version: u32,
    pub final_score: f32,
    pub scores: ComponentScores,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub matched: Vec<String>,
}

impl From<ScoredCandidate> for RankedProduct {
    fn from(candidate: ScoredCandidate) -> Self {
        Self {
            rank: candidate.rank,
            product_id: candidate.product.id.clone(),
            version: candidate.product.version,
            final_score: candidate.final_score,
            scores: ComponentScores {
                similarity: candidate.similarity,
                sentiment: candidate.sentiment_score,
                occasion: candidate.occasion_score,
                attention: candidate.attention_score,
                relevance: candidate.relevance,
            },
            matched: candidate.matched,
        }
    }
}

/// Present when the latency budget ran out and the results come from an earlier stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Degraded {
    pub last_stage: Stage,
    pub elapsed_ms: f64,
    pub budget_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timings {
    pub total_ms: f64,
    pub stages: Vec<StageTiming>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub request_id: RequestId,
    pub snapshot_version: u64,
    pub results: Vec<RankedProduct>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<Degraded>,
    pub timings: Timings,
}

impl SearchResponse {
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    pub fn product_ids(&self) -> Vec<&ProductId> {
        self.results.iter().map(|r| &r.product_id).collect()
    }
}
