//! Candidate reranking: attention refinement, context-weighted relevance and a
//! diversity pass.
//!
//! Two diversity modes exist and exactly one is active:
//! - `Mmr`: maximal marginal relevance; λ3 is unused and `final_score` is the marginal
//!   MMR score
//! - `Additive`: `final = relevance + λ3 · novelty`, sorted and truncated

pub mod attention;
mod mmr;

pub use attention::{CrossAttention, DEFAULT_ATTENTION_SCALE, DEFAULT_ATTENTION_TOKENS};
pub use mmr::{additive_select, mmr_select};

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::candidate::{assign_ranks, sort_by_score, ScoredCandidate};
use crate::config::{ConfigError, RerankConfig};
use crate::embedding::Embedding;
use crate::error::RetrievalError;
use crate::linalg::Projection;
use crate::storage::matrix_file;

pub const DEFAULT_SENTIMENT_WEIGHT: f32 = 0.15;
pub const DEFAULT_OCCASION_WEIGHT: f32 = 0.20;
pub const DEFAULT_DIVERSITY_WEIGHT: f32 = 0.10;
pub const DEFAULT_DIVERSITY_LAMBDA: f32 = 0.7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiversityMode {
    #[default]
    Mmr,
    Additive,
}

/// λ1 (sentiment), λ2 (occasion) and λ3 (additive diversity).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankWeights {
    pub sentiment: f32,
    pub occasion: f32,
    pub diversity: f32,
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self {
            sentiment: DEFAULT_SENTIMENT_WEIGHT,
            occasion: DEFAULT_OCCASION_WEIGHT,
            diversity: DEFAULT_DIVERSITY_WEIGHT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reranker {
    weights: RerankWeights,
    mode: DiversityMode,
    default_lambda: f32,
    attention: Option<CrossAttention>,
}

impl Reranker {
    pub fn new(
        weights: RerankWeights,
        mode: DiversityMode,
        default_lambda: f32,
        attention: Option<CrossAttention>,
    ) -> Self {
        Self {
            weights,
            mode,
            default_lambda,
            attention,
        }
    }

    /// Build the reranker described by `config`. Projection paths resolve against
    /// `base_path`; without them the attention projections are identity.
    pub fn from_config(
        config: &RerankConfig,
        dimensions: usize,
        base_path: &Path,
    ) -> Result<Self, RetrievalError> {
        let attention = if config.attention_scale > 0.0 {
            let load = |path: &Option<String>| -> Result<Projection, RetrievalError> {
                match path {
                    Some(path) => {
                        let matrix = matrix_file::read_matrix(&base_path.join(path))?;
                        Ok(Projection::Dense(Arc::new(matrix)))
                    }
                    None => Ok(Projection::Identity),
                }
            };
            let paths = &config.attention_projection_paths;
            let attention = CrossAttention::new(
                dimensions,
                config.attention_tokens,
                config.attention_scale,
                load(&paths.query)?,
                load(&paths.key)?,
                load(&paths.value)?,
            )
            .map_err(ConfigError::Invalid)?;
            Some(attention)
        } else {
            None
        };

        Ok(Self::new(
            RerankWeights {
                sentiment: config.sentiment_weight,
                occasion: config.occasion_weight,
                diversity: config.diversity_weight,
            },
            config.diversity_mode,
            config.default_diversity,
            attention,
        ))
    }

    pub fn weights(&self) -> &RerankWeights {
        &self.weights
    }

    pub fn mode(&self) -> DiversityMode {
        self.mode
    }

    pub fn default_lambda(&self) -> f32 {
        self.default_lambda
    }

    /// `similarity + λ1·sentiment + λ2·occasion`, without attention.
    pub fn context_relevance(&self, candidate: &ScoredCandidate) -> f32 {
        candidate.similarity
            + self.weights.sentiment * candidate.sentiment_score
            + self.weights.occasion * candidate.occasion_score
    }

    /// Attention-refine every candidate, compute its relevance, collapse duplicate
    /// product ids and sort by relevance.
    pub fn rerank(
        &self,
        query: &Embedding,
        mut candidates: Vec<ScoredCandidate>,
    ) -> Result<Vec<ScoredCandidate>, RetrievalError> {
        if let Some(attention) = &self.attention {
            let projected = attention.project_query(query.as_slice())?;
            candidates.par_iter_mut().try_for_each(|candidate| {
                candidate.attention_score = attention.score(&projected, candidate.embedding())?;
                Ok::<_, RetrievalError>(())
            })?;
        }

        for candidate in candidates.iter_mut() {
            candidate.relevance = self.context_relevance(candidate) + candidate.attention_score;
        }

        Ok(collapse(candidates, |c| c.relevance))
    }

    /// Pick the final top-k with the configured diversity mode.
    /// `lambda` overrides the default MMR trade-off for this request.
    pub fn diversify(
        &self,
        ranked: Vec<ScoredCandidate>,
        k: usize,
        lambda: Option<f32>,
    ) -> Vec<ScoredCandidate> {
        match self.mode {
            DiversityMode::Mmr => mmr_select(ranked, k, lambda.unwrap_or(self.default_lambda)),
            DiversityMode::Additive => additive_select(ranked, k, self.weights.diversity),
        }
    }

    /// Degraded ordering after context scoring: context relevance only, no attention
    /// and no diversity.
    pub fn rank_by_context(&self, candidates: Vec<ScoredCandidate>, k: usize) -> Vec<ScoredCandidate> {
        let mut ranked: Vec<ScoredCandidate> = candidates
            .into_iter()
            .map(|mut candidate| {
                candidate.relevance = self.context_relevance(&candidate);
                candidate
            })
            .collect();
        ranked = collapse(ranked, |c| c.relevance);
        ranked.truncate(k);
        assign_ranks(&mut ranked, |c| c.relevance);
        ranked
    }
}

impl Default for Reranker {
    fn default() -> Self {
        Self::new(
            RerankWeights::default(),
            DiversityMode::default(),
            DEFAULT_DIVERSITY_LAMBDA,
            None,
        )
    }
}

/// Sort by `key` descending and keep the best entry per product id.
pub fn collapse(
    mut candidates: Vec<ScoredCandidate>,
    key: impl Fn(&ScoredCandidate) -> f32,
) -> Vec<ScoredCandidate> {
    sort_by_score(&mut candidates, key);
    let mut seen = HashSet::new();
    candidates.retain(|c| seen.insert(c.product_id().clone()));
    candidates
}
