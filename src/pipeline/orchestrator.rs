use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;

use super::budget::{as_ms, Clock, LatencyBudget, StageBudgets, SystemClock};
use super::request::{QueryContext, RawQuery};
use super::response::{Degraded, RankedProduct, SearchResponse, Timings};
use super::{Stage, TimeoutPolicy};
use crate::candidate::{assign_ranks, ScoredCandidate};
use crate::catalog::{Catalog, CatalogSnapshot};
use crate::config::Config;
use crate::embedding::Embedding;
use crate::encoder::{BoundedEncoder, EncoderError};
use crate::error::RetrievalError;
use crate::fusion::FusionEngine;
use crate::request_id::RequestId;
use crate::rerank::Reranker;
use crate::scoring::ContextScorer;

pub const DEFAULT_BUDGET_MS: u64 = 250;
pub const DEFAULT_CANDIDATE_MULTIPLIER: usize = 10;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub budget: Duration,
    pub stage_budgets: StageBudgets,
    pub timeout_policy: TimeoutPolicy,
    /// Candidate pool size as a multiple of k.
    pub candidate_multiplier: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            budget: Duration::from_millis(DEFAULT_BUDGET_MS),
            stage_budgets: StageBudgets::default(),
            timeout_policy: TimeoutPolicy::default(),
            candidate_multiplier: DEFAULT_CANDIDATE_MULTIPLIER,
        }
    }
}

/// Runs search requests against a shared catalog. Cheap to share across threads; each
/// request works on its own catalog snapshot.
pub struct SearchPipeline {
    catalog: Arc<Catalog>,
    fusion: FusionEngine,
    scorer: ContextScorer,
    reranker: Reranker,
    settings: PipelineSettings,
    encoder: Option<BoundedEncoder>,
    clock: Arc<dyn Clock>,
}

impl SearchPipeline {
    pub fn new(
        catalog: Arc<Catalog>,
        fusion: FusionEngine,
        scorer: ContextScorer,
        reranker: Reranker,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            catalog,
            fusion,
            scorer,
            reranker,
            settings,
            encoder: None,
            clock: Arc::new(SystemClock::new()),
        }
    }

    pub fn from_config(config: &Config, catalog: Arc<Catalog>) -> Result<Self, RetrievalError> {
        let dimensions = catalog.config().dimensions;
        let base_path = config.base_path();
        let fusion = FusionEngine::from_config(&config.fusion, dimensions, base_path)?;
        let reranker = Reranker::from_config(&config.rerank, dimensions, base_path)?;
        let settings = PipelineSettings {
            budget: Duration::from_millis(config.pipeline.budget_ms),
            stage_budgets: config.pipeline.stage_budgets,
            timeout_policy: config.pipeline.timeout_policy,
            candidate_multiplier: config.pipeline.candidate_multiplier,
        };
        Ok(Self::new(
            catalog,
            fusion,
            ContextScorer::new(config.scoring.weights),
            reranker,
            settings,
        ))
    }

    pub fn with_encoder(mut self, encoder: BoundedEncoder) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Search with already-encoded query embeddings.
    pub fn search(&self, query: QueryContext) -> Result<SearchResponse, RetrievalError> {
        let request_id = RequestId::new();
        let k = query.k;
        let mut budget = self.start_budget();

        let result = self.prepare(&query).and_then(|snapshot| {
            let fused = self
                .fusion
                .fuse(query.text.as_ref(), query.image.as_ref(), query.alpha)?;
            self.run(&request_id, &mut budget, &snapshot, fused, &query)
        });

        finish(&request_id, k, &mut budget, &result);
        result
    }

    /// Search with raw text and/or image bytes, encoded inside the `Fused` stage. Each
    /// encoder call may use at most the budget left.
    pub fn search_encoded(&self, raw: RawQuery) -> Result<SearchResponse, RetrievalError> {
        let request_id = RequestId::new();
        let k = raw.query.k;
        let mut budget = self.start_budget();

        let RawQuery { text, image, mut query } = raw;
        let result = self.prepare(&query).and_then(|snapshot| {
            let encoder = self.encoder.as_ref().ok_or(EncoderError::Unavailable)?;
            if text.is_none() && image.is_none() {
                return Err(RetrievalError::InvalidQuery(
                    "query has neither text nor an image".to_string(),
                ));
            }
            if let Some(text) = &text {
                query.text = Some(encoder.encode_text_within(text, budget.remaining_now())?);
            }
            if let Some(image) = &image {
                query.image = Some(encoder.encode_image_within(image, budget.remaining_now())?);
            }
            let fused = self
                .fusion
                .fuse(query.text.as_ref(), query.image.as_ref(), query.alpha)?;
            self.run(&request_id, &mut budget, &snapshot, fused, &query)
        });

        finish(&request_id, k, &mut budget, &result);
        result
    }

    fn start_budget(&self) -> LatencyBudget {
        LatencyBudget::start(
            self.clock.clone(),
            self.settings.budget,
            self.settings.stage_budgets,
        )
    }

    fn prepare(&self, query: &QueryContext) -> Result<Arc<CatalogSnapshot>, RetrievalError> {
        if query.k == 0 {
            return Err(RetrievalError::InvalidQuery("k must be at least 1".to_string()));
        }
        if query.diversity.is_some_and(|lambda| !lambda.is_finite()) {
            return Err(RetrievalError::InvalidQuery(
                "diversity weight must be a finite number".to_string(),
            ));
        }
        self.catalog.snapshot()
    }

    fn run(
        &self,
        request_id: &RequestId,
        budget: &mut LatencyBudget,
        snapshot: &CatalogSnapshot,
        fused: Embedding,
        query: &QueryContext,
    ) -> Result<SearchResponse, RetrievalError> {
        budget.mark(Stage::Fused);
        if budget.exceeded() {
            // nothing to fall back to before the candidate list exists
            return Err(timeout(Stage::Fused, budget));
        }

        let pool = query.k.saturating_mul(self.settings.candidate_multiplier.max(1));
        let ef = snapshot.index.config().ef_search.max(pool);
        let hits = snapshot.index.search(fused.as_slice(), pool, ef)?;
        let mut candidates: Vec<ScoredCandidate> = hits
            .into_iter()
            .filter_map(|hit| {
                let product = snapshot.store.get(&hit.product_id)?;
                if product.version != hit.version {
                    log::debug!(
                        "pipeline: request_id={} skipping stale hit id={} version={}",
                        request_id,
                        hit.product_id,
                        hit.version
                    );
                    return None;
                }
                query
                    .filters
                    .matches(&product.metadata)
                    .then(|| ScoredCandidate::new(product.clone(), hit.similarity))
            })
            .collect();

        budget.mark(Stage::Searched);
        if budget.exceeded() {
            self.degrade_or_fail(request_id, Stage::Searched, budget)?;
            candidates.truncate(query.k);
            assign_ranks(&mut candidates, |c| c.similarity);
            return Ok(respond(request_id, snapshot, candidates, Some(Stage::Searched), budget));
        }

        candidates.par_iter_mut().for_each(|candidate| {
            let scores = self.scorer.score(&candidate.product.metadata, &query.context);
            candidate.apply_context(scores);
        });

        budget.mark(Stage::Scored);
        if budget.exceeded() {
            self.degrade_or_fail(request_id, Stage::Scored, budget)?;
            let ranked = self.reranker.rank_by_context(candidates, query.k);
            return Ok(respond(request_id, snapshot, ranked, Some(Stage::Scored), budget));
        }

        let ranked = self.reranker.rerank(&fused, candidates)?;
        let lambda = query.diversity.map(clamp_lambda);
        let results = self.reranker.diversify(ranked, query.k, lambda);
        budget.mark(Stage::Reranked);
        if budget.exceeded() {
            match self.settings.timeout_policy {
                TimeoutPolicy::Fail => return Err(timeout(Stage::Reranked, budget)),
                // the ranking is complete, so there is nothing to degrade to
                TimeoutPolicy::Degrade => log::warn!(
                    "pipeline: request_id={} budget of {}ms exhausted while reranking, returning full results",
                    request_id,
                    budget.total().as_millis()
                ),
            }
        }

        Ok(respond(request_id, snapshot, results, None, budget))
    }

    fn degrade_or_fail(
        &self,
        request_id: &RequestId,
        stage: Stage,
        budget: &LatencyBudget,
    ) -> Result<(), RetrievalError> {
        match self.settings.timeout_policy {
            TimeoutPolicy::Fail => Err(timeout(stage, budget)),
            TimeoutPolicy::Degrade => {
                log::warn!(
                    "pipeline: request_id={} budget of {}ms exhausted after {} stage, returning degraded results",
                    request_id,
                    budget.total().as_millis(),
                    stage
                );
                Ok(())
            }
        }
    }
}

fn clamp_lambda(lambda: f32) -> f32 {
    if !(0.0..=1.0).contains(&lambda) {
        log::warn!("pipeline: diversity weight {lambda} outside [0,1], clamping");
    }
    lambda.clamp(0.0, 1.0)
}

fn timeout(stage: Stage, budget: &LatencyBudget) -> RetrievalError {
    RetrievalError::Timeout {
        stage,
        elapsed_ms: budget.elapsed().as_millis() as u64,
        budget_ms: budget.total().as_millis() as u64,
    }
}

fn respond(
    request_id: &RequestId,
    snapshot: &CatalogSnapshot,
    results: Vec<ScoredCandidate>,
    degraded_after: Option<Stage>,
    budget: &LatencyBudget,
) -> SearchResponse {
    SearchResponse {
        request_id: request_id.clone(),
        snapshot_version: snapshot.version,
        results: results.into_iter().map(RankedProduct::from).collect(),
        degraded: degraded_after.map(|last_stage| Degraded {
            last_stage,
            elapsed_ms: as_ms(budget.elapsed()),
            budget_ms: budget.total().as_millis() as u64,
        }),
        timings: Timings {
            total_ms: as_ms(budget.elapsed()),
            stages: budget.timings().to_vec(),
        },
    }
}

fn finish(
    request_id: &RequestId,
    k: usize,
    budget: &mut LatencyBudget,
    result: &Result<SearchResponse, RetrievalError>,
) {
    match result {
        Ok(response) => {
            budget.complete();
            log::info!(
                "search: request_id={} k={} state={} results={} total_ms={:.2} degraded={}",
                request_id,
                k,
                budget.state(),
                response.results.len(),
                response.timings.total_ms,
                response.is_degraded()
            );
        }
        Err(err) => {
            let reached = budget.state();
            budget.fail();
            log::warn!(
                "search: request_id={} k={} state={} after={} kind={:?}: {}",
                request_id,
                k,
                budget.state(),
                reached,
                err.kind(),
                err
            );
        }
    }
}
