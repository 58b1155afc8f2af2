use std::sync::Arc;
use std::time::Duration;

use super::support::*;
use crate::catalog::tags::Mood;
use crate::catalog::ProductInput;
use crate::embedding::Embedding;
use crate::encoder::{BoundedEncoder, Encoder, EncoderError};
use crate::error::{ErrorKind, RetrievalError};
use crate::pipeline::{ManualClock, PipelineSettings, QueryContext, RawQuery, SearchPipeline, Stage, TimeoutPolicy};
use crate::rerank::Reranker;
use crate::scoring::ContextProfile;

/// "close" is nearest to the query but casual; "styled" is a little further away and
/// elegant, so context scoring flips their order.
fn two_product_pipeline(step_ms: u64, policy: TimeoutPolicy) -> SearchPipeline {
    let catalog = catalog_with(
        4,
        vec![
            ProductInput::new("close", unit(&[1.0, 0.0, 0.0, 0.0]), casual()),
            ProductInput::new("styled", unit(&[0.95, 0.31, 0.0, 0.0]), elegant()),
        ],
    );
    let settings = PipelineSettings {
        budget: Duration::from_millis(250),
        timeout_policy: policy,
        ..Default::default()
    };
    pipeline(catalog, Reranker::default(), settings)
        .with_clock(Arc::new(ManualClock::with_step(Duration::from_millis(step_ms))))
}

fn query() -> QueryContext {
    QueryContext::new(2)
        .with_text(unit(&[1.0, 0.0, 0.0, 0.0]))
        .with_context(ContextProfile {
            mood: Some(Mood::Elegant),
            ..Default::default()
        })
}

fn ids(response: &crate::SearchResponse) -> Vec<&str> {
    response.product_ids().into_iter().map(|id| id.as_str()).collect()
}

#[test]
fn test_within_budget_is_not_degraded() {
    let pipeline = two_product_pipeline(10, TimeoutPolicy::Degrade);
    let response = pipeline.search(query()).unwrap();
    assert!(!response.is_degraded());
    assert_eq!(ids(&response), vec!["styled", "close"]);
    assert_eq!(response.timings.stages.len(), 4);
    assert!((response.timings.total_ms - 40.0).abs() < 1e-9);
}

#[test]
fn test_degrades_after_scoring() {
    // Fused at 100ms, Searched at 200ms, Scored at 300ms
    let pipeline = two_product_pipeline(100, TimeoutPolicy::Degrade);
    let response = pipeline.search(query()).unwrap();

    let degraded = response.degraded.as_ref().unwrap();
    assert_eq!(degraded.last_stage, Stage::Scored);
    assert_eq!(degraded.budget_ms, 250);
    assert!((degraded.elapsed_ms - 300.0).abs() < 1e-9);
    assert_eq!(ids(&response), vec!["styled", "close"]);
    for result in &response.results {
        assert_eq!(result.final_score, result.scores.relevance);
        assert_eq!(result.scores.attention, 0.0);
    }
}

#[test]
fn test_degrades_after_search_in_ann_order() {
    // Fused at 130ms, Searched at 260ms
    let pipeline = two_product_pipeline(130, TimeoutPolicy::Degrade);
    let response = pipeline.search(query()).unwrap();

    assert_eq!(response.degraded.as_ref().unwrap().last_stage, Stage::Searched);
    assert_eq!(ids(&response), vec!["close", "styled"]);
    assert_eq!(response.results[0].rank, 1);
    assert_eq!(response.results[0].final_score, response.results[0].scores.similarity);
    assert_eq!(response.results[0].scores.sentiment, 0.0);
}

#[test]
fn test_timeout_before_candidates_always_fails() {
    for policy in [TimeoutPolicy::Degrade, TimeoutPolicy::Fail] {
        let pipeline = two_product_pipeline(300, policy);
        match pipeline.search(query()) {
            Err(RetrievalError::Timeout { stage, budget_ms, .. }) => {
                assert_eq!(stage, Stage::Fused);
                assert_eq!(budget_ms, 250);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}

#[test]
fn test_fail_policy_reports_stage() {
    let pipeline = two_product_pipeline(130, TimeoutPolicy::Fail);
    let err = pipeline.search(query()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(matches!(err, RetrievalError::Timeout { stage: Stage::Searched, .. }));

    let pipeline = two_product_pipeline(100, TimeoutPolicy::Fail);
    let err = pipeline.search(query()).unwrap_err();
    assert!(matches!(err, RetrievalError::Timeout { stage: Stage::Scored, .. }));
}

#[test]
fn test_fail_policy_applies_after_reranking() {
    // Fused at 70ms, Searched at 140ms, Scored at 210ms, Reranked at 280ms
    let pipeline = two_product_pipeline(70, TimeoutPolicy::Fail);
    match pipeline.search(query()) {
        Err(RetrievalError::Timeout { stage, elapsed_ms, budget_ms }) => {
            assert_eq!(stage, Stage::Reranked);
            assert_eq!(elapsed_ms, 280);
            assert_eq!(budget_ms, 250);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[test]
fn test_degrade_policy_keeps_full_ranking_after_reranking() {
    let pipeline = two_product_pipeline(70, TimeoutPolicy::Degrade);
    let response = pipeline.search(query()).unwrap();
    assert!(!response.is_degraded());
    assert_eq!(ids(&response), vec!["styled", "close"]);
    assert_eq!(response.timings.stages.len(), 4);
    assert!((response.timings.total_ms - 280.0).abs() < 1e-9);
}

struct SlowEncoder(Duration);

impl Encoder for SlowEncoder {
    fn encode_text(&self, _text: &str) -> Result<Embedding, EncoderError> {
        std::thread::sleep(self.0);
        Ok(Embedding::unit(vec![1.0, 0.0, 0.0, 0.0])?)
    }

    fn encode_image(&self, _image: &[u8]) -> Result<Embedding, EncoderError> {
        std::thread::sleep(self.0);
        Ok(Embedding::unit(vec![0.0, 1.0, 0.0, 0.0])?)
    }

    fn dimensions(&self) -> usize {
        4
    }

    fn model_name(&self) -> String {
        "slow".to_string()
    }
}

#[test]
fn test_slow_encoder_is_abandoned() {
    let encoder = BoundedEncoder::new(
        Arc::new(SlowEncoder(Duration::from_millis(500))),
        Duration::from_millis(20),
    );
    let pipeline = two_product_pipeline(1, TimeoutPolicy::Degrade).with_encoder(encoder);
    let err = pipeline
        .search_encoded(RawQuery::new(QueryContext::new(2)).with_text("gown"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EncodingFailed);
}

#[test]
fn test_second_encoder_call_gets_only_the_budget_left() {
    let catalog = catalog_with(
        4,
        vec![ProductInput::new("close", unit(&[1.0, 0.0, 0.0, 0.0]), casual())],
    );
    let settings = PipelineSettings {
        budget: Duration::from_millis(200),
        ..Default::default()
    };
    let encoder = BoundedEncoder::new(
        Arc::new(SlowEncoder(Duration::from_millis(150))),
        Duration::from_secs(5),
    );
    let pipeline = pipeline(catalog, Reranker::default(), settings).with_encoder(encoder);

    // The text call leaves about 50ms, which the image call cannot finish in.
    let err = pipeline
        .search_encoded(
            RawQuery::new(QueryContext::new(1))
                .with_text("gown")
                .with_image(vec![0xff, 0xd8]),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EncodingFailed);
}
