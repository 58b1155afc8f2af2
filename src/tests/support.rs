//! Shared fixtures for the scenario tests.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;

use crate::ann::HnswConfig;
use crate::catalog::tags::{Mood, Occasion};
use crate::catalog::{Catalog, ProductInput, ProductMetadata, SentimentAttributes};
use crate::embedding::Embedding;
use crate::fusion::FusionEngine;
use crate::pipeline::{PipelineSettings, SearchPipeline};
use crate::rerank::Reranker;
use crate::scoring::ContextScorer;

pub(crate) fn unit(values: &[f32]) -> Embedding {
    Embedding::normalized(values.to_vec()).unwrap()
}

pub(crate) fn random_unit(rng: &mut StdRng, dimensions: usize) -> Embedding {
    let values: Vec<f32> = (0..dimensions)
        .map(|_| rng.random::<f32>() * 2.0 - 1.0)
        .collect();
    Embedding::normalized(values).unwrap()
}

pub(crate) fn elegant() -> ProductMetadata {
    ProductMetadata {
        title: Some("Silk evening gown".to_string()),
        category: Some("dresses".to_string()),
        price: Some(240.0),
        sentiment: SentimentAttributes::new(0.9, 0.1, 0.2, 0.6),
        occasions: [Occasion::Wedding, Occasion::Formal].into_iter().collect(),
        moods: [Mood::Elegant].into_iter().collect(),
        ..Default::default()
    }
}

pub(crate) fn casual() -> ProductMetadata {
    ProductMetadata {
        title: Some("Cotton tee".to_string()),
        category: Some("tops".to_string()),
        price: Some(25.0),
        sentiment: SentimentAttributes::new(0.1, 0.9, 0.2, 0.2),
        occasions: [Occasion::Casual].into_iter().collect(),
        moods: [Mood::Relaxed].into_iter().collect(),
        ..Default::default()
    }
}

/// Random catalog where every third product is elegant and the rest casual.
pub(crate) fn random_products(rng: &mut StdRng, count: usize, dimensions: usize) -> Vec<ProductInput> {
    (0..count)
        .map(|i| {
            let metadata = if i % 3 == 0 { elegant() } else { casual() };
            ProductInput::new(format!("p{i:04}"), random_unit(rng, dimensions), metadata)
        })
        .collect()
}

pub(crate) fn catalog_with(dimensions: usize, products: Vec<ProductInput>) -> Arc<Catalog> {
    let catalog = Catalog::new(HnswConfig::new(dimensions)).unwrap();
    if !products.is_empty() {
        catalog.upsert_batch(products).unwrap();
    }
    Arc::new(catalog)
}

pub(crate) fn pipeline(catalog: Arc<Catalog>, reranker: Reranker, settings: PipelineSettings) -> SearchPipeline {
    let dimensions = catalog.config().dimensions;
    SearchPipeline::new(
        catalog,
        FusionEngine::weighted_average(dimensions),
        ContextScorer::default(),
        reranker,
        settings,
    )
}

pub(crate) fn default_pipeline(catalog: Arc<Catalog>) -> SearchPipeline {
    pipeline(catalog, Reranker::default(), PipelineSettings::default())
}
