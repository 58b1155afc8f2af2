use std::sync::atomic::{AtomicBool, Ordering};

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::support::*;
use crate::catalog::ProductInput;
use crate::embedding::Embedding;
use crate::error::ErrorKind;
use crate::pipeline::QueryContext;

const BATCH: usize = 10;
const BATCHES: usize = 8;

#[test]
fn test_readers_never_see_partial_batches() {
    let mut rng = StdRng::seed_from_u64(5);
    let catalog = catalog_with(8, Vec::new());
    let batches: Vec<Vec<ProductInput>> = (0..BATCHES)
        .map(|b| {
            random_products(&mut rng, BATCH, 8)
                .into_iter()
                .map(|mut p| {
                    p.id = format!("b{b}-{}", p.id).into();
                    p
                })
                .collect()
        })
        .collect();
    let queries: Vec<_> = (0..4).map(|_| random_unit(&mut rng, 8)).collect();
    let pipeline = default_pipeline(catalog.clone());
    let done = AtomicBool::new(false);

    std::thread::scope(|scope| {
        for query in &queries {
            let (catalog, pipeline, done) = (&catalog, &pipeline, &done);
            scope.spawn(move || {
                let mut last_version = 0;
                while !done.load(Ordering::SeqCst) {
                    let snapshot = catalog.snapshot().unwrap();
                    assert_eq!(snapshot.store.len(), snapshot.index.len());
                    assert_eq!(snapshot.store.len() % BATCH, 0);
                    assert!(snapshot.version >= last_version);
                    last_version = snapshot.version;

                    let response = pipeline.search(QueryContext::new(5).with_text(query.clone())).unwrap();
                    assert!(response.snapshot_version >= last_version);
                    assert!(response.results.len() <= 5);
                }
            });
        }

        scope.spawn(|| {
            for batch in batches {
                catalog.upsert_batch(batch).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        });
    });

    let snapshot = catalog.snapshot().unwrap();
    assert_eq!(snapshot.store.len(), BATCH * BATCHES);
    assert_eq!(snapshot.version, BATCHES as u64);
    assert!(snapshot.index.unreachable_nodes().is_empty());
}

#[test]
fn test_failed_batch_publishes_nothing() {
    let catalog = catalog_with(
        4,
        vec![ProductInput::new("ok", unit(&[1.0, 0.0, 0.0, 0.0]), casual())],
    );
    let before = catalog.snapshot().unwrap();

    let bad = vec![
        ProductInput::new("fine", unit(&[0.0, 1.0, 0.0, 0.0]), casual()),
        ProductInput::new("short", unit(&[1.0, 0.0]), casual()),
    ];
    let err = catalog.upsert_batch(bad).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidEmbedding);

    let after = catalog.snapshot().unwrap();
    assert_eq!(after.version, before.version);
    assert_eq!(after.store.len(), 1);
    assert!(!after.store.contains(&"fine".into()));
}

#[test]
fn test_rejected_inserts_report_invalid_embedding() {
    let catalog = catalog_with(4, Vec::new());

    let short = catalog.upsert(ProductInput::new("short", unit(&[1.0, 0.0]), casual()));
    assert_eq!(short.unwrap_err().kind(), ErrorKind::InvalidEmbedding);

    let loose = Embedding::new(vec![2.0, 0.0, 0.0, 0.0]);
    let loose = catalog.upsert(ProductInput::new("loose", loose, casual()));
    assert_eq!(loose.unwrap_err().kind(), ErrorKind::InvalidEmbedding);

    assert!(catalog.snapshot().unwrap().store.is_empty());
}

#[test]
fn test_held_snapshot_is_unchanged_by_writes() {
    let catalog = catalog_with(
        4,
        vec![ProductInput::new("first", unit(&[1.0, 0.0, 0.0, 0.0]), casual())],
    );
    let held = catalog.snapshot().unwrap();
    catalog
        .upsert(ProductInput::new("second", unit(&[0.0, 1.0, 0.0, 0.0]), casual()))
        .unwrap();

    assert_eq!(held.store.len(), 1);
    assert_eq!(catalog.snapshot().unwrap().store.len(), 2);
}
