use rand::rngs::StdRng;
use rand::SeedableRng;

use super::support::*;
use crate::ann::HnswConfig;
use crate::catalog::{Catalog, ProductId};
use crate::pipeline::QueryContext;
use crate::scoring::ContextProfile;
use crate::storage::CatalogDir;

fn config() -> HnswConfig {
    HnswConfig::new(8)
}

#[test]
fn test_saved_catalog_searches_identically() {
    let tmp = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(21);
    let queries: Vec<_> = (0..5).map(|_| random_unit(&mut rng, 8)).collect();
    let context = ContextProfile::from_query_text("elegant wedding in summer");

    let written = {
        let catalog = Catalog::open(CatalogDir::new(tmp.path()).unwrap(), config()).unwrap();
        catalog.upsert_batch(random_products(&mut rng, 120, 8)).unwrap();
        catalog.remove(&[ProductId::from("p0005")]).unwrap();
        catalog.save().unwrap();
        std::sync::Arc::new(catalog)
    };
    let reopened = std::sync::Arc::new(
        Catalog::open_shared(CatalogDir::new(tmp.path()).unwrap(), config()).unwrap(),
    );

    let before = written.snapshot().unwrap();
    let after = reopened.snapshot().unwrap();
    assert_eq!(after.version, before.version);
    assert_eq!(after.store.len(), 119);
    assert_eq!(after.index.node_count(), before.index.node_count());
    assert_eq!(
        after.store.metadata(&"p0003".into()),
        before.store.metadata(&"p0003".into())
    );

    let written = default_pipeline(written);
    let reopened = default_pipeline(reopened);
    for query in queries {
        let query = QueryContext::new(10).with_text(query).with_context(context);
        let a = written.search(query.clone()).unwrap();
        let b = reopened.search(query).unwrap();
        assert_eq!(a.results, b.results);
        assert!(!b.product_ids().contains(&&ProductId::from("p0005")));
    }
}

#[test]
fn test_reopened_writer_continues_versions() {
    let tmp = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(9);
    let mut products = random_products(&mut rng, 3, 8);
    {
        let catalog = Catalog::open(CatalogDir::new(tmp.path()).unwrap(), config()).unwrap();
        catalog.upsert_batch(products.clone()).unwrap();
        catalog.save().unwrap();
    }

    let catalog = Catalog::open(CatalogDir::new(tmp.path()).unwrap(), config()).unwrap();
    let replacement = products.remove(0);
    let report = catalog.upsert(replacement).unwrap();
    assert_eq!(report.replaced, 1);
    assert_eq!(report.snapshot_version, 2);
    let snapshot = catalog.snapshot().unwrap();
    assert_eq!(snapshot.store.get(&"p0000".into()).unwrap().version, 2);
}
