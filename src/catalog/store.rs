//! Append-only product store.
//!
//! The store owns every product version ever inserted. Replacing or removing a product
//! moves its current version to the history; nothing is mutated in place.

use std::collections::HashMap;
use std::sync::Arc;

use super::product::{Product, ProductId, ProductInput, ProductMetadata};
use crate::embedding::EmbeddingError;

#[derive(Debug, Clone)]
pub struct VectorStore {
    dimensions: usize,
    current: HashMap<ProductId, Arc<Product>>,
    history: Vec<Arc<Product>>,
    last_version: HashMap<ProductId, u32>,
}

impl VectorStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            current: HashMap::new(),
            history: Vec::new(),
            last_version: HashMap::new(),
        }
    }

    /// Rebuild a store from already-versioned products, e.g. after loading from disk.
    pub fn from_products(
        dimensions: usize,
        products: impl IntoIterator<Item = Product>,
    ) -> Result<Self, EmbeddingError> {
        let mut store = Self::new(dimensions);
        for product in products {
            product.embedding.check_dimensions(dimensions)?;
            product.embedding.check_unit()?;
            store
                .last_version
                .insert(product.id.clone(), product.version);
            if let Some(old) = store.current.insert(product.id.clone(), Arc::new(product)) {
                store.history.push(old);
            }
        }
        Ok(store)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of current (non-removed) products.
    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn get(&self, id: &ProductId) -> Option<&Arc<Product>> {
        self.current.get(id)
    }

    pub fn metadata(&self, id: &ProductId) -> Option<&ProductMetadata> {
        self.current.get(id).map(|p| &p.metadata)
    }

    pub fn contains(&self, id: &ProductId) -> bool {
        self.current.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Product>> {
        self.current.values()
    }

    /// Superseded and removed versions of `id`, oldest first.
    pub fn history(&self, id: &ProductId) -> Vec<&Product> {
        self.history
            .iter()
            .filter(|p| &p.id == id)
            .map(|p| p.as_ref())
            .collect()
    }

    /// Insert a product, or replace it with a new version.
    pub fn upsert(&mut self, input: ProductInput) -> Result<Arc<Product>, EmbeddingError> {
        input.embedding.check_dimensions(self.dimensions)?;
        input.embedding.check_unit()?;

        let version = self
            .last_version
            .get(&input.id)
            .map(|v| v + 1)
            .unwrap_or(1);
        self.last_version.insert(input.id.clone(), version);

        let product = Arc::new(Product {
            id: input.id,
            version,
            embedding: input.embedding,
            metadata: input.metadata,
        });
        if let Some(old) = self.current.insert(product.id.clone(), product.clone()) {
            self.history.push(old);
        }
        Ok(product)
    }

    /// Retire the current version of `id` into the history.
    pub fn remove(&mut self, id: &ProductId) -> Option<Arc<Product>> {
        let removed = self.current.remove(id)?;
        self.history.push(removed.clone());
        Some(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedding;

    fn input(id: &str, values: &[f32]) -> ProductInput {
        ProductInput::new(
            id,
            Embedding::normalized(values.to_vec()).unwrap(),
            ProductMetadata::default(),
        )
    }

    #[test]
    fn test_upsert_assigns_versions() {
        let mut store = VectorStore::new(2);
        let first = store.upsert(input("a", &[1.0, 0.0])).unwrap();
        assert_eq!(first.version, 1);

        let second = store.upsert(input("a", &[0.0, 1.0])).unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(store.len(), 1);

        let history = store.history(&ProductId::from("a"));
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].version, 1);
        assert_eq!(history[0].embedding.as_slice(), &[1.0, 0.0]);
    }

    #[test]
    fn test_remove_keeps_history_and_version_sequence() {
        let mut store = VectorStore::new(2);
        store.upsert(input("a", &[1.0, 0.0])).unwrap();
        let removed = store.remove(&ProductId::from("a")).unwrap();
        assert_eq!(removed.version, 1);
        assert!(store.is_empty());
        assert!(store.remove(&ProductId::from("a")).is_none());

        let again = store.upsert(input("a", &[1.0, 0.0])).unwrap();
        assert_eq!(again.version, 2);
    }

    #[test]
    fn test_upsert_rejects_unnormalized() {
        let mut store = VectorStore::new(2);
        let bad = ProductInput::new("a", Embedding::new(vec![2.0, 0.0]), ProductMetadata::default());
        assert!(matches!(store.upsert(bad), Err(EmbeddingError::NotNormalized(_))));

        let wrong = input("b", &[1.0, 0.0, 0.0]);
        assert!(matches!(
            store.upsert(wrong),
            Err(EmbeddingError::DimensionMismatch { expected: 2, got: 3 })
        ));
        assert!(store.is_empty());
    }
}
