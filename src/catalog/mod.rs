//! Versioned product catalog: one [`VectorStore`] and one [`HnswIndex`] published
//! together as immutable snapshots.
//!
//! - Readers call [`Catalog::snapshot`] and keep the returned `Arc` for the whole request
//! - A single writer clones the current snapshot, applies a batch, repairs graph
//!   connectivity and swaps the pointer
//! - Nothing is global; independent catalogs can coexist in one process

pub mod ingest;
pub mod product;
pub mod store;
pub mod tags;

pub use product::{Product, ProductId, ProductInput, ProductMetadata, SentimentAttributes};
pub use store::VectorStore;

use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ann::{HnswConfig, HnswIndex, IndexStats};
use crate::error::RetrievalError;
use crate::lock::FileLock;
use crate::storage::metadata_file::{self, MetadataFile, StoredMetadata};
use crate::storage::{index_file, CatalogDir, StorageError};

/// A consistent point-in-time view of the catalog.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub store: VectorStore,
    pub index: HnswIndex,
}

impl CatalogSnapshot {
    fn empty(config: HnswConfig) -> Result<Self, RetrievalError> {
        Ok(Self {
            version: 0,
            created_at: Utc::now(),
            store: VectorStore::new(config.dimensions),
            index: HnswIndex::new(config)?,
        })
    }

    pub fn stats(&self) -> CatalogStats {
        CatalogStats {
            snapshot_version: self.version,
            created_at: self.created_at,
            products: self.store.len(),
            index: self.index.stats(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogStats {
    pub snapshot_version: u64,
    pub created_at: DateTime<Utc>,
    pub products: usize,
    pub index: IndexStats,
}

/// Outcome of one write batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub inserted: usize,
    pub replaced: usize,
    pub removed: usize,
    pub repaired: usize,
    pub snapshot_version: u64,
}

/// Owned catalog handle.
///
/// Created empty with [`Catalog::new`], loaded from disk with [`Catalog::open`], or
/// left unloaded with [`Catalog::unloaded`]. Dropping the handle releases the
/// directory lock, if one is held.
pub struct Catalog {
    config: HnswConfig,
    state: RwLock<Option<Arc<CatalogSnapshot>>>,
    writer: Mutex<()>,
    dir: Option<CatalogDir>,
    encoder_fingerprint: Option<String>,
    _lock: Option<FileLock>,
}

impl Catalog {
    /// In-memory catalog with an empty snapshot.
    pub fn new(config: HnswConfig) -> Result<Self, RetrievalError> {
        let snapshot = CatalogSnapshot::empty(config)?;
        Ok(Self::with_state(config, Some(snapshot), None, None))
    }

    /// Catalog with no index loaded. Searches fail with `IndexNotLoaded` until the
    /// first write batch publishes a snapshot.
    pub fn unloaded(config: HnswConfig) -> Result<Self, RetrievalError> {
        config.validate()?;
        Ok(Self::with_state(config, None, None, None))
    }

    /// Open a catalog directory for writing, holding its lock for the handle's lifetime.
    /// An empty catalog is created if the directory has no index yet.
    pub fn open(dir: CatalogDir, config: HnswConfig) -> Result<Self, RetrievalError> {
        let lock = FileLock::try_acquire(dir.path()).map_err(StorageError::Io)?;
        let snapshot = Self::load_snapshot(&dir, config)?;
        let fingerprint = Self::read_fingerprint(&dir);
        let mut catalog = Self::with_state(config, Some(snapshot), Some(dir), Some(lock));
        catalog.encoder_fingerprint = fingerprint;
        Ok(catalog)
    }

    /// Open a catalog directory read-only. Requires an index file.
    pub fn open_shared(dir: CatalogDir, config: HnswConfig) -> Result<Self, RetrievalError> {
        if !dir.index_path().exists() {
            return Err(RetrievalError::IndexNotLoaded);
        }
        let snapshot = Self::load_snapshot(&dir, config)?;
        let fingerprint = Self::read_fingerprint(&dir);
        let mut catalog = Self::with_state(config, Some(snapshot), Some(dir), None);
        catalog.encoder_fingerprint = fingerprint;
        Ok(catalog)
    }

    fn with_state(
        config: HnswConfig,
        snapshot: Option<CatalogSnapshot>,
        dir: Option<CatalogDir>,
        lock: Option<FileLock>,
    ) -> Self {
        Self {
            config,
            state: RwLock::new(snapshot.map(Arc::new)),
            writer: Mutex::new(()),
            dir,
            encoder_fingerprint: None,
            _lock: lock,
        }
    }

    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    pub fn dir(&self) -> Option<&CatalogDir> {
        self.dir.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.state.read().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Fingerprint of the encoder recorded with the catalog embeddings.
    pub fn encoder_fingerprint(&self) -> Option<&str> {
        self.encoder_fingerprint.as_deref()
    }

    pub fn set_encoder_fingerprint(&mut self, fingerprint: Option<String>) {
        self.encoder_fingerprint = fingerprint;
    }

    /// Current published snapshot.
    pub fn snapshot(&self) -> Result<Arc<CatalogSnapshot>, RetrievalError> {
        let guard = self
            .state
            .read()
            .map_err(|e| RetrievalError::Internal(format!("Lock poisoned: {}", e)))?;
        guard.clone().ok_or(RetrievalError::IndexNotLoaded)
    }

    pub fn upsert(&self, product: ProductInput) -> Result<BatchReport, RetrievalError> {
        self.upsert_batch(vec![product])
    }

    /// Insert or replace a batch of products and publish one new snapshot.
    ///
    /// The batch is all-or-nothing: if any product is rejected, nothing is published.
    pub fn upsert_batch(&self, products: Vec<ProductInput>) -> Result<BatchReport, RetrievalError> {
        self.upsert_batch_with_progress(products, |_| {})
    }

    /// Like [`Catalog::upsert_batch`], calling `on_progress` after each product is indexed.
    pub fn upsert_batch_with_progress(
        &self,
        products: Vec<ProductInput>,
        mut on_progress: impl FnMut(usize),
    ) -> Result<BatchReport, RetrievalError> {
        self.write(|next, report| {
            for (position, input) in products.into_iter().enumerate() {
                let replacing = next.store.contains(&input.id);
                let id = input.id.clone();
                let product = next.store.upsert(input).map_err(|e| {
                    RetrievalError::InvalidEmbedding(format!("product {id}: {e}"))
                })?;
                next.index
                    .insert(product.id.clone(), product.version, &product.embedding)?;
                if replacing {
                    report.replaced += 1;
                } else {
                    report.inserted += 1;
                }
                on_progress(position + 1);
            }
            Ok(())
        })
    }

    /// Remove products. Unknown ids are ignored.
    pub fn remove(&self, ids: &[ProductId]) -> Result<BatchReport, RetrievalError> {
        self.write(|next, report| {
            for id in ids {
                if next.store.remove(id).is_some() {
                    next.index.remove(id);
                    report.removed += 1;
                }
            }
            Ok(())
        })
    }

    /// Rebuild the graph from the live products only, dropping all tombstones.
    pub fn compact(&self) -> Result<BatchReport, RetrievalError> {
        self.write(|next, report| {
            let mut products: Vec<Arc<Product>> = next.store.iter().cloned().collect();
            products.sort_by(|a, b| a.id.cmp(&b.id));
            let mut index = HnswIndex::new(*next.index.config())?;
            for product in products {
                index.insert(product.id.clone(), product.version, &product.embedding)?;
            }
            report.removed = next.index.node_count() - index.node_count();
            next.index = index;
            Ok(())
        })
    }

    fn write(
        &self,
        apply: impl FnOnce(&mut CatalogSnapshot, &mut BatchReport) -> Result<(), RetrievalError>,
    ) -> Result<BatchReport, RetrievalError> {
        let _writer = self
            .writer
            .lock()
            .map_err(|e| RetrievalError::Internal(format!("Lock poisoned: {}", e)))?;

        let current = {
            let guard = self
                .state
                .read()
                .map_err(|e| RetrievalError::Internal(format!("Lock poisoned: {}", e)))?;
            guard.clone()
        };
        let mut next = match current {
            Some(snapshot) => snapshot.as_ref().clone(),
            None => CatalogSnapshot::empty(self.config)?,
        };

        let mut report = BatchReport::default();
        apply(&mut next, &mut report)?;

        report.repaired = next.index.repair_connectivity();
        next.version += 1;
        next.created_at = Utc::now();
        report.snapshot_version = next.version;

        let mut guard = self
            .state
            .write()
            .map_err(|e| RetrievalError::Internal(format!("Lock poisoned: {}", e)))?;
        *guard = Some(Arc::new(next));
        drop(guard);

        log::info!(
            "catalog: published snapshot={} inserted={} replaced={} removed={} repaired={}",
            report.snapshot_version,
            report.inserted,
            report.replaced,
            report.removed,
            report.repaired
        );
        Ok(report)
    }

    /// Persist the current snapshot to the catalog directory.
    pub fn save(&self) -> Result<(), RetrievalError> {
        let dir = self
            .dir
            .as_ref()
            .ok_or_else(|| RetrievalError::Internal("catalog has no directory".to_string()))?;
        let snapshot = self.snapshot()?;

        index_file::write_index(&dir.index_path(), &snapshot.index)?;

        let mut sidecar = MetadataFile::new(snapshot.version, snapshot.store.dimensions());
        sidecar.encoder_fingerprint = self.encoder_fingerprint.clone();
        for product in snapshot.store.iter() {
            sidecar.products.insert(
                product.id.clone(),
                StoredMetadata {
                    version: product.version,
                    metadata: product.metadata.clone(),
                },
            );
        }
        metadata_file::write_metadata(&dir.metadata_path(), &sidecar)?;

        log::info!(
            "catalog: saved snapshot={} products={} to {}",
            snapshot.version,
            snapshot.store.len(),
            dir.path().display()
        );
        Ok(())
    }

    fn load_snapshot(dir: &CatalogDir, config: HnswConfig) -> Result<CatalogSnapshot, RetrievalError> {
        if !dir.index_path().exists() {
            log::info!("catalog: no index at {}, starting empty", dir.path().display());
            return CatalogSnapshot::empty(config);
        }

        let index = index_file::read_index(&dir.index_path(), &config)?;
        let sidecar = match metadata_file::read_metadata(&dir.metadata_path()) {
            Ok(sidecar) => Some(sidecar),
            Err(StorageError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("catalog: metadata sidecar missing, products load with empty metadata");
                None
            }
            Err(e) => return Err(e.into()),
        };

        let mut products = Vec::with_capacity(index.len());
        let mut missing = 0usize;
        for (node_id, node) in index.nodes().iter().enumerate() {
            if node.is_tombstone() {
                continue;
            }
            let metadata = sidecar
                .as_ref()
                .and_then(|s| s.products.get(node.product_id()))
                .filter(|stored| stored.version == node.version())
                .map(|stored| stored.metadata.clone());
            if metadata.is_none() {
                missing += 1;
            }
            products.push(Product {
                id: node.product_id().clone(),
                version: node.version(),
                embedding: crate::embedding::Embedding::new(index.vector(node_id as u32).to_vec()),
                metadata: metadata.unwrap_or_default(),
            });
        }
        if missing > 0 && sidecar.is_some() {
            log::warn!("catalog: {missing} products have no matching metadata entry");
        }

        let store = VectorStore::from_products(index.dimensions(), products)?;
        let version = sidecar.as_ref().map(|s| s.snapshot_version).unwrap_or(0);
        let created_at = sidecar.as_ref().map(|s| s.saved_at).unwrap_or_else(Utc::now);

        log::info!(
            "catalog: loaded snapshot={} products={} nodes={} from {}",
            version,
            store.len(),
            index.node_count(),
            dir.path().display()
        );

        Ok(CatalogSnapshot {
            version,
            created_at,
            store,
            index,
        })
    }

    fn read_fingerprint(dir: &CatalogDir) -> Option<String> {
        metadata_file::read_metadata(&dir.metadata_path())
            .ok()
            .and_then(|s| s.encoder_fingerprint)
    }
}
