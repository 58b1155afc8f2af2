use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use shopsense::catalog::ingest;
use shopsense::catalog::{Catalog, ProductId};
use shopsense::config::Config;
use shopsense::embedding::Embedding;
use shopsense::encoder::{BoundedEncoder, Encoder};
use shopsense::fusion::FusionEngine;
use shopsense::pipeline::{Filters, QueryContext, RawQuery, SearchPipeline};
use shopsense::scoring::ContextProfile;
use shopsense::storage::CatalogDir;

use super::errors::CliError;
use super::types::{ContextArgs, FilterArgs, QueryInputArgs};
use super::validation::*;

pub fn handle_build(config: &Config, catalog_path: &Path, image_root: Option<PathBuf>, quiet: bool) -> Result<()> {
    let file = std::fs::File::open(catalog_path)
        .with_context(|| format!("Failed to open catalog file {}", catalog_path.display()))?;
    let records = ingest::parse_jsonl(std::io::BufReader::new(file))?;
    let image_root = image_root
        .or_else(|| catalog_path.parent().map(Path::to_path_buf))
        .unwrap_or_default();

    let needs_encoder = records.iter().any(|r| r.embedding.is_none());
    let encoder = if needs_encoder {
        Some(create_encoder(config)?)
    } else {
        None
    };

    let dimensions = config.index.dimensions;
    let fusion = FusionEngine::from_config(&config.fusion, dimensions, config.base_path())?;
    log::info!("build: preparing {} records", records.len());
    let products = ingest::prepare(
        records,
        encoder.as_deref(),
        &fusion,
        config.fusion.catalog_alpha,
        &image_root,
    )?;

    let dir = CatalogDir::new(config.base_path())?;
    let mut catalog = Catalog::open(dir, config.index.hnsw())?;
    if let Some(encoder) = &encoder {
        let fingerprint = encoder.fingerprint();
        if let Some(previous) = catalog.encoder_fingerprint() {
            if previous != fingerprint {
                log::warn!(
                    "build: encoder changed since the catalog was built ({} -> {}); existing embeddings are not comparable",
                    previous,
                    fingerprint
                );
            }
        }
        catalog.set_encoder_fingerprint(Some(fingerprint));
    }

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(products.len() as u64)
    };
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} indexed")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let report = catalog.upsert_batch_with_progress(products, |done| progress.set_position(done as u64))?;
    progress.finish_and_clear();

    catalog.save()?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub fn handle_search(
    config: &Config,
    input: QueryInputArgs,
    context: ContextArgs,
    filters: FilterArgs,
    alpha: Option<f32>,
    k: usize,
    diversity: Option<f32>,
) -> Result<()> {
    let alpha = alpha.unwrap_or(config.fusion.default_alpha);
    validate_alpha(alpha)?;
    validate_k(k)?;
    if let Some(diversity) = diversity {
        validate_diversity(diversity)?;
    }
    validate_price_range(filters.min_price, filters.max_price)?;
    validate_query_input(
        input.text.is_some() || input.text_embedding.is_some(),
        input.image.is_some() || input.image_embedding.is_some(),
    )?;

    let mut profile = ContextProfile {
        occasion: context.occasion,
        mood: context.mood,
        season: context.season,
        time_of_day: context.time_of_day,
    };
    if context.auto_context {
        if let Some(text) = &input.text {
            let detected = ContextProfile::from_query_text(text);
            log::debug!("search: detected context {:?}", detected);
            profile = profile.or(detected);
        }
    }

    let mut query = QueryContext::new(k)
        .with_alpha(alpha)
        .with_context(profile)
        .with_filters(Filters {
            category: filters.category,
            min_price: filters.min_price,
            max_price: filters.max_price,
        });
    if let Some(diversity) = diversity {
        query = query.with_diversity(diversity);
    }
    if let Some(path) = &input.text_embedding {
        query = query.with_text(read_embedding(path)?);
    }
    if let Some(path) = &input.image_embedding {
        query = query.with_image(read_embedding(path)?);
    }

    let catalog = Arc::new(open_shared(config)?);
    let mut pipeline = SearchPipeline::from_config(config, catalog)?;

    let result = if input.needs_encoder() {
        let encoder = create_encoder(config)?;
        let timeout = Duration::from_secs(config.encoder.timeout_secs);
        pipeline = pipeline.with_encoder(BoundedEncoder::new(encoder, timeout));

        let mut raw = RawQuery::new(query);
        if let Some(text) = input.text {
            raw = raw.with_text(text);
        }
        if let Some(path) = &input.image {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read image {}", path.display()))?;
            raw = raw.with_image(bytes);
        }
        pipeline.search_encoded(raw)
    } else {
        pipeline.search(query)
    };

    match result {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(err) => {
            println!("{}", serde_json::to_string_pretty(&err.report())?);
            Err(err.into())
        }
    }
}

pub fn handle_remove(config: &Config, ids: Vec<String>) -> Result<()> {
    validate_ids(&ids)?;
    let ids: Vec<ProductId> = ids.into_iter().map(ProductId::from).collect();

    let dir = CatalogDir::new(config.base_path())?;
    let catalog = Catalog::open(dir, config.index.hnsw())?;
    let report = catalog.remove(&ids)?;
    catalog.save()?;

    if report.removed < ids.len() {
        log::warn!("remove: {} of {} ids were not in the catalog", ids.len() - report.removed, ids.len());
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub fn handle_stats(config: &Config) -> Result<()> {
    let catalog = open_shared(config)?;
    let stats = catalog.snapshot()?.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

pub fn handle_compact(config: &Config) -> Result<()> {
    let dir = CatalogDir::new(config.base_path())?;
    let catalog = Catalog::open(dir, config.index.hnsw())?;
    let report = catalog.compact()?;
    catalog.save()?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn open_shared(config: &Config) -> Result<Catalog> {
    let dir = CatalogDir::new(config.base_path())?;
    Catalog::open_shared(dir, config.index.hnsw())
        .context("Failed to open catalog, run `shopsense build` first")
}

fn read_embedding(path: &Path) -> Result<Embedding> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read embedding file {}", path.display()))?;
    Ok(Embedding::new(parse_embedding(&data)?))
}

#[cfg(feature = "clip")]
fn create_encoder(config: &Config) -> Result<Arc<dyn Encoder>> {
    if !config.encoder.enabled {
        return Err(CliError::configuration("encoder is disabled in config.yaml").into());
    }
    log::info!("Loading encoder model {}", config.encoder.model);
    let encoder = shopsense::encoder::ClipEncoder::new(
        &config.encoder.model,
        config.encoder_cache_dir(),
        config.encoder.show_download_progress,
    )?;
    Ok(Arc::new(encoder))
}

#[cfg(not(feature = "clip"))]
fn create_encoder(_config: &Config) -> Result<Arc<dyn Encoder>> {
    Err(CliError::configuration(
        "built without the `clip` feature; provide precomputed embeddings instead",
    )
    .into())
}
