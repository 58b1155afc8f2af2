//! Catalog ingest: JSON Lines records into catalog-ready products.
//!
//! Each line is one product. A record either carries a ready `embedding`, or per-modality
//! `text_embedding` / `image_embedding` vectors, or raw `text` / `image_path` inputs that
//! are encoded and then fused (image weight `catalog_alpha`).

use std::io::BufRead;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{ProductId, ProductInput, ProductMetadata};
use crate::embedding::Embedding;
use crate::encoder::{Encoder, EncoderError};
use crate::error::RetrievalError;
use crate::fusion::FusionEngine;

/// Maximum text length fed to the encoder (characters, not tokens)
const MAX_TEXT_LENGTH: usize = 512;

/// Ellipsis suffix when text is truncated
const TRUNCATION_SUFFIX: &str = "...";

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        source: serde_json::Error,
    },

    #[error("product {id}: {source}")]
    Record { id: ProductId, source: RetrievalError },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,
    #[serde(default)]
    pub metadata: ProductMetadata,
}

/// Parse JSON Lines, skipping blank lines.
pub fn parse_jsonl(reader: impl BufRead) -> Result<Vec<CatalogRecord>, IngestError> {
    let mut records = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| IngestError::Parse {
            line: number + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Resolve every record to a single product embedding.
///
/// Relative image paths resolve against `image_root`. Records are processed in parallel;
/// the first failure aborts the whole set.
pub fn prepare(
    records: Vec<CatalogRecord>,
    encoder: Option<&dyn Encoder>,
    fusion: &FusionEngine,
    catalog_alpha: f32,
    image_root: &Path,
) -> Result<Vec<ProductInput>, IngestError> {
    records
        .into_par_iter()
        .map(|record| {
            let id = record.id.clone();
            prepare_one(record, encoder, fusion, catalog_alpha, image_root)
                .map_err(|source| IngestError::Record { id, source })
        })
        .collect()
}

fn prepare_one(
    record: CatalogRecord,
    encoder: Option<&dyn Encoder>,
    fusion: &FusionEngine,
    catalog_alpha: f32,
    image_root: &Path,
) -> Result<ProductInput, RetrievalError> {
    if let Some(values) = record.embedding {
        let embedding = Embedding::normalized(values)?;
        embedding.check_dimensions(fusion.dimensions())?;
        return Ok(ProductInput::new(record.id, embedding, record.metadata));
    }

    let text = match record.text_embedding {
        Some(values) => Some(Embedding::new(values)),
        None => {
            let content = record
                .text
                .as_deref()
                .map(str::to_string)
                .or_else(|| {
                    preprocess_text(
                        record.metadata.title.as_deref().unwrap_or_default(),
                        record.description.as_deref().unwrap_or_default(),
                    )
                });
            match content {
                Some(content) => Some(required(encoder)?.encode_text(&content)?),
                None => None,
            }
        }
    };

    let image = match (record.image_embedding, &record.image_path) {
        (Some(values), _) => Some(Embedding::new(values)),
        (None, Some(path)) => {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                image_root.join(path)
            };
            let bytes = std::fs::read(&path).map_err(|e| {
                EncoderError::InvalidInput(format!("cannot read {}: {}", path.display(), e))
            })?;
            Some(required(encoder)?.encode_image(&bytes)?)
        }
        (None, None) => None,
    };

    if text.is_none() && image.is_none() {
        return Err(RetrievalError::InvalidQuery(
            "record has no embedding, text, title or image".to_string(),
        ));
    }

    let embedding = fusion.fuse(text.as_ref(), image.as_ref(), catalog_alpha)?;
    Ok(ProductInput::new(record.id, embedding, record.metadata))
}

fn required(encoder: Option<&dyn Encoder>) -> Result<&dyn Encoder, EncoderError> {
    encoder.ok_or(EncoderError::Unavailable)
}

/// Prepare title and description as encoder input.
///
/// Returns `None` if both are empty after trimming. Otherwise, concatenates them and
/// truncates to `MAX_TEXT_LENGTH`.
pub fn preprocess_text(title: &str, description: &str) -> Option<String> {
    let title = title.trim();
    let description = description.trim();

    if title.is_empty() && description.is_empty() {
        return None;
    }

    let content = if title.is_empty() {
        description.to_string()
    } else if description.is_empty() {
        title.to_string()
    } else {
        format!("{} - {}", title, description)
    };

    Some(truncate(&content))
}

fn truncate(content: &str) -> String {
    if content.chars().count() <= MAX_TEXT_LENGTH {
        return content.to_string();
    }

    let max_chars = MAX_TEXT_LENGTH - TRUNCATION_SUFFIX.len();
    let truncated: String = content.chars().take(max_chars).collect();

    format!("{}{}", truncated, TRUNCATION_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    struct AxisEncoder;

    impl Encoder for AxisEncoder {
        fn encode_text(&self, _text: &str) -> Result<Embedding, EncoderError> {
            Ok(Embedding::unit(vec![1.0, 0.0]).unwrap())
        }

        fn encode_image(&self, _image: &[u8]) -> Result<Embedding, EncoderError> {
            Ok(Embedding::unit(vec![0.0, 1.0]).unwrap())
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn model_name(&self) -> String {
            "axis".to_string()
        }
    }

    #[test]
    fn test_empty_content_returns_none() {
        assert!(preprocess_text("", "").is_none());
        assert!(preprocess_text("   ", "\n\t").is_none());
    }

    #[test]
    fn test_title_and_description_joined() {
        assert_eq!(
            preprocess_text(" Red Dress ", "silk, knee length"),
            Some("Red Dress - silk, knee length".to_string())
        );
        assert_eq!(preprocess_text("", "only body"), Some("only body".to_string()));
    }

    #[test]
    fn test_long_text_truncated() {
        let long = "ä".repeat(MAX_TEXT_LENGTH + 20);
        let result = preprocess_text(&long, "").unwrap();
        assert_eq!(result.chars().count(), MAX_TEXT_LENGTH);
        assert!(result.ends_with(TRUNCATION_SUFFIX));
    }

    #[test]
    fn test_parse_jsonl_reports_line() {
        let data = "{\"id\": \"a\", \"embedding\": [1, 0]}\n\n{broken\n";
        let err = parse_jsonl(data.as_bytes()).unwrap_err();
        assert!(matches!(err, IngestError::Parse { line: 3, .. }));

        let records = parse_jsonl("{\"id\": \"a\", \"embedding\": [1, 0]}\n".as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id.as_str(), "a");
    }

    #[test]
    fn test_prepare_uses_given_embedding() {
        let records = parse_jsonl("{\"id\": \"a\", \"embedding\": [3, 4]}".as_bytes()).unwrap();
        let inputs = prepare(records, None, &FusionEngine::weighted_average(2), 0.7, Path::new(".")).unwrap();
        assert!(inputs[0].embedding.is_unit());
        assert!((inputs[0].embedding.as_slice()[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_prepare_fuses_encoded_modalities() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.png"), b"fake").unwrap();
        let line = r#"{"id": "a", "text": "red dress", "image_path": "a.png"}"#;
        let records = parse_jsonl(line.as_bytes()).unwrap();

        let encoder = AxisEncoder;
        let inputs = prepare(
            records,
            Some(&encoder),
            &FusionEngine::weighted_average(2),
            0.7,
            tmp.path(),
        )
        .unwrap();
        let v = inputs[0].embedding.as_slice();
        // normalize(0.7 * image + 0.3 * text)
        let norm = (0.7f32 * 0.7 + 0.3 * 0.3).sqrt();
        assert!((v[0] - 0.3 / norm).abs() < 1e-5);
        assert!((v[1] - 0.7 / norm).abs() < 1e-5);
    }

    #[test]
    fn test_prepare_without_encoder_fails() {
        let records = parse_jsonl(r#"{"id": "a", "text": "red dress"}"#.as_bytes()).unwrap();
        let err = prepare(records, None, &FusionEngine::weighted_average(2), 0.7, Path::new("."))
            .unwrap_err();
        match err {
            IngestError::Record { id, source } => {
                assert_eq!(id.as_str(), "a");
                assert_eq!(source.kind(), ErrorKind::EncodingFailed);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_prepare_rejects_empty_record() {
        let records = parse_jsonl(r#"{"id": "a"}"#.as_bytes()).unwrap();
        let err = prepare(records, None, &FusionEngine::weighted_average(2), 0.7, Path::new("."))
            .unwrap_err();
        assert!(matches!(err, IngestError::Record { .. }));
    }
}
