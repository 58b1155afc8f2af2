//! CLIP encoder over fastembed.
//!
//! Text and image towers share one 512-d embedding space, so a text query can be
//! compared directly with catalog image embeddings.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use fastembed::{
    EmbeddingModel, ImageEmbedding, ImageEmbeddingModel, ImageInitOptions, InitOptions,
    TextEmbedding,
};

use super::{finish, Encoder, EncoderError};
use crate::embedding::Embedding;

/// Output size of CLIP ViT-B/32.
pub const CLIP_DIMENSIONS: usize = 512;

/// Default CLIP model name.
pub const DEFAULT_CLIP_MODEL: &str = "clip-vit-b-32";

/// Wrapper around fastembed's CLIP text and image models.
/// Uses Mutexes because fastembed's embed() requires &mut self.
pub struct ClipEncoder {
    text: Mutex<TextEmbedding>,
    image: Mutex<ImageEmbedding>,
    model_name: String,
}

impl ClipEncoder {
    /// Load (downloading on first use) the CLIP text and image models.
    ///
    /// Model files are cached in `models_dir`.
    pub fn new(model_name: &str, models_dir: PathBuf, show_progress: bool) -> Result<Self, EncoderError> {
        let (text_model, image_model) = Self::parse_model_name(model_name)?;

        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EncoderError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        let text = TextEmbedding::try_new(
            InitOptions::new(text_model)
                .with_cache_dir(models_dir.clone())
                .with_show_download_progress(show_progress),
        )
        .map_err(|e| EncoderError::InitFailed(e.to_string()))?;

        let image = ImageEmbedding::try_new(
            ImageInitOptions::new(image_model)
                .with_cache_dir(models_dir)
                .with_show_download_progress(show_progress),
        )
        .map_err(|e| EncoderError::InitFailed(e.to_string()))?;

        log::info!("encoder: loaded {model_name} text and image models");

        Ok(Self {
            text: Mutex::new(text),
            image: Mutex::new(image),
            model_name: model_name.to_string(),
        })
    }

    fn parse_model_name(name: &str) -> Result<(EmbeddingModel, ImageEmbeddingModel), EncoderError> {
        match name.to_lowercase().as_str() {
            "clip-vit-b-32" | "clipvitb32" => {
                Ok((EmbeddingModel::ClipVitB32, ImageEmbeddingModel::ClipVitB32))
            }
            _ => Err(EncoderError::InitFailed(format!(
                "Unknown model: {}. Supported models: clip-vit-b-32",
                name
            ))),
        }
    }
}

impl Encoder for ClipEncoder {
    fn encode_text(&self, text: &str) -> Result<Embedding, EncoderError> {
        if text.trim().is_empty() {
            return Err(EncoderError::InvalidInput("text is empty".to_string()));
        }
        let mut model = self.text.lock().map_err(|e| {
            EncoderError::EncodingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EncoderError::EncodingFailed(e.to_string()))?;

        let raw = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EncoderError::EncodingFailed("No embedding returned".to_string()))?;
        finish(raw, CLIP_DIMENSIONS)
    }

    fn encode_image(&self, image: &[u8]) -> Result<Embedding, EncoderError> {
        let kind = infer::get(image)
            .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
            .ok_or_else(|| EncoderError::InvalidInput("bytes are not a known image format".to_string()))?;

        // fastembed reads images from disk; stage the bytes with the right extension.
        let mut staged = tempfile::Builder::new()
            .prefix("shopsense-query-")
            .suffix(&format!(".{}", kind.extension()))
            .tempfile()
            .map_err(|e| EncoderError::EncodingFailed(format!("Failed to stage image: {}", e)))?;
        staged
            .write_all(image)
            .and_then(|_| staged.flush())
            .map_err(|e| EncoderError::EncodingFailed(format!("Failed to stage image: {}", e)))?;

        let mut model = self.image.lock().map_err(|e| {
            EncoderError::EncodingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let embeddings = model
            .embed(vec![staged.path()], None)
            .map_err(|e| EncoderError::EncodingFailed(e.to_string()))?;

        let raw = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EncoderError::EncodingFailed("No embedding returned".to_string()))?;
        finish(raw, CLIP_DIMENSIONS)
    }

    fn dimensions(&self) -> usize {
        CLIP_DIMENSIONS
    }

    fn model_name(&self) -> String {
        self.model_name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn test_invalid_model_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = ClipEncoder::new("nonexistent-model", temp_dir.path().to_path_buf(), false);
        assert!(matches!(result, Err(EncoderError::InitFailed(_))));
    }

    // Integration tests require model download - run with --ignored
    #[test]
    #[ignore = "requires model download"]
    fn test_text_embedding_is_unit() {
        let temp_dir = std::env::temp_dir().join("shopsense-clip-test");
        let encoder = ClipEncoder::new(DEFAULT_CLIP_MODEL, temp_dir, false).unwrap();

        let dress = encoder.encode_text("elegant red evening dress").unwrap();
        let gown = encoder.encode_text("formal red gown").unwrap();
        let boots = encoder.encode_text("muddy hiking boots").unwrap();

        assert_eq!(dress.dimensions(), CLIP_DIMENSIONS);
        assert!(dress.is_unit());
        assert!(
            cosine_similarity(dress.as_slice(), gown.as_slice())
                > cosine_similarity(dress.as_slice(), boots.as_slice())
        );
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_rejects_non_image_bytes() {
        let temp_dir = std::env::temp_dir().join("shopsense-clip-test");
        let encoder = ClipEncoder::new(DEFAULT_CLIP_MODEL, temp_dir, false).unwrap();
        let result = encoder.encode_image(b"definitely not a png");
        assert!(matches!(result, Err(EncoderError::InvalidInput(_))));
    }
}
