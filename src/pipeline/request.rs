use serde::{Deserialize, Serialize};

use crate::catalog::ProductMetadata;
use crate::embedding::Embedding;
use crate::fusion::DEFAULT_ALPHA;
use crate::scoring::ContextProfile;

/// Hard constraints applied to ANN candidates before scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
}

impl Filters {
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.min_price.is_none() && self.max_price.is_none()
    }

    /// Category compares case-insensitively. A product without a price fails any price
    /// bound.
    pub fn matches(&self, metadata: &ProductMetadata) -> bool {
        if let Some(category) = &self.category {
            match &metadata.category {
                Some(actual) if actual.trim().eq_ignore_ascii_case(category.trim()) => {}
                _ => return false,
            }
        }
        if self.min_price.is_none() && self.max_price.is_none() {
            return true;
        }
        let Some(price) = metadata.price else {
            return false;
        };
        self.min_price.map_or(true, |min| price >= min) && self.max_price.map_or(true, |max| price <= max)
    }
}

/// One search request over already-encoded embeddings.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub text: Option<Embedding>,
    pub image: Option<Embedding>,
    /// Image weight in [0,1].
    pub alpha: f32,
    pub k: usize,
    pub context: ContextProfile,
    /// MMR trade-off λ; the reranker default applies when unset.
    pub diversity: Option<f32>,
    pub filters: Filters,
}

impl QueryContext {
    pub fn new(k: usize) -> Self {
        Self {
            text: None,
            image: None,
            alpha: DEFAULT_ALPHA,
            k,
            context: ContextProfile::default(),
            diversity: None,
            filters: Filters::default(),
        }
    }

    pub fn with_text(mut self, text: Embedding) -> Self {
        self.text = Some(text);
        self
    }

    pub fn with_image(mut self, image: Embedding) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_context(mut self, context: ContextProfile) -> Self {
        self.context = context;
        self
    }

    pub fn with_diversity(mut self, lambda: f32) -> Self {
        self.diversity = Some(lambda);
        self
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }
}

/// A search request carrying raw text and/or image bytes to be encoded first.
#[derive(Debug, Clone)]
pub struct RawQuery {
    pub text: Option<String>,
    pub image: Option<Vec<u8>>,
    /// Everything but the embeddings, which encoding fills in.
    pub query: QueryContext,
}

impl RawQuery {
    pub fn new(query: QueryContext) -> Self {
        Self {
            text: None,
            image: None,
            query,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_image(mut self, image: Vec<u8>) -> Self {
        self.image = Some(image);
        self
    }
}
