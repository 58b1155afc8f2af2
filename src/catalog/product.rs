use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::convert::Infallible;
use std::str::FromStr;
use std::{fmt::Display, ops::Deref};

use super::tags::{Mood, Occasion, Season, TimeOfDay};
use crate::embedding::Embedding;

/// Stable, caller-assigned product identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
#[serde(transparent)]
pub struct ProductId(String);

impl Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProductId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ProductId(s.to_string()))
    }
}

impl Deref for ProductId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for ProductId {
    fn from(fr: &str) -> Self {
        ProductId(fr.to_string())
    }
}

impl From<String> for ProductId {
    fn from(fr: String) -> Self {
        ProductId(fr)
    }
}

impl From<ProductId> for String {
    fn from(fr: ProductId) -> Self {
        fr.0
    }
}

impl ProductId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Visual sentiment attributes, each expected in [0,1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentAttributes {
    #[serde(default)]
    pub elegance: f32,
    #[serde(default)]
    pub casualness: f32,
    #[serde(default)]
    pub boldness: f32,
    #[serde(default)]
    pub minimalism: f32,
}

impl SentimentAttributes {
    pub fn new(elegance: f32, casualness: f32, boldness: f32, minimalism: f32) -> Self {
        Self {
            elegance,
            casualness,
            boldness,
            minimalism,
        }
    }

    /// Attributes in a fixed order: elegance, casualness, boldness, minimalism.
    /// Non-finite values read as 0.
    pub fn as_array(&self) -> [f32; 4] {
        [self.elegance, self.casualness, self.boldness, self.minimalism]
            .map(|v| if v.is_finite() { v } else { 0.0 })
    }
}

/// Per-product metadata used by context scoring and hard filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default)]
    pub sentiment: SentimentAttributes,
    #[serde(default)]
    pub occasions: BTreeSet<Occasion>,
    #[serde(default)]
    pub moods: BTreeSet<Mood>,
    #[serde(default)]
    pub seasons: BTreeSet<Season>,
    #[serde(default)]
    pub times_of_day: BTreeSet<TimeOfDay>,
}

/// One stored version of a product.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: ProductId,
    pub version: u32,
    pub embedding: Embedding,
    pub metadata: ProductMetadata,
}

/// A product as handed to the catalog writer, before a version is assigned.
#[derive(Debug, Clone)]
pub struct ProductInput {
    pub id: ProductId,
    pub embedding: Embedding,
    pub metadata: ProductMetadata,
}

impl ProductInput {
    pub fn new(id: impl Into<ProductId>, embedding: Embedding, metadata: ProductMetadata) -> Self {
        Self {
            id: id.into(),
            embedding,
            metadata,
        }
    }
}
