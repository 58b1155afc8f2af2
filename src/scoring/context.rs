use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::tables::{
    mood_compatibility, mood_sentiment_weights, occasion_compatibility, season_compatibility,
    time_compatibility,
};
use super::ContextProfile;
use crate::catalog::tags::Mood;
use crate::catalog::{ProductMetadata, SentimentAttributes};

const WEIGHT_SUM_TOLERANCE: f32 = 1e-3;

/// Weight of each context dimension in the occasion score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextWeights {
    #[serde(default = "default_occasion_weight")]
    pub occasion: f32,
    #[serde(default = "default_mood_weight")]
    pub mood: f32,
    #[serde(default = "default_season_weight")]
    pub season: f32,
    #[serde(default = "default_time_weight")]
    pub time_of_day: f32,
}

fn default_occasion_weight() -> f32 {
    0.35
}

fn default_mood_weight() -> f32 {
    0.30
}

fn default_season_weight() -> f32 {
    0.20
}

fn default_time_weight() -> f32 {
    0.15
}

impl Default for ContextWeights {
    fn default() -> Self {
        Self {
            occasion: default_occasion_weight(),
            mood: default_mood_weight(),
            season: default_season_weight(),
            time_of_day: default_time_weight(),
        }
    }
}

impl ContextWeights {
    pub fn validate(&self) -> Result<(), String> {
        let weights = [self.occasion, self.mood, self.season, self.time_of_day];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(format!("context weights must be non-negative, got {weights:?}"));
        }
        let sum: f32 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(format!("context weights must sum to 1, got {sum}"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContextScores {
    pub sentiment: f32,
    pub occasion: f32,
    /// `dimension:tag` for exact matches, `dimension~tag` for a related product tag.
    pub matched: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ContextScorer {
    weights: ContextWeights,
}

impl ContextScorer {
    pub fn new(weights: ContextWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ContextWeights {
        &self.weights
    }

    /// Score one product against the query context. Never fails: a missing context
    /// dimension or product attribute scores 0 for that term, and the remaining weights
    /// are not renormalized.
    pub fn score(&self, metadata: &ProductMetadata, context: &ContextProfile) -> ContextScores {
        let mut matched = Vec::new();
        let mut occasion = 0.0;

        if let Some(target) = context.occasion {
            occasion += self.weights.occasion
                * match_tags("occasion", &metadata.occasions, target, occasion_compatibility, &mut matched);
        }
        if let Some(target) = context.mood {
            occasion += self.weights.mood
                * match_tags("mood", &metadata.moods, target, mood_compatibility, &mut matched);
        }
        if let Some(target) = context.season {
            occasion += self.weights.season
                * match_tags("season", &metadata.seasons, target, season_compatibility, &mut matched);
        }
        if let Some(target) = context.time_of_day {
            occasion += self.weights.time_of_day
                * match_tags("time", &metadata.times_of_day, target, time_compatibility, &mut matched);
        }

        ContextScores {
            sentiment: context
                .mood
                .map(|mood| sentiment_score(&metadata.sentiment, mood))
                .unwrap_or(0.0),
            occasion: occasion.clamp(0.0, 1.0),
            matched,
        }
    }
}

/// Weight-normalized dot product of a product's sentiment attributes with the
/// attribute weights a mood expects, clamped to [0,1].
pub fn sentiment_score(sentiment: &SentimentAttributes, mood: Mood) -> f32 {
    let weights = mood_sentiment_weights(mood);
    let attributes = sentiment.as_array();
    let total: f32 = weights.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let dot: f32 = weights.iter().zip(attributes.iter()).map(|(w, s)| w * s).sum();
    (dot / total).clamp(0.0, 1.0)
}

fn match_tags<T>(
    dimension: &str,
    tags: &BTreeSet<T>,
    target: T,
    compatibility: fn(T, T) -> f32,
    matched: &mut Vec<String>,
) -> f32
where
    T: Copy + Ord + std::fmt::Display,
{
    if tags.contains(&target) {
        matched.push(format!("{dimension}:{target}"));
        return 1.0;
    }

    let best = tags
        .iter()
        .map(|tag| (*tag, compatibility(target, *tag)))
        .filter(|(_, value)| *value > 0.0)
        .fold(None, |best: Option<(T, f32)>, candidate| match best {
            Some((_, value)) if value >= candidate.1 => best,
            _ => Some(candidate),
        });

    match best {
        Some((tag, value)) => {
            matched.push(format!("{dimension}~{tag}"));
            value
        }
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tags::{Occasion, Season, TimeOfDay};

    fn elegant_metadata() -> ProductMetadata {
        ProductMetadata {
            sentiment: SentimentAttributes::new(0.9, 0.1, 0.2, 0.6),
            occasions: [Occasion::Wedding].into_iter().collect(),
            moods: [Mood::Sophisticated].into_iter().collect(),
            seasons: [Season::Spring].into_iter().collect(),
            times_of_day: [TimeOfDay::Evening].into_iter().collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_weights_are_valid() {
        assert!(ContextWeights::default().validate().is_ok());
        let bad = ContextWeights {
            occasion: 0.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let negative = ContextWeights {
            occasion: -0.35,
            mood: 1.0,
            season: 0.2,
            time_of_day: 0.15,
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_empty_context_scores_zero() {
        let scores = ContextScorer::default().score(&elegant_metadata(), &ContextProfile::default());
        assert_eq!(scores.sentiment, 0.0);
        assert_eq!(scores.occasion, 0.0);
        assert!(scores.matched.is_empty());
    }

    #[test]
    fn test_exact_and_partial_matches() {
        let context = ContextProfile {
            occasion: Some(Occasion::Formal),
            mood: Some(Mood::Elegant),
            season: Some(Season::Spring),
            time_of_day: Some(TimeOfDay::Night),
        };
        let scores = ContextScorer::default().score(&elegant_metadata(), &context);

        // formal~wedding 0.6, elegant~sophisticated 0.7, spring exact, night~evening 0.6
        let expected = 0.35 * 0.6 + 0.30 * 0.7 + 0.20 * 1.0 + 0.15 * 0.6;
        assert!((scores.occasion - expected).abs() < 1e-6);
        assert_eq!(
            scores.matched,
            vec!["occasion~wedding", "mood~sophisticated", "season:spring", "time~evening"]
        );
    }

    #[test]
    fn test_missing_dimensions_are_not_renormalized() {
        let context = ContextProfile {
            occasion: Some(Occasion::Wedding),
            ..Default::default()
        };
        let scores = ContextScorer::default().score(&elegant_metadata(), &context);
        assert!((scores.occasion - 0.35).abs() < 1e-6);
        assert_eq!(scores.sentiment, 0.0);
    }

    #[test]
    fn test_sentiment_prefers_matching_mood() {
        let elegant = SentimentAttributes::new(0.9, 0.1, 0.2, 0.6);
        let casual = SentimentAttributes::new(0.1, 0.9, 0.2, 0.2);
        assert!(sentiment_score(&elegant, Mood::Elegant) > sentiment_score(&casual, Mood::Elegant));
        assert!(sentiment_score(&casual, Mood::Relaxed) > sentiment_score(&elegant, Mood::Relaxed));
    }

    #[test]
    fn test_sentiment_is_bounded() {
        let wild = SentimentAttributes::new(f32::NAN, 5.0, -3.0, f32::INFINITY);
        for &mood in Mood::ALL {
            let score = sentiment_score(&wild, mood);
            assert!((0.0..=1.0).contains(&score), "{mood}: {score}");
        }
    }

    #[test]
    fn test_missing_metadata_scores_zero() {
        let context = ContextProfile {
            occasion: Some(Occasion::Beach),
            mood: Some(Mood::Playful),
            ..Default::default()
        };
        let scores = ContextScorer::default().score(&ProductMetadata::default(), &context);
        assert_eq!(scores.occasion, 0.0);
        assert_eq!(scores.sentiment, 0.0);
    }
}
