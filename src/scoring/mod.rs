//! Context-aware scoring of candidates against a shopper's occasion, mood, season and
//! time of day.

mod context;
mod parse;
pub mod tables;

pub use context::{ContextScorer, ContextScores, ContextWeights};

use serde::{Deserialize, Serialize};

use crate::catalog::tags::{Mood, Occasion, Season, TimeOfDay};

/// The context half of a query. Every dimension is optional; an absent dimension
/// contributes nothing to the score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occasion: Option<Occasion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<Season>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<TimeOfDay>,
}

impl ContextProfile {
    pub fn is_empty(&self) -> bool {
        self.occasion.is_none()
            && self.mood.is_none()
            && self.season.is_none()
            && self.time_of_day.is_none()
    }

    /// Fill dimensions missing here from `other`.
    pub fn or(self, other: ContextProfile) -> ContextProfile {
        ContextProfile {
            occasion: self.occasion.or(other.occasion),
            mood: self.mood.or(other.mood),
            season: self.season.or(other.season),
            time_of_day: self.time_of_day.or(other.time_of_day),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_or_prefers_explicit_values() {
        let explicit = ContextProfile {
            mood: Some(Mood::Relaxed),
            ..Default::default()
        };
        let parsed = ContextProfile {
            mood: Some(Mood::Elegant),
            occasion: Some(Occasion::Wedding),
            ..Default::default()
        };
        let merged = explicit.or(parsed);
        assert_eq!(merged.mood, Some(Mood::Relaxed));
        assert_eq!(merged.occasion, Some(Occasion::Wedding));
        assert!(!merged.is_empty());
        assert!(ContextProfile::default().is_empty());
    }
}
