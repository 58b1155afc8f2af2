//! Keyword detection of a context profile from free query text.

use super::ContextProfile;
use crate::catalog::tags::{Mood, Occasion, Season, TimeOfDay};

// Earlier entries win when a query mentions several tags of one dimension.
const OCCASION_KEYWORDS: &[(Occasion, &[&str])] = &[
    (Occasion::Wedding, &["wedding", "bride", "bridal", "groom", "ceremony"]),
    (Occasion::Interview, &["interview"]),
    (Occasion::Business, &["business", "office", "work", "corporate", "meeting"]),
    (Occasion::Formal, &["formal", "gala", "black tie"]),
    (Occasion::Party, &["party", "celebration", "festive", "dance", "night out"]),
    (Occasion::Date, &["date", "romantic dinner"]),
    (Occasion::Festival, &["festival", "concert"]),
    (Occasion::Beach, &["beach", "swim", "resort", "tropical"]),
    (Occasion::Sport, &["sport", "athletic", "gym", "workout", "running", "fitness"]),
    (Occasion::Travel, &["travel", "trip", "airport"]),
    (Occasion::Outdoor, &["outdoor", "hiking", "camping"]),
    (Occasion::Casual, &["casual", "everyday", "weekend"]),
    (Occasion::Daytime, &["daytime", "brunch"]),
];

const MOOD_KEYWORDS: &[(Mood, &[&str])] = &[
    (Mood::Elegant, &["elegant", "elegance", "graceful", "chic"]),
    (Mood::Sophisticated, &["sophisticated", "refined", "classy"]),
    (Mood::Professional, &["professional", "polished", "tailored"]),
    (Mood::Romantic, &["romantic", "feminine", "delicate"]),
    (Mood::Confident, &["confident", "bold", "statement", "powerful"]),
    (Mood::Playful, &["playful", "fun", "quirky"]),
    (Mood::Energetic, &["energetic", "active", "sporty"]),
    (Mood::Adventurous, &["adventurous", "adventure", "rugged"]),
    (Mood::Comfortable, &["comfortable", "comfy", "cozy"]),
    (Mood::Relaxed, &["relaxed", "laid back", "chill"]),
];

const SEASON_KEYWORDS: &[(Season, &[&str])] = &[
    (Season::Spring, &["spring", "blossom"]),
    (Season::Summer, &["summer", "sunny", "vacation"]),
    (Season::Fall, &["fall", "autumn", "harvest"]),
    (Season::Winter, &["winter", "cold", "snow", "holiday"]),
];

const TIME_KEYWORDS: &[(TimeOfDay, &[&str])] = &[
    (TimeOfDay::Night, &["night", "midnight"]),
    (TimeOfDay::Evening, &["evening", "dinner", "sunset"]),
    (TimeOfDay::Morning, &["morning", "breakfast"]),
    (TimeOfDay::Afternoon, &["afternoon", "lunch"]),
];

impl ContextProfile {
    /// Detect occasion, mood, season and time of day from keywords in `text`.
    ///
    /// Matching is on whole words, case-insensitive, so "formality" does not count as
    /// "formal".
    pub fn from_query_text(text: &str) -> ContextProfile {
        let normalized = normalize(text);
        ContextProfile {
            occasion: detect(&normalized, OCCASION_KEYWORDS),
            mood: detect(&normalized, MOOD_KEYWORDS),
            season: detect(&normalized, SEASON_KEYWORDS),
            time_of_day: detect(&normalized, TIME_KEYWORDS),
        }
    }
}

/// Lowercased words separated by single spaces, padded with a space on both ends.
fn normalize(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect();
    format!(" {} ", words.join(" "))
}

fn detect<T: Copy>(normalized: &str, table: &[(T, &[&str])]) -> Option<T> {
    table
        .iter()
        .find(|(_, keywords)| {
            keywords
                .iter()
                .any(|keyword| normalized.contains(&format!(" {keyword} ")))
        })
        .map(|(tag, _)| *tag)
}
