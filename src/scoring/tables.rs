//! Fixed lookup tables: mood to sentiment weights, and symmetric compatibility between
//! related tags.

use crate::catalog::tags::{Mood, Occasion, Season, TimeOfDay};

/// Expected weight of each sentiment attribute for a mood, in the order
/// elegance, casualness, boldness, minimalism.
pub fn mood_sentiment_weights(mood: Mood) -> [f32; 4] {
    match mood {
        Mood::Confident => [0.3, 0.0, 1.0, 0.2],
        Mood::Relaxed => [0.0, 1.0, 0.0, 0.4],
        Mood::Elegant => [1.0, 0.0, 0.1, 0.5],
        Mood::Playful => [0.0, 0.6, 0.8, 0.0],
        Mood::Professional => [0.6, 0.0, 0.2, 0.8],
        Mood::Adventurous => [0.0, 0.7, 0.6, 0.1],
        Mood::Romantic => [0.7, 0.2, 0.2, 0.2],
        Mood::Energetic => [0.0, 0.5, 0.9, 0.0],
        Mood::Sophisticated => [0.9, 0.0, 0.2, 0.7],
        Mood::Comfortable => [0.0, 1.0, 0.0, 0.3],
    }
}

const OCCASION_PAIRS: &[(Occasion, Occasion, f32)] = &[
    (Occasion::Wedding, Occasion::Formal, 0.6),
    (Occasion::Wedding, Occasion::Party, 0.4),
    (Occasion::Wedding, Occasion::Evening, 0.4),
    (Occasion::Formal, Occasion::Business, 0.5),
    (Occasion::Formal, Occasion::Interview, 0.6),
    (Occasion::Formal, Occasion::Evening, 0.5),
    (Occasion::Business, Occasion::Interview, 0.8),
    (Occasion::Party, Occasion::Festival, 0.5),
    (Occasion::Party, Occasion::Evening, 0.5),
    (Occasion::Party, Occasion::Date, 0.4),
    (Occasion::Date, Occasion::Evening, 0.6),
    (Occasion::Casual, Occasion::Daytime, 0.4),
    (Occasion::Casual, Occasion::Travel, 0.5),
    (Occasion::Casual, Occasion::Beach, 0.4),
    (Occasion::Sport, Occasion::Outdoor, 0.6),
    (Occasion::Beach, Occasion::Travel, 0.4),
    (Occasion::Beach, Occasion::Outdoor, 0.4),
    (Occasion::Festival, Occasion::Outdoor, 0.5),
    (Occasion::Travel, Occasion::Outdoor, 0.4),
];

const MOOD_PAIRS: &[(Mood, Mood, f32)] = &[
    (Mood::Elegant, Mood::Sophisticated, 0.7),
    (Mood::Elegant, Mood::Romantic, 0.4),
    (Mood::Elegant, Mood::Professional, 0.3),
    (Mood::Professional, Mood::Confident, 0.4),
    (Mood::Professional, Mood::Sophisticated, 0.5),
    (Mood::Confident, Mood::Sophisticated, 0.3),
    (Mood::Relaxed, Mood::Comfortable, 0.8),
    (Mood::Relaxed, Mood::Playful, 0.3),
    (Mood::Playful, Mood::Energetic, 0.6),
    (Mood::Playful, Mood::Romantic, 0.2),
    (Mood::Adventurous, Mood::Energetic, 0.6),
];

const SEASON_PAIRS: &[(Season, Season, f32)] = &[
    (Season::Spring, Season::Summer, 0.4),
    (Season::Spring, Season::Fall, 0.3),
    (Season::Fall, Season::Winter, 0.4),
    (Season::Summer, Season::Fall, 0.2),
];

const TIME_PAIRS: &[(TimeOfDay, TimeOfDay, f32)] = &[
    (TimeOfDay::Evening, TimeOfDay::Night, 0.6),
    (TimeOfDay::Morning, TimeOfDay::Afternoon, 0.5),
    (TimeOfDay::Afternoon, TimeOfDay::Evening, 0.3),
];

fn lookup<T: PartialEq + Copy>(pairs: &[(T, T, f32)], a: T, b: T) -> f32 {
    if a == b {
        return 1.0;
    }
    pairs
        .iter()
        .find(|(x, y, _)| (*x == a && *y == b) || (*x == b && *y == a))
        .map(|(_, _, value)| *value)
        .unwrap_or(0.0)
}

pub fn occasion_compatibility(a: Occasion, b: Occasion) -> f32 {
    lookup(OCCASION_PAIRS, a, b)
}

pub fn mood_compatibility(a: Mood, b: Mood) -> f32 {
    lookup(MOOD_PAIRS, a, b)
}

pub fn season_compatibility(a: Season, b: Season) -> f32 {
    lookup(SEASON_PAIRS, a, b)
}

pub fn time_compatibility(a: TimeOfDay, b: TimeOfDay) -> f32 {
    lookup(TIME_PAIRS, a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_symmetric_and_bounded() {
        for &a in Occasion::ALL {
            for &b in Occasion::ALL {
                let value = occasion_compatibility(a, b);
                assert_eq!(value, occasion_compatibility(b, a));
                assert!((0.0..=1.0).contains(&value));
                if a != b {
                    assert!(value < 1.0);
                }
            }
        }
        for &a in Mood::ALL {
            for &b in Mood::ALL {
                assert_eq!(mood_compatibility(a, b), mood_compatibility(b, a));
            }
        }
    }

    #[test]
    fn test_known_partial_values() {
        assert_eq!(occasion_compatibility(Occasion::Formal, Occasion::Wedding), 0.6);
        assert_eq!(mood_compatibility(Mood::Sophisticated, Mood::Elegant), 0.7);
        assert_eq!(season_compatibility(Season::Summer, Season::Spring), 0.4);
        assert_eq!(time_compatibility(TimeOfDay::Night, TimeOfDay::Evening), 0.6);
        assert_eq!(occasion_compatibility(Occasion::Sport, Occasion::Wedding), 0.0);
    }

    #[test]
    fn test_every_mood_has_weight() {
        for &mood in Mood::ALL {
            assert!(mood_sentiment_weights(mood).iter().sum::<f32>() > 0.0);
        }
    }
}
