//! Closed vocabularies for occasion, mood, season and time-of-day tags.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Error returned when a string is not part of a tag vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {vocabulary} tag: {value}")]
pub struct UnknownTag {
    pub vocabulary: &'static str,
    pub value: String,
}

macro_rules! tag_enum {
    ($(#[$meta:meta])* $name:ident, $vocabulary:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownTag;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let normalized = s.trim().to_lowercase();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|tag| tag.as_str() == normalized)
                    .ok_or_else(|| UnknownTag {
                        vocabulary: $vocabulary,
                        value: s.to_string(),
                    })
            }
        }
    };
}

tag_enum!(
    /// Occasion a product suits, or a query targets.
    Occasion, "occasion", {
        Wedding => "wedding",
        Party => "party",
        Business => "business",
        Casual => "casual",
        Formal => "formal",
        Sport => "sport",
        Beach => "beach",
        Date => "date",
        Travel => "travel",
        Interview => "interview",
        Festival => "festival",
        Outdoor => "outdoor",
        Evening => "evening",
        Daytime => "daytime",
    }
);

tag_enum!(
    /// Mood a product conveys, or a query asks for.
    Mood, "mood", {
        Confident => "confident",
        Relaxed => "relaxed",
        Elegant => "elegant",
        Playful => "playful",
        Professional => "professional",
        Adventurous => "adventurous",
        Romantic => "romantic",
        Energetic => "energetic",
        Sophisticated => "sophisticated",
        Comfortable => "comfortable",
    }
);

tag_enum!(
    Season, "season", {
        Spring => "spring",
        Summer => "summer",
        Fall => "fall",
        Winter => "winter",
    }
);

tag_enum!(
    TimeOfDay, "time of day", {
        Morning => "morning",
        Afternoon => "afternoon",
        Evening => "evening",
        Night => "night",
    }
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("Elegant".parse::<Mood>(), Ok(Mood::Elegant));
        assert_eq!(" WEDDING ".parse::<Occasion>(), Ok(Occasion::Wedding));
    }

    #[test]
    fn test_unknown_tag() {
        let err = "gloomy".parse::<Mood>().unwrap_err();
        assert_eq!(err.vocabulary, "mood");
        assert_eq!(err.value, "gloomy");
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&TimeOfDay::Afternoon).unwrap();
        assert_eq!(json, "\"afternoon\"");
        let season: Season = serde_json::from_str("\"fall\"").unwrap();
        assert_eq!(season, Season::Fall);
    }

    #[test]
    fn test_display_matches_as_str() {
        for occasion in Occasion::ALL {
            assert_eq!(occasion.to_string(), occasion.as_str());
        }
    }
}
