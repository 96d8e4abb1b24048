use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Anxious,
    Stressed,
    #[default]
    Neutral,
}

impl Emotion {
    pub const ALL: [Emotion; 5] = [
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Anxious,
        Emotion::Stressed,
        Emotion::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Anxious => "anxious",
            Emotion::Stressed => "stressed",
            Emotion::Neutral => "neutral",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "happy" => Some(Emotion::Happy),
            "sad" => Some(Emotion::Sad),
            "anxious" => Some(Emotion::Anxious),
            "stressed" => Some(Emotion::Stressed),
            "neutral" => Some(Emotion::Neutral),
            _ => None,
        }
    }

    /// Interpret a raw classifier label. Models tend to pad the word with
    /// whitespace, capitals or a trailing period; anything still outside the
    /// fixed set is `Neutral`.
    pub fn from_label(raw: &str) -> Self {
        let cleaned = raw
            .trim()
            .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
            .to_lowercase();
        Self::from_str(&cleaned).unwrap_or_default()
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_normalisation() {
        assert_eq!(Emotion::from_label("anxious"), Emotion::Anxious);
        assert_eq!(Emotion::from_label("  Sad.\n"), Emotion::Sad);
        assert_eq!(Emotion::from_label("\"STRESSED\""), Emotion::Stressed);
    }

    #[test]
    fn test_unknown_label_is_neutral() {
        assert_eq!(Emotion::from_label("furious"), Emotion::Neutral);
        assert_eq!(Emotion::from_label(""), Emotion::Neutral);
        assert_eq!(Emotion::from_label("happy and sad"), Emotion::Neutral);
    }

    #[test]
    fn test_round_trip_names() {
        for emotion in Emotion::ALL {
            assert_eq!(Emotion::from_str(emotion.as_str()), Some(emotion));
        }
    }
}
