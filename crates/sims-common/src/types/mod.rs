//! Common types used across SIMS

use serde::{Deserialize, Serialize};

/// Student gender as stored in the registry.
///
/// Input files carry free-text gender values; [`Gender::from_text`]
/// accepts the single-letter and full spellings case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    /// Normalize a free-text gender value.
    ///
    /// Accepts `m`/`male` and `f`/`female` in any casing; anything else
    /// yields `None`.
    pub fn from_text(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "m" | "male" => Some(Gender::Male),
            "f" | "female" => Some(Gender::Female),
            _ => None,
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Length of a programme of study.
///
/// Derived from the free-text "programme duration" column by substring
/// match on the digits: "5" -> five-year, "4" -> four-year, "3" ->
/// three-year. Blank or unmatched input defaults to five-year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StudyMode {
    #[default]
    FiveYear,
    FourYear,
    ThreeYear,
}

impl StudyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudyMode::FiveYear => "five_year",
            StudyMode::FourYear => "four_year",
            StudyMode::ThreeYear => "three_year",
        }
    }

    /// Map a free-text programme-duration value to a study mode.
    pub fn from_duration_text(raw: &str) -> Self {
        if raw.contains('5') {
            StudyMode::FiveYear
        } else if raw.contains('4') {
            StudyMode::FourYear
        } else if raw.contains('3') {
            StudyMode::ThreeYear
        } else {
            StudyMode::FiveYear
        }
    }
}

impl std::fmt::Display for StudyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gender_from_text() {
        assert_eq!(Gender::from_text("M"), Some(Gender::Male));
        assert_eq!(Gender::from_text("male"), Some(Gender::Male));
        assert_eq!(Gender::from_text(" F "), Some(Gender::Female));
        assert_eq!(Gender::from_text("FEMALE"), Some(Gender::Female));
        assert_eq!(Gender::from_text("unknown"), None);
        assert_eq!(Gender::from_text(""), None);
    }

    #[test]
    fn test_study_mode_from_duration_text() {
        assert_eq!(StudyMode::from_duration_text("5 years"), StudyMode::FiveYear);
        assert_eq!(StudyMode::from_duration_text("4"), StudyMode::FourYear);
        assert_eq!(StudyMode::from_duration_text("3-year programme"), StudyMode::ThreeYear);
        assert_eq!(StudyMode::from_duration_text(""), StudyMode::FiveYear);
        assert_eq!(StudyMode::from_duration_text("unknown"), StudyMode::FiveYear);
    }

    #[test]
    fn test_study_mode_precedence_prefers_longer_programme() {
        // "4/5" style values resolve to the five-year mode first
        assert_eq!(StudyMode::from_duration_text("4 or 5"), StudyMode::FiveYear);
    }
}
