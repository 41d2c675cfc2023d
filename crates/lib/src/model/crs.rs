//! CRS calculator inputs.
//!
//! The scoring formulas live outside this crate. [`Scorer`] is the seam through
//! which the store refreshes the cached score.

use serde::{Deserialize, Serialize};

/// Highest level of completed education.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EducationLevel {
    LessThanSecondary,
    Secondary,
    OneYearPostSecondary,
    TwoYearPostSecondary,
    #[default]
    Bachelors,
    TwoOrMoreCredentials,
    Masters,
    Doctoral,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaritalStatus {
    #[default]
    Single,
    Married,
    CommonLaw,
}

/// Canadian Language Benchmark levels for the four abilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageScores {
    pub listening: u8,
    pub reading: u8,
    pub writing: u8,
    pub speaking: u8,
}

impl LanguageScores {
    /// Same level for every ability.
    pub fn uniform(level: u8) -> Self {
        Self {
            listening: level,
            reading: level,
            writing: level,
            speaking: level,
        }
    }

    /// The weakest ability, which most thresholds are judged against.
    pub fn minimum(&self) -> u8 {
        self.listening
            .min(self.reading)
            .min(self.writing)
            .min(self.speaking)
    }
}

impl Default for LanguageScores {
    fn default() -> Self {
        Self::uniform(7)
    }
}

/// Calculator inputs plus the last computed score.
///
/// This subtree is mirrored into the local durable cache on every change so it
/// survives a restart even without a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CrsProfile {
    pub age: u8,
    pub education: EducationLevel,
    pub marital_status: MaritalStatus,
    pub language: LanguageScores,
    pub canadian_experience_years: u8,
    pub foreign_experience_years: u8,
    pub provincial_nomination: bool,
    pub job_offer: bool,
    pub sibling_in_canada: bool,
    pub canadian_education: bool,
    pub french_bonus: bool,
    pub last_score: Option<u32>,
}

impl Default for CrsProfile {
    fn default() -> Self {
        Self {
            age: 29,
            education: EducationLevel::default(),
            marital_status: MaritalStatus::default(),
            language: LanguageScores::default(),
            canadian_experience_years: 0,
            foreign_experience_years: 0,
            provincial_nomination: false,
            job_offer: false,
            sibling_in_canada: false,
            canadian_education: false,
            french_bonus: false,
            last_score: None,
        }
    }
}

/// Pure scoring function `compute(profile) -> score`.
pub trait Scorer {
    fn compute(&self, profile: &CrsProfile) -> u32;
}

impl<F> Scorer for F
where
    F: Fn(&CrsProfile) -> u32,
{
    fn compute(&self, profile: &CrsProfile) -> u32 {
        self(profile)
    }
}
