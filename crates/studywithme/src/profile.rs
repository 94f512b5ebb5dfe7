//! Learner profile supplied by onboarding, plus the tutor persona.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

pub const MIN_DIFFICULTY: u8 = 1;
pub const MAX_DIFFICULTY: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeGroup {
    Child,
    Teen,
    Adult,
    Senior,
}

impl AgeGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgeGroup::Child => "child",
            AgeGroup::Teen => "teen",
            AgeGroup::Adult => "adult",
            AgeGroup::Senior => "senior",
        }
    }
}

impl FromStr for AgeGroup {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "child" => Ok(AgeGroup::Child),
            "teen" => Ok(AgeGroup::Teen),
            "adult" => Ok(AgeGroup::Adult),
            "senior" => Ok(AgeGroup::Senior),
            other => Err(anyhow::anyhow!("unknown age group: {}", other)),
        }
    }
}

impl fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    Math,
    Language,
    Science,
}

impl Subject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Math => "math",
            Subject::Language => "language",
            Subject::Science => "science",
        }
    }
}

impl FromStr for Subject {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "math" => Ok(Subject::Math),
            "language" => Ok(Subject::Language),
            "science" => Ok(Subject::Science),
            other => Err(anyhow::anyhow!("unknown subject: {}", other)),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Learner configuration. Immutable for the lifetime of a session; the
/// live difficulty is tracked by the session controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub age_group: AgeGroup,
    pub subject: Subject,
    #[validate(range(min = 1, max = 10))]
    pub difficulty_level: u8,
}

impl Profile {
    pub fn new(age_group: AgeGroup, subject: Subject, difficulty_level: u8) -> anyhow::Result<Self> {
        let profile = Self { age_group, subject, difficulty_level };
        profile
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid profile: {}", e))?;
        Ok(profile)
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            age_group: AgeGroup::Adult,
            subject: Subject::Math,
            difficulty_level: MIN_DIFFICULTY,
        }
    }
}

/// Clamp a difficulty reported by any source into the valid range.
pub fn clamp_difficulty(level: i64) -> u8 {
    level.clamp(MIN_DIFFICULTY as i64, MAX_DIFFICULTY as i64) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    #[default]
    Friendly,
    Formal,
    Playful,
}

impl Persona {
    pub fn as_str(&self) -> &'static str {
        match self {
            Persona::Friendly => "friendly",
            Persona::Formal => "formal",
            Persona::Playful => "playful",
        }
    }
}

impl FromStr for Persona {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "friendly" => Ok(Persona::Friendly),
            "formal" => Ok(Persona::Formal),
            "playful" => Ok(Persona::Playful),
            other => Err(anyhow::anyhow!("unknown persona: {}", other)),
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "zh", "ms", "ta"];
