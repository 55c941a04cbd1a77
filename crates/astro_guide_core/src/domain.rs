//! crates/astro_guide_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any transport or storage format, with
//! one deliberate exception: `Profile` derives serde so the persistence
//! adapter can store it as civil calendar components (never as an absolute
//! instant, which would drift under re-encoding in a different timezone).

use crate::civil::{CivilDate, CivilTime};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The user's self-described gender, as shown on the profile screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    NonBinary,
    #[default]
    PreferNotToSay,
}

impl Gender {
    pub fn label(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::NonBinary => "Non-binary",
            Gender::PreferNotToSay => "Prefer not to say",
        }
    }
}

/// The guidance focus the user selects on the second screen.
///
/// The set is fixed but open: adding an area means adding a variant and its
/// hint. The hint string feeds prompt construction only and is never shown
/// to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusArea {
    Career,
    Relationships,
    Wealth,
    Health,
    Travel,
    Education,
    Purpose,
}

impl FocusArea {
    pub const ALL: [FocusArea; 7] = [
        FocusArea::Career,
        FocusArea::Relationships,
        FocusArea::Wealth,
        FocusArea::Health,
        FocusArea::Travel,
        FocusArea::Education,
        FocusArea::Purpose,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FocusArea::Career => "Career",
            FocusArea::Relationships => "Relationships",
            FocusArea::Wealth => "Wealth",
            FocusArea::Health => "Health",
            FocusArea::Travel => "Travel",
            FocusArea::Education => "Education",
            FocusArea::Purpose => "Purpose",
        }
    }

    /// A stable per-area steering line used only for prompt construction.
    pub fn hint(&self) -> &'static str {
        match self {
            FocusArea::Career => {
                "Focus on career path, leadership, timing of opportunities, and work relationships."
            }
            FocusArea::Relationships => {
                "Focus on relationships, communication patterns, compatibility, and emotional well-being."
            }
            FocusArea::Wealth => {
                "Focus on finances, risk, long-term planning, and money habits."
            }
            FocusArea::Health => {
                "Focus on wellness routines, stress patterns, and sustainable health habits."
            }
            FocusArea::Travel => {
                "Focus on journeys, relocation, timing of travel, and adapting to new places."
            }
            FocusArea::Education => {
                "Focus on learning, study habits, examinations, and intellectual growth."
            }
            FocusArea::Purpose => {
                "Focus on life direction, meaning, long-term vocation, and inner alignment."
            }
        }
    }
}

/// The zodiac reference frame the ephemeris service calculates against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ZodiacSystem {
    Tropical,
    #[default]
    SiderealLahiri,
}

impl ZodiacSystem {
    /// The wire string the ephemeris tool expects.
    pub fn as_str(&self) -> &'static str {
        match self {
            ZodiacSystem::Tropical => "tropical",
            ZodiacSystem::SiderealLahiri => "sidereal_lahiri",
        }
    }
}

impl std::str::FromStr for ZodiacSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tropical" => Ok(ZodiacSystem::Tropical),
            "sidereal_lahiri" => Ok(ZodiacSystem::SiderealLahiri),
            other => Err(format!("unknown zodiac system '{other}'")),
        }
    }
}

/// A single candidate returned by the geocoding collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceCandidate {
    pub name: String,
    pub country: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone_id: String,
}

impl PlaceCandidate {
    /// The display form written back into the profile after validation,
    /// e.g. "Lisbon, Portugal".
    pub fn canonical_name(&self) -> String {
        match &self.country {
            Some(country) if !country.is_empty() => format!("{}, {}", self.name, country),
            _ => self.name.clone(),
        }
    }
}

/// A validated birth location. Present on a profile only if it was produced
/// by the most recent successful validation of the current place text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BirthLocation {
    pub canonical_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone_id: String,
}

/// The Moon position as computed by the deterministic ephemeris client.
#[derive(Debug, Clone, PartialEq)]
pub struct MoonInfo {
    /// Absolute ecliptic longitude in degrees, [0, 360).
    pub longitude: f64,
    /// e.g. "Aquarius".
    pub sign: String,
    /// Degrees into the sign, [0, 30).
    pub degree_in_sign: f64,
}

/// The three model-derived signs. Not authoritative; the deterministic
/// Moon sign from the ephemeris client is reported separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSigns {
    pub solar_sign: String,
    pub vedic_moon_sign: String,
    pub chinese_sign: String,
}

/// The user's natal data, entered on the profile screen.
///
/// Date and time of birth are stored as civil components. They are combined
/// into an absolute instant only at the moment a lookup needs one, using
/// the validated location's timezone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub name: String,
    pub gender: Gender,
    pub date_of_birth: CivilDate,
    pub time_of_birth: CivilTime,
    pub place_of_birth: String,
    pub birth_location: Option<BirthLocation>,
    pub focus_area: Option<FocusArea>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            name: String::new(),
            gender: Gender::default(),
            date_of_birth: CivilDate::new(1990, 1, 1),
            time_of_birth: CivilTime::new(12, 0, 0),
            place_of_birth: String::new(),
            birth_location: None,
            focus_area: None,
        }
    }
}

impl Profile {
    /// The single predicate gating navigation past the profile screen.
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty() && !self.place_of_birth.trim().is_empty()
    }

    /// A stable profile summary block used for prompt building.
    pub fn summary(&self) -> String {
        let name = if self.name.trim().is_empty() {
            "Unknown"
        } else {
            self.name.trim()
        };
        let place = if self.place_of_birth.trim().is_empty() {
            "Unknown"
        } else {
            self.place_of_birth.trim()
        };
        let focus = self.focus_area.map(|a| a.label()).unwrap_or("Not selected");

        format!(
            "Name: {}\nGender: {}\nDate of Birth: {}\nTime of Birth: {}\nPlace of Birth: {}\nFocus Area: {}",
            name,
            self.gender.label(),
            self.date_of_birth.display_medium(),
            self.time_of_birth.display_short(),
            place,
            focus,
        )
    }
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One entry in the linear chat transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}
