//! services/api/src/web/state.rs
//!
//! Defines the application's shared state, the owned profile state, and the
//! per-connection chat session state.

use crate::config::Config;
use crate::web::focus_task::FocusSummaryOrchestrator;
use astro_guide_core::civil::{self, CivilDate, CivilTime};
use astro_guide_core::domain::{
    AiSigns, BirthLocation, ChatMessage, FocusArea, Gender, MoonInfo, PlaceCandidate, Profile,
};
use astro_guide_core::ports::{
    EphemerisService, GeocodingService, GuidanceService, PortError, PortResult, ProfileStore,
    SignLookupService,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub geocoder: Arc<dyn GeocodingService>,
    pub ephemeris: Arc<dyn EphemerisService>,
    pub sign_lookup: Arc<dyn SignLookupService>,
    pub guidance: Arc<dyn GuidanceService>,
    pub store: Arc<dyn ProfileStore>,
    pub profile: Arc<tokio::sync::Mutex<ProfileState>>,
    pub focus: Arc<FocusSummaryOrchestrator>,
}

//=========================================================================================
// ProfileState (The Single Owned Profile)
//=========================================================================================

/// The owned profile state. All mutation goes through the setters here so
/// the invalidation rule cannot be bypassed: any edit to name, date, time,
/// or place atomically clears the validated location, every derived sign,
/// and their error fields, and advances the generation counter.
///
/// The generation counter tags in-flight lookups with the profile snapshot
/// they were issued against; results whose generation is stale on landing
/// are discarded instead of overwriting newer state.
pub struct ProfileState {
    profile: Profile,
    moon_info: Option<MoonInfo>,
    ai_signs: Option<AiSigns>,
    place_error: Option<String>,
    moon_error: Option<String>,
    signs_error: Option<String>,
    generation: u64,
}

impl ProfileState {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            moon_info: None,
            ai_signs: None,
            place_error: None,
            moon_error: None,
            signs_error: None,
            generation: 0,
        }
    }

    // --- Read access ---

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn moon_info(&self) -> Option<&MoonInfo> {
        self.moon_info.as_ref()
    }

    pub fn ai_signs(&self) -> Option<&AiSigns> {
        self.ai_signs.as_ref()
    }

    pub fn place_error(&self) -> Option<&str> {
        self.place_error.as_deref()
    }

    pub fn moon_error(&self) -> Option<&str> {
        self.moon_error.as_deref()
    }

    pub fn signs_error(&self) -> Option<&str> {
        self.signs_error.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    // --- Field setters (invalidate derived state on change) ---

    /// Returns true if the edit invalidated derived state.
    pub fn set_name(&mut self, name: String) -> bool {
        if self.profile.name == name {
            return false;
        }
        self.profile.name = name;
        self.invalidate_derived();
        true
    }

    pub fn set_gender(&mut self, gender: Gender) -> bool {
        if self.profile.gender == gender {
            return false;
        }
        self.profile.gender = gender;
        self.invalidate_derived();
        true
    }

    pub fn set_date_of_birth(&mut self, date: CivilDate) -> bool {
        if self.profile.date_of_birth == date {
            return false;
        }
        self.profile.date_of_birth = date;
        self.invalidate_derived();
        true
    }

    pub fn set_time_of_birth(&mut self, time: CivilTime) -> bool {
        if self.profile.time_of_birth == time {
            return false;
        }
        self.profile.time_of_birth = time;
        self.invalidate_derived();
        true
    }

    pub fn set_place_of_birth(&mut self, place: String) -> bool {
        if self.profile.place_of_birth == place {
            return false;
        }
        self.profile.place_of_birth = place;
        self.invalidate_derived();
        true
    }

    /// The focus area steers prompts only; changing it invalidates nothing.
    pub fn set_focus_area(&mut self, area: Option<FocusArea>) {
        self.profile.focus_area = area;
    }

    fn invalidate_derived(&mut self) {
        self.profile.birth_location = None;
        self.moon_info = None;
        self.ai_signs = None;
        self.place_error = None;
        self.moon_error = None;
        self.signs_error = None;
        self.generation += 1;
    }

    // --- Derived-state writers (used by the validation and lookup tasks) ---

    /// Installs a freshly validated place. Overwrites the place text with
    /// the canonical name and advances the generation so lookups issued
    /// against the previous location are discarded on landing.
    pub fn apply_validated_place(&mut self, candidate: &PlaceCandidate) {
        self.profile.place_of_birth = candidate.canonical_name();
        self.profile.birth_location = Some(BirthLocation {
            canonical_name: candidate.canonical_name(),
            latitude: candidate.latitude,
            longitude: candidate.longitude,
            timezone_id: candidate.timezone_id.clone(),
        });
        self.moon_info = None;
        self.ai_signs = None;
        self.place_error = None;
        self.moon_error = None;
        self.signs_error = None;
        self.generation += 1;
    }

    pub fn set_place_error(&mut self, message: String) {
        self.place_error = Some(message);
    }

    pub fn set_moon_info(&mut self, moon: MoonInfo) {
        self.moon_info = Some(moon);
        self.moon_error = None;
    }

    pub fn set_moon_error(&mut self, message: String) {
        self.moon_error = Some(message);
    }

    pub fn set_ai_signs(&mut self, signs: AiSigns) {
        self.ai_signs = Some(signs);
        self.signs_error = None;
    }

    pub fn set_signs_error(&mut self, message: String) {
        self.signs_error = Some(message);
    }

    /// The absolute UTC birth instant. Defined only once a validated
    /// location supplies the timezone.
    pub fn birth_instant(&self) -> PortResult<DateTime<Utc>> {
        let location = self.profile.birth_location.as_ref().ok_or_else(|| {
            PortError::Validation(
                "No validated birth location; validate the place of birth first.".to_string(),
            )
        })?;
        civil::to_utc_instant(
            self.profile.date_of_birth,
            self.profile.time_of_birth,
            &location.timezone_id,
        )
        .map_err(|e| PortError::Validation(e.to_string()))
    }

    /// Clears everything back to a fresh profile.
    pub fn reset(&mut self) {
        let generation = self.generation;
        *self = ProfileState::new(Profile::default());
        self.generation = generation + 1;
    }
}

//=========================================================================================
// ChatSessionState (Specific to One WebSocket Connection)
//=========================================================================================

/// The state for a single, active chat connection: a linear transcript plus
/// the cancellation token for the in-flight stream, if any.
pub struct ChatSessionState {
    pub messages: Vec<ChatMessage>,
    pub error_text: Option<String>,
    pub is_sending: bool,
    /// A token to gracefully cancel the current streaming response.
    pub cancellation_token: CancellationToken,
}

impl ChatSessionState {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            error_text: None,
            is_sending: false,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Seeds the greeting message once per session.
    pub fn seed_if_needed(&mut self, greeting: &str) {
        if self.messages.is_empty() {
            self.messages.push(ChatMessage::assistant(greeting));
        }
    }
}

impl Default for ChatSessionState {
    fn default() -> Self {
        Self::new()
    }
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn validated_state() -> ProfileState {
        let mut state = ProfileState::new(Profile {
            name: "Ada".to_string(),
            place_of_birth: "London".to_string(),
            ..Profile::default()
        });
        state.apply_validated_place(&PlaceCandidate {
            name: "London".to_string(),
            country: Some("United Kingdom".to_string()),
            latitude: 51.51,
            longitude: -0.13,
            timezone_id: "Europe/London".to_string(),
        });
        state.set_moon_info(MoonInfo {
            longitude: 306.0,
            sign: "Aquarius".to_string(),
            degree_in_sign: 6.0,
        });
        state.set_ai_signs(AiSigns {
            solar_sign: "Leo".to_string(),
            vedic_moon_sign: "Cancer".to_string(),
            chinese_sign: "Dragon".to_string(),
        });
        state
    }

    #[test]
    fn validation_installs_canonical_place() {
        let state = validated_state();
        assert_eq!(state.profile().place_of_birth, "London, United Kingdom");
        let location = state.profile().birth_location.as_ref().unwrap();
        assert_eq!(location.timezone_id, "Europe/London");
    }

    #[test]
    fn every_identity_edit_clears_location_and_signs() {
        let edits: [fn(&mut ProfileState) -> bool; 4] = [
            |s| s.set_name("Grace".to_string()),
            |s| s.set_date_of_birth(CivilDate::new(1906, 12, 9)),
            |s| s.set_time_of_birth(CivilTime::new(7, 0, 0)),
            |s| s.set_place_of_birth("New York".to_string()),
        ];

        for edit in edits {
            let mut state = validated_state();
            let generation = state.generation();
            assert!(edit(&mut state));
            assert!(state.profile().birth_location.is_none());
            assert!(state.moon_info().is_none());
            assert!(state.ai_signs().is_none());
            assert_eq!(state.generation(), generation + 1);
        }
    }

    #[test]
    fn unchanged_edit_does_not_invalidate() {
        let mut state = validated_state();
        let generation = state.generation();
        assert!(!state.set_name("Ada".to_string()));
        assert!(state.profile().birth_location.is_some());
        assert_eq!(state.generation(), generation);
    }

    #[test]
    fn focus_area_change_preserves_derived_state() {
        let mut state = validated_state();
        state.set_focus_area(Some(FocusArea::Career));
        assert!(state.profile().birth_location.is_some());
        assert!(state.moon_info().is_some());
    }

    #[test]
    fn birth_instant_requires_a_validated_location() {
        let state = ProfileState::new(Profile::default());
        let err = state.birth_instant().unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));

        let state = validated_state();
        assert!(state.birth_instant().is_ok());
    }

    #[test]
    fn reset_clears_everything_but_advances_the_generation() {
        let mut state = validated_state();
        let generation = state.generation();
        state.reset();
        assert!(state.profile().name.is_empty());
        assert!(state.profile().birth_location.is_none());
        assert!(state.moon_info().is_none());
        assert!(state.generation() > generation);
    }

    #[test]
    fn chat_session_seeds_greeting_once() {
        let mut session = ChatSessionState::new();
        session.seed_if_needed("Hello.");
        session.seed_if_needed("Hello again.");
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].content, "Hello.");
    }
}
