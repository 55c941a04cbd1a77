//! services/api/src/web/testing.rs
//!
//! Shared in-memory port implementations for orchestration tests.

use crate::config::Config;
use crate::web::focus_task::FocusSummaryOrchestrator;
use crate::web::state::{AppState, ProfileState};
use astro_guide_core::domain::{
    AiSigns, ChatMessage, MoonInfo, PlaceCandidate, Profile, ZodiacSystem,
};
use astro_guide_core::ports::{
    EphemerisService, GeocodingService, GuidanceService, GuidanceStream, PortError, PortResult,
    ProfileStore, SignLookupService,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Geocoder returning a fixed candidate list.
#[derive(Default)]
pub struct StaticGeocoder {
    pub candidates: Vec<PlaceCandidate>,
    pub fail: bool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl GeocodingService for StaticGeocoder {
    async fn search(&self, _query: &str, limit: u32) -> PortResult<Vec<PlaceCandidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PortError::Transport("geocoder offline".to_string()));
        }
        Ok(self
            .candidates
            .iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

/// Ephemeris returning a fixed Moon position after an optional delay.
#[derive(Default)]
pub struct StaticEphemeris {
    pub moon: Option<MoonInfo>,
    pub delay: Duration,
    pub calls: AtomicUsize,
}

#[async_trait]
impl EphemerisService for StaticEphemeris {
    async fn fetch_moon_info(
        &self,
        _instant: DateTime<Utc>,
        _latitude: f64,
        _longitude: f64,
        _zodiac: ZodiacSystem,
    ) -> PortResult<MoonInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.moon
            .clone()
            .ok_or_else(|| PortError::Transport("ephemeris unavailable".to_string()))
    }

    async fn reset_session(&self) {}
}

/// Sign lookup returning fixed signs after an optional delay.
#[derive(Default)]
pub struct StaticSignLookup {
    pub signs: Option<AiSigns>,
    pub delay: Duration,
    pub calls: AtomicUsize,
}

#[async_trait]
impl SignLookupService for StaticSignLookup {
    async fn lookup_signs(
        &self,
        _profile_summary: &str,
        _birth_instant_utc: Option<&str>,
    ) -> PortResult<AiSigns> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.signs
            .clone()
            .ok_or_else(|| PortError::ModelOutput("no signs scripted".to_string()))
    }
}

/// Guidance service yielding a scripted token stream.
#[derive(Default)]
pub struct ScriptedGuidance {
    pub tokens: Vec<String>,
    /// Delay before each yielded token.
    pub token_delay: Duration,
    /// Fail before the stream starts.
    pub fail_on_start: bool,
    /// Fail after the first token.
    pub fail_mid_stream: bool,
    pub calls: AtomicUsize,
    pub last_system: Mutex<Option<String>>,
}

#[async_trait]
impl GuidanceService for ScriptedGuidance {
    async fn complete(&self, system: &str, _messages: &[ChatMessage]) -> PortResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_system.lock().await = Some(system.to_string());
        if self.fail_on_start {
            return Err(PortError::Transport("guidance offline".to_string()));
        }
        Ok(self.tokens.concat())
    }

    async fn complete_streaming(
        &self,
        system: &str,
        _messages: &[ChatMessage],
    ) -> PortResult<GuidanceStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_system.lock().await = Some(system.to_string());
        if self.fail_on_start {
            return Err(PortError::Transport("guidance offline".to_string()));
        }

        let tokens = self.tokens.clone();
        let token_delay = self.token_delay;
        let fail_mid_stream = self.fail_mid_stream;
        let stream = async_stream::stream! {
            for (index, token) in tokens.into_iter().enumerate() {
                tokio::time::sleep(token_delay).await;
                yield Ok(token);
                if fail_mid_stream && index == 0 {
                    yield Err(PortError::Transport("stream dropped".to_string()));
                    return;
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

/// In-memory store; never fails.
#[derive(Default)]
pub struct MemoryStore {
    pub profile: Mutex<Option<Profile>>,
    pub credential: Mutex<Option<String>>,
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn load_profile(&self) -> PortResult<Option<Profile>> {
        Ok(self.profile.lock().await.clone())
    }

    async fn save_profile(&self, profile: &Profile) -> PortResult<()> {
        *self.profile.lock().await = Some(profile.clone());
        Ok(())
    }

    async fn delete_profile(&self) -> PortResult<()> {
        *self.profile.lock().await = None;
        Ok(())
    }

    async fn load_credential(&self) -> PortResult<Option<String>> {
        Ok(self.credential.lock().await.clone())
    }

    async fn save_credential(&self, credential: &str) -> PortResult<()> {
        *self.credential.lock().await = Some(credential.to_string());
        Ok(())
    }

    async fn delete_credential(&self) -> PortResult<()> {
        *self.credential.lock().await = None;
        Ok(())
    }
}

pub fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        log_level: tracing::Level::INFO,
        data_dir: std::path::PathBuf::from("."),
        openai_api_key: None,
        geocoding_base_url: "http://localhost".to_string(),
        ephemeris_base_url: "http://localhost".to_string(),
        zodiac_system: ZodiacSystem::SiderealLahiri,
        sign_model: "test-model".to_string(),
        summary_model: "test-model".to_string(),
        chat_model: "test-model".to_string(),
    }
}

pub fn lisbon_candidate() -> PlaceCandidate {
    PlaceCandidate {
        name: "Lisbon".to_string(),
        country: Some("Portugal".to_string()),
        latitude: 38.72,
        longitude: -9.14,
        timezone_id: "Europe/Lisbon".to_string(),
    }
}

pub fn aquarius_moon() -> MoonInfo {
    MoonInfo {
        longitude: 306.0,
        sign: "Aquarius".to_string(),
        degree_in_sign: 6.0,
    }
}

pub fn test_signs() -> AiSigns {
    AiSigns {
        solar_sign: "Leo".to_string(),
        vedic_moon_sign: "Cancer".to_string(),
        chinese_sign: "Dragon".to_string(),
    }
}

/// Builds an `AppState` over the given port doubles, with fast focus
/// timings so paused-clock tests stay brisk.
pub fn test_state(
    geocoder: Arc<StaticGeocoder>,
    ephemeris: Arc<StaticEphemeris>,
    sign_lookup: Arc<StaticSignLookup>,
    guidance: Arc<ScriptedGuidance>,
) -> Arc<AppState> {
    let focus = Arc::new(FocusSummaryOrchestrator::with_timings(
        guidance.clone(),
        Duration::from_millis(250),
        Duration::from_millis(50),
    ));
    Arc::new(AppState {
        config: Arc::new(test_config()),
        geocoder,
        ephemeris,
        sign_lookup,
        guidance,
        store: Arc::new(MemoryStore::default()),
        profile: Arc::new(tokio::sync::Mutex::new(ProfileState::new(Profile::default()))),
        focus,
    })
}
