//! services/api/src/web/profile_task.rs
//!
//! This module contains the asynchronous "worker" functions for the profile
//! flow: validating the place of birth and resolving the astrological signs.
//!
//! Both tasks snapshot the profile generation before any network call and
//! re-check it before writing results back, so a lookup issued against an
//! edited-away profile can never land on newer state.

use crate::web::state::AppState;
use astro_guide_core::ports::{PortError, PortResult};
use chrono::SecondsFormat;
use std::sync::Arc;
use tracing::{info, warn};

/// Validates the profile's place-of-birth text against the geocoder.
///
/// The first candidate wins; there is no disambiguation step. On success
/// the canonical place name and resolved location are installed and any
/// pending sign lookups for the previous location are implicitly discarded
/// via the generation bump.
pub async fn validate_place_process(app_state: Arc<AppState>) -> PortResult<()> {
    let (query, generation) = {
        let state = app_state.profile.lock().await;
        (state.profile().place_of_birth.clone(), state.generation())
    };

    let query = query.trim().to_string();
    if query.is_empty() {
        let message = "Place of birth is empty.".to_string();
        let mut state = app_state.profile.lock().await;
        if state.generation() == generation {
            state.set_place_error(message.clone());
        }
        return Err(PortError::Validation(message));
    }

    let candidates = match app_state.geocoder.search(&query, 1).await {
        Ok(candidates) => candidates,
        Err(e) => {
            let mut state = app_state.profile.lock().await;
            if state.generation() == generation {
                state.set_place_error(e.to_string());
            }
            return Err(e);
        }
    };

    let Some(candidate) = candidates.into_iter().next() else {
        let message = format!("No match found for '{query}'.");
        let mut state = app_state.profile.lock().await;
        if state.generation() == generation {
            state.set_place_error(message.clone());
        }
        return Err(PortError::Validation(message));
    };

    {
        let mut state = app_state.profile.lock().await;
        if state.generation() != generation {
            info!("Discarding place validation result for an edited profile.");
            return Ok(());
        }
        state.apply_validated_place(&candidate);
    }

    // Cached focus summaries were generated against the previous location.
    app_state.focus.clear().await;

    save_profile(&app_state).await;
    Ok(())
}

/// Resolves the deterministic Moon sign and the model-derived signs.
///
/// The two lookups run concurrently and report independently: a failure of
/// one never blocks or clears the other's result.
pub async fn resolve_signs_process(app_state: Arc<AppState>) -> PortResult<()> {
    let (summary, instant, latitude, longitude, generation) = {
        let state = app_state.profile.lock().await;
        let Some(location) = state.profile().birth_location.clone() else {
            return Err(PortError::Validation(
                "No validated birth location; validate the place of birth first.".to_string(),
            ));
        };
        let instant = state.birth_instant()?;
        (
            state.profile().summary(),
            instant,
            location.latitude,
            location.longitude,
            state.generation(),
        )
    };

    let birth_instant_utc = instant.to_rfc3339_opts(SecondsFormat::Millis, true);
    let zodiac = app_state.config.zodiac_system;

    let (moon_result, signs_result) = tokio::join!(
        app_state
            .ephemeris
            .fetch_moon_info(instant, latitude, longitude, zodiac),
        app_state
            .sign_lookup
            .lookup_signs(&summary, Some(birth_instant_utc.as_str())),
    );

    let mut state = app_state.profile.lock().await;
    if state.generation() != generation {
        info!("Discarding sign results for an edited profile.");
        return Ok(());
    }

    match moon_result {
        Ok(moon) => state.set_moon_info(moon),
        Err(e) => {
            warn!("Moon lookup failed: {e}");
            state.set_moon_error(e.to_string());
        }
    }
    match signs_result {
        Ok(signs) => state.set_ai_signs(signs),
        Err(e) => {
            warn!("AI sign lookup failed: {e}");
            state.set_signs_error(e.to_string());
        }
    }

    Ok(())
}

/// Persists the current profile. Write failures are logged and swallowed:
/// losing a saved profile is preferable to failing the interaction that
/// produced it.
pub async fn save_profile(app_state: &Arc<AppState>) {
    let profile = app_state.profile.lock().await.profile().clone();
    if let Err(e) = app_state.store.save_profile(&profile).await {
        warn!("Failed to persist profile: {e}");
    }
}
