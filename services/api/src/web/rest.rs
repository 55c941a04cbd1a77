//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::focus_task::SummaryState;
use crate::web::profile_task::{resolve_signs_process, save_profile, validate_place_process};
use crate::web::state::AppState;
use astro_guide_core::civil::{CivilDate, CivilTime};
use astro_guide_core::domain::{AiSigns, FocusArea, Gender, MoonInfo, Profile};
use astro_guide_core::ports::PortError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        get_profile_handler,
        update_profile_handler,
        validate_place_handler,
        resolve_signs_handler,
        reset_profile_handler,
        list_focus_areas_handler,
        select_focus_handler,
        get_focus_handler,
    ),
    components(
        schemas(
            ProfileResponse,
            MoonDto,
            UpdateProfileRequest,
            SelectFocusRequest,
            FocusSummaryResponse,
            FocusAreaInfo
        )
    ),
    tags(
        (name = "Astro Guide API", description = "API endpoints for the astrology guidance service.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The profile plus everything derived from it.
#[derive(Serialize, ToSchema)]
pub struct ProfileResponse {
    #[schema(value_type = Object)]
    pub profile: Profile,
    pub is_complete: bool,
    pub moon: Option<MoonDto>,
    #[schema(value_type = Option<Object>)]
    pub ai_signs: Option<AiSigns>,
    pub place_error: Option<String>,
    pub moon_error: Option<String>,
    pub signs_error: Option<String>,
}

/// The deterministic Moon position, as reported to clients.
#[derive(Serialize, ToSchema)]
pub struct MoonDto {
    pub longitude: f64,
    pub sign: String,
    pub degree_in_sign: f64,
}

impl From<MoonInfo> for MoonDto {
    fn from(moon: MoonInfo) -> Self {
        Self {
            longitude: moon.longitude,
            sign: moon.sign,
            degree_in_sign: moon.degree_in_sign,
        }
    }
}

/// A partial profile update; absent fields are left untouched.
#[derive(Deserialize, ToSchema, Default)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    #[schema(value_type = Option<String>)]
    pub gender: Option<Gender>,
    #[schema(value_type = Option<Object>)]
    pub date_of_birth: Option<CivilDate>,
    #[schema(value_type = Option<Object>)]
    pub time_of_birth: Option<CivilTime>,
    pub place_of_birth: Option<String>,
    #[schema(value_type = Option<String>)]
    pub focus_area: Option<FocusArea>,
}

#[derive(Deserialize, ToSchema)]
pub struct SelectFocusRequest {
    #[schema(value_type = String)]
    pub area: FocusArea,
}

/// The display state of one focus area's summary.
#[derive(Serialize, ToSchema)]
pub struct FocusSummaryResponse {
    #[schema(value_type = String)]
    pub area: FocusArea,
    /// One of "uncached", "pending", "cached", "failed".
    pub status: String,
    pub text: Option<String>,
}

impl FocusSummaryResponse {
    fn from_state(area: FocusArea, state: Option<SummaryState>) -> Self {
        let (status, text) = match state {
            None => ("uncached", None),
            Some(SummaryState::Pending { partial }) => {
                let text = if partial.is_empty() { None } else { Some(partial) };
                ("pending", text)
            }
            Some(SummaryState::Cached(text)) => ("cached", Some(text)),
            Some(SummaryState::Failed(message)) => ("failed", Some(message)),
        };
        Self {
            area,
            status: status.to_string(),
            text,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct FocusAreaInfo {
    #[schema(value_type = String)]
    pub area: FocusArea,
    pub label: String,
}

//=========================================================================================
// Helpers
//=========================================================================================

async fn profile_response(app_state: &Arc<AppState>) -> ProfileResponse {
    let state = app_state.profile.lock().await;
    ProfileResponse {
        profile: state.profile().clone(),
        is_complete: state.profile().is_complete(),
        moon: state.moon_info().cloned().map(MoonDto::from),
        ai_signs: state.ai_signs().cloned(),
        place_error: state.place_error().map(str::to_string),
        moon_error: state.moon_error().map(str::to_string),
        signs_error: state.signs_error().map(str::to_string),
    }
}

fn port_error_response(error: PortError) -> (StatusCode, String) {
    let status = match &error {
        PortError::Validation(_) => StatusCode::BAD_REQUEST,
        PortError::Transport(_) | PortError::Protocol(_) | PortError::ModelOutput(_) => {
            StatusCode::BAD_GATEWAY
        }
        PortError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
        PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, error.to_string())
}

//=========================================================================================
// Profile Handlers
//=========================================================================================

/// Returns the profile and everything derived from it.
#[utoipa::path(
    get,
    path = "/profile",
    responses((status = 200, description = "The current profile", body = ProfileResponse))
)]
pub async fn get_profile_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(profile_response(&app_state).await)
}

/// Applies a partial profile update.
///
/// Any change to name, date, time, or place clears the validated location,
/// the derived signs, and the focus-summary cache before this handler
/// returns; no in-flight lookup can write stale results afterwards.
#[utoipa::path(
    put,
    path = "/profile",
    request_body = UpdateProfileRequest,
    responses((status = 200, description = "The updated profile", body = ProfileResponse))
)]
pub async fn update_profile_handler(
    State(app_state): State<Arc<AppState>>,
    Json(body): Json<UpdateProfileRequest>,
) -> impl IntoResponse {
    let mut invalidated = false;
    {
        let mut state = app_state.profile.lock().await;
        if let Some(name) = body.name {
            invalidated |= state.set_name(name);
        }
        if let Some(gender) = body.gender {
            invalidated |= state.set_gender(gender);
        }
        if let Some(date) = body.date_of_birth {
            invalidated |= state.set_date_of_birth(date);
        }
        if let Some(time) = body.time_of_birth {
            invalidated |= state.set_time_of_birth(time);
        }
        if let Some(place) = body.place_of_birth {
            invalidated |= state.set_place_of_birth(place);
        }
        if let Some(area) = body.focus_area {
            state.set_focus_area(Some(area));
        }
    }

    if invalidated {
        app_state.focus.clear().await;
    }
    save_profile(&app_state).await;

    Json(profile_response(&app_state).await)
}

/// Validates the place of birth against the geocoder.
#[utoipa::path(
    post,
    path = "/profile/place/validate",
    responses(
        (status = 200, description = "Place validated", body = ProfileResponse),
        (status = 400, description = "Empty query or no match"),
        (status = 502, description = "Geocoder unavailable")
    )
)]
pub async fn validate_place_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    validate_place_process(app_state.clone())
        .await
        .map_err(port_error_response)?;
    Ok(Json(profile_response(&app_state).await))
}

/// Resolves the deterministic Moon sign and the model-derived signs.
///
/// Per-feature failures are reported in the response body; only the absence
/// of a validated location fails the request itself.
#[utoipa::path(
    post,
    path = "/profile/signs",
    responses(
        (status = 200, description = "Lookups completed; see per-feature fields", body = ProfileResponse),
        (status = 400, description = "No validated birth location")
    )
)]
pub async fn resolve_signs_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    resolve_signs_process(app_state.clone())
        .await
        .map_err(port_error_response)?;
    Ok(Json(profile_response(&app_state).await))
}

/// Clears the profile, the derived signs, and the focus-summary cache.
#[utoipa::path(
    post,
    path = "/profile/reset",
    responses((status = 200, description = "Profile reset", body = ProfileResponse))
)]
pub async fn reset_profile_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("Resetting profile and caches.");
    app_state.profile.lock().await.reset();
    app_state.focus.clear().await;
    if let Err(e) = app_state.store.delete_profile().await {
        tracing::warn!("Failed to delete persisted profile: {e}");
    }
    Json(profile_response(&app_state).await)
}

//=========================================================================================
// Focus Handlers
//=========================================================================================

/// Lists the selectable focus areas.
#[utoipa::path(
    get,
    path = "/focus",
    responses((status = 200, description = "All focus areas", body = [FocusAreaInfo]))
)]
pub async fn list_focus_areas_handler() -> impl IntoResponse {
    let areas: Vec<FocusAreaInfo> = FocusArea::ALL
        .iter()
        .map(|&area| FocusAreaInfo {
            area,
            label: area.label().to_string(),
        })
        .collect();
    Json(areas)
}

/// Selects a focus area and requests its summary.
///
/// A cached summary is returned immediately; otherwise generation starts
/// and the response reports the pending state for the client to poll.
#[utoipa::path(
    post,
    path = "/focus",
    request_body = SelectFocusRequest,
    responses((status = 200, description = "Summary display state", body = FocusSummaryResponse))
)]
pub async fn select_focus_handler(
    State(app_state): State<Arc<AppState>>,
    Json(body): Json<SelectFocusRequest>,
) -> impl IntoResponse {
    let area = body.area;
    {
        let mut state = app_state.profile.lock().await;
        state.set_focus_area(Some(area));
    }
    save_profile(&app_state).await;

    let (summary, moon, ai_signs) = {
        let state = app_state.profile.lock().await;
        (
            state.profile().summary(),
            state.moon_info().cloned(),
            state.ai_signs().cloned(),
        )
    };
    let display = app_state
        .focus
        .request_summary(summary, area, moon, ai_signs)
        .await;

    Json(FocusSummaryResponse::from_state(area, Some(display)))
}

/// Returns the current summary display state for one focus area.
#[utoipa::path(
    get,
    path = "/focus/{area}",
    params(("area" = String, Path, description = "Focus area, e.g. career")),
    responses(
        (status = 200, description = "Summary display state", body = FocusSummaryResponse),
        (status = 404, description = "Unknown focus area")
    )
)]
pub async fn get_focus_handler(
    State(app_state): State<Arc<AppState>>,
    Path(area): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let area: FocusArea = serde_json::from_value(serde_json::Value::String(area.clone()))
        .map_err(|_| {
            (
                StatusCode::NOT_FOUND,
                format!("Unknown focus area '{area}'"),
            )
        })?;
    let display = app_state.focus.display(area).await;
    Ok(Json(FocusSummaryResponse::from_state(area, display)))
}
