//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        JsonFileProfileStore, OpenAiGuidanceAdapter, OpenAiSignLookupAdapter,
        OpenMeteoGeocodingAdapter, SwissEphemerisMcpAdapter,
    },
    config::Config,
    error::ApiError,
    web::{
        chat_ws_handler,
        focus_task::FocusSummaryOrchestrator,
        get_focus_handler, get_profile_handler, list_focus_areas_handler, reset_profile_handler,
        resolve_signs_handler,
        rest::ApiDoc,
        select_focus_handler,
        state::{AppState, ProfileState},
        update_profile_handler, validate_place_handler,
    },
};
use astro_guide_core::{domain::Profile, ports::ProfileStore};
use async_openai::{config::OpenAIConfig, Client};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Initialize Persistence & Restore the Profile ---
    let store = Arc::new(JsonFileProfileStore::new(config.data_dir.clone()));
    let profile = match store.load_profile().await {
        Ok(Some(profile)) => {
            info!("Restored persisted profile.");
            profile
        }
        Ok(None) => Profile::default(),
        Err(e) => {
            // A broken record is not worth failing startup over.
            warn!("Could not read the persisted profile: {e}");
            Profile::default()
        }
    };

    // --- 3. Initialize Service Adapters ---
    // The API key comes from the environment, falling back to the stored
    // credential. Without one, the AI-dependent features report a
    // configuration error while the deterministic ones keep working.
    let api_key = match &config.openai_api_key {
        Some(key) => Some(key.clone()),
        None => match store.load_credential().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Could not read the stored credential: {e}");
                None
            }
        },
    };
    let openai_client =
        api_key.map(|key| Client::with_config(OpenAIConfig::new().with_api_key(key)));
    if openai_client.is_none() {
        warn!("No OpenAI API key configured; AI features are disabled.");
    }

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let geocoder = Arc::new(OpenMeteoGeocodingAdapter::new(
        http.clone(),
        config.geocoding_base_url.clone(),
    ));
    let ephemeris = Arc::new(SwissEphemerisMcpAdapter::new(
        http.clone(),
        config.ephemeris_base_url.clone(),
    ));
    let sign_lookup = Arc::new(OpenAiSignLookupAdapter::new(
        openai_client.clone(),
        config.sign_model.clone(),
    ));
    let summary_adapter = Arc::new(OpenAiGuidanceAdapter::new(
        openai_client.clone(),
        config.summary_model.clone(),
    ));
    let chat_adapter = Arc::new(OpenAiGuidanceAdapter::new(
        openai_client.clone(),
        config.chat_model.clone(),
    ));

    let focus = Arc::new(FocusSummaryOrchestrator::new(summary_adapter));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        config: config.clone(),
        geocoder,
        ephemeris,
        sign_lookup,
        guidance: chat_adapter,
        store: store.clone(),
        profile: Arc::new(tokio::sync::Mutex::new(ProfileState::new(profile))),
        focus,
    });

    let cors = CorsLayer::new()
        .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    let api_router = Router::new()
        .route(
            "/profile",
            get(get_profile_handler).put(update_profile_handler),
        )
        .route("/profile/place/validate", post(validate_place_handler))
        .route("/profile/signs", post(resolve_signs_handler))
        .route("/profile/reset", post(reset_profile_handler))
        .route(
            "/focus",
            get(list_focus_areas_handler).post(select_focus_handler),
        )
        .route("/focus/{area}", get(get_focus_handler))
        .route("/ws/chat", get(chat_ws_handler))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
