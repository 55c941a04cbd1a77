//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use astro_guide_core::domain::ZodiacSystem;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub data_dir: PathBuf,
    /// Optional on purpose: without it the AI-dependent features report a
    /// configuration error while the deterministic ones keep working.
    pub openai_api_key: Option<String>,
    pub geocoding_base_url: String,
    pub ephemeris_base_url: String,
    pub zodiac_system: ZodiacSystem,
    pub sign_model: String,
    pub summary_model: String,
    pub chat_model: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        // --- Load API Keys (as optional) ---
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();

        // --- Load Collaborator Endpoints ---
        let geocoding_base_url = std::env::var("GEOCODING_BASE_URL")
            .unwrap_or_else(|_| "https://geocoding-api.open-meteo.com".to_string());
        let ephemeris_base_url = std::env::var("EPHEMERIS_BASE_URL").unwrap_or_else(|_| {
            "https://conapp-exastra.yellowrock-7298f3d8.westus.azurecontainerapps.io".to_string()
        });

        // --- Load Adapter-specific Settings ---
        let zodiac_str =
            std::env::var("ZODIAC_SYSTEM").unwrap_or_else(|_| "sidereal_lahiri".to_string());
        let zodiac_system = zodiac_str
            .parse::<ZodiacSystem>()
            .map_err(|e| ConfigError::InvalidValue("ZODIAC_SYSTEM".to_string(), e))?;

        let sign_model =
            std::env::var("SIGN_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let summary_model =
            std::env::var("SUMMARY_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let chat_model = std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-5-mini".to_string());

        Ok(Self {
            bind_address,
            log_level,
            data_dir,
            openai_api_key,
            geocoding_base_url,
            ephemeris_base_url,
            zodiac_system,
            sign_model,
            summary_model,
            chat_model,
        })
    }
}
