//! services/api/src/adapters/geocoding.rs
//!
//! This module contains the adapter for the external geocoding collaborator.
//! It implements the `GeocodingService` port from the `core` crate against
//! the Open-Meteo geocoding API.

use astro_guide_core::{
    domain::PlaceCandidate,
    ports::{GeocodingService, PortError, PortResult},
};
use async_trait::async_trait;
use serde::Deserialize;

//=========================================================================================
// Wire Format
//=========================================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchRow>,
}

#[derive(Debug, Deserialize)]
struct SearchRow {
    name: String,
    latitude: f64,
    longitude: f64,
    timezone: Option<String>,
    country: Option<String>,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `GeocodingService` port using the
/// Open-Meteo geocoding API.
#[derive(Clone)]
pub struct OpenMeteoGeocodingAdapter {
    http: reqwest::Client,
    base_url: String,
}

impl OpenMeteoGeocodingAdapter {
    /// Creates a new `OpenMeteoGeocodingAdapter`.
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }
}

//=========================================================================================
// `GeocodingService` Trait Implementation
//=========================================================================================

#[async_trait]
impl GeocodingService for OpenMeteoGeocodingAdapter {
    /// Looks up place candidates for a free-text query.
    ///
    /// Rows without a timezone are dropped: a candidate that cannot anchor
    /// the birth moment is useless to every caller of this port.
    async fn search(&self, query: &str, limit: u32) -> PortResult<Vec<PlaceCandidate>> {
        let url = format!("{}/v1/search", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("name", query),
                ("count", &limit.to_string()),
                ("language", "en"),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| PortError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PortError::Transport(format!(
                "Geocoder returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| PortError::Transport(format!("Invalid geocoder response: {e}")))?;

        Ok(body
            .results
            .into_iter()
            .filter_map(|row| {
                let timezone_id = row.timezone?;
                Some(PlaceCandidate {
                    name: row.name,
                    country: row.country,
                    latitude: row.latitude,
                    longitude: row.longitude,
                    timezone_id,
                })
            })
            .collect())
    }
}

//=========================================================================================
// Tests
//=========================================================================================
