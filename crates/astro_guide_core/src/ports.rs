//! crates/astro_guide_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like geocoders, the
//! ephemeris RPC service, or chat-completion APIs.

use crate::domain::{AiSigns, ChatMessage, MoonInfo, PlaceCandidate, Profile, ZodiacSystem};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::pin::Pin;

//=========================================================================================
// Port Error and Result Types
//=========================================================================================

/// The error taxonomy shared by all port operations.
///
/// Every async entry point catches its own failures and stores a message in
/// an error field scoped to that feature; no error crosses a feature
/// boundary. In particular, an AI lookup failure never blocks the
/// deterministic Moon-sign result.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// Bad or empty user input. The user corrects and retries.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network or HTTP failure reaching a collaborator. Retryable.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed response from the ephemeris RPC, at a specific parse stage.
    #[error("Protocol error: {0}")]
    Protocol(#[from] EphemerisProtocolError),

    /// The language model returned unparsable or empty content.
    #[error("Model output error: {0}")]
    ModelOutput(String),

    /// A required credential or setting is missing. Fatal to AI-dependent
    /// features only; deterministic features remain usable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Failures of the ephemeris RPC protocol, one variant per stage so each is
/// independently distinguishable for debugging and retry decisions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EphemerisProtocolError {
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("Missing session id header on initialize response")]
    MissingSessionId,
    #[error("Missing event-stream data line")]
    MissingDataLine,
    #[error("Invalid JSON in event-stream envelope")]
    InvalidEnvelopeJson,
    #[error("Unexpected envelope shape")]
    UnexpectedEnvelopeShape,
    #[error("Invalid inner JSON payload")]
    InvalidInnerJson,
    #[error("Moon fields not found in tool response")]
    MissingMoonFields,
}

/// The item stream produced by a streamed chat completion.
pub type GuidanceStream = Pin<Box<dyn Stream<Item = PortResult<String>> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The external geocoding collaborator behind place validation.
#[async_trait]
pub trait GeocodingService: Send + Sync {
    /// Looks up place candidates for a free-text query. Candidates without
    /// a usable timezone are not returned.
    async fn search(&self, query: &str, limit: u32) -> PortResult<Vec<PlaceCandidate>>;
}

/// The deterministic ephemeris collaborator (session-based RPC).
#[async_trait]
pub trait EphemerisService: Send + Sync {
    /// Computes the Moon's position for a UTC instant at the given
    /// coordinates under the selected zodiac system.
    async fn fetch_moon_info(
        &self,
        instant: DateTime<Utc>,
        latitude: f64,
        longitude: f64,
        zodiac: ZodiacSystem,
    ) -> PortResult<MoonInfo>;

    /// Discards the cached session so the next call re-initializes.
    /// Session expiry is surfaced, never silently retried; callers decide
    /// when to reset.
    async fn reset_session(&self);
}

/// The model-backed sign lookup (solar, Vedic moon, Chinese signs).
#[async_trait]
pub trait SignLookupService: Send + Sync {
    async fn lookup_signs(
        &self,
        profile_summary: &str,
        birth_instant_utc: Option<&str>,
    ) -> PortResult<AiSigns>;
}

/// The chat-completion collaborator behind focus summaries and the chat.
#[async_trait]
pub trait GuidanceService: Send + Sync {
    /// One-shot completion of a system prompt plus transcript.
    async fn complete(&self, system: &str, messages: &[ChatMessage]) -> PortResult<String>;

    /// Streamed completion; items are token deltas in arrival order.
    async fn complete_streaming(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> PortResult<GuidanceStream>;
}

/// The local key-value persistence collaborator.
///
/// Write failures are loggable but non-fatal at call sites: losing a saved
/// profile is preferable to failing the interaction that produced it.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn load_profile(&self) -> PortResult<Option<Profile>>;
    async fn save_profile(&self, profile: &Profile) -> PortResult<()>;
    async fn delete_profile(&self) -> PortResult<()>;

    async fn load_credential(&self) -> PortResult<Option<String>>;
    async fn save_credential(&self, credential: &str) -> PortResult<()>;
    async fn delete_credential(&self) -> PortResult<()>;
}
