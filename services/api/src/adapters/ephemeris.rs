//! services/api/src/adapters/ephemeris.rs
//!
//! This module contains the adapter for the deterministic ephemeris
//! collaborator: a session-based MCP (JSON-RPC 2.0 over streamable HTTP)
//! client for a Swiss Ephemeris tool server. It implements the
//! `EphemerisService` port from the `core` crate.
//!
//! The response body is server-push event-stream text whose first `data:`
//! line carries a JSON-RPC envelope, and the envelope's `text` content is
//! itself a JSON document (double-encoded). The two-stage decode is a quirk
//! of the external service and is preserved exactly; collapsing it to one
//! decode breaks compatibility.

use astro_guide_core::{
    domain::{MoonInfo, ZodiacSystem},
    ports::{EphemerisProtocolError, EphemerisService, PortError, PortResult},
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::HeaderMap;
use serde_json::{json, Value};
use tokio::sync::Mutex;

const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const CLIENT_NAME: &str = "astro-guide";
const CLIENT_VERSION: &str = "1.0";
const SESSION_HEADER: &str = "Mcp-Session-Id";
const POSITIONS_TOOL: &str = "calculate_planetary_positions";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `EphemerisService` port against a
/// swiss-ephemeris MCP server.
pub struct SwissEphemerisMcpAdapter {
    http: reqwest::Client,
    base_url: String,
    /// Cached session id. Session establishment is serialized by holding
    /// this lock across the `initialize` POST; tool calls only read the
    /// cached id and may run concurrently.
    session_id: Mutex<Option<String>>,
}

impl SwissEphemerisMcpAdapter {
    /// Creates a new `SwissEphemerisMcpAdapter`.
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            session_id: Mutex::new(None),
        }
    }

    fn mcp_url(&self) -> String {
        format!("{}/mcp", self.base_url)
    }

    /// POSTs one JSON-RPC payload and returns the raw body plus response
    /// headers. Non-2xx statuses are protocol errors carrying the body for
    /// diagnosis.
    async fn post_mcp(
        &self,
        payload: &Value,
        session_id: Option<&str>,
    ) -> PortResult<(String, HeaderMap)> {
        let mut request = self
            .http
            .post(self.mcp_url())
            .header("Content-Type", "application/json")
            // The server rejects requests without both accepted types.
            .header("Accept", "application/json, text/event-stream")
            .json(payload);
        if let Some(session_id) = session_id {
            request = request.header(SESSION_HEADER, session_id);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PortError::Transport(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| PortError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(EphemerisProtocolError::HttpStatus {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        Ok((body, headers))
    }

    /// Returns the cached session id, establishing one first if needed.
    async fn current_session_id(&self) -> PortResult<String> {
        let mut guard = self.session_id.lock().await;
        if let Some(session_id) = guard.as_ref() {
            return Ok(session_id.clone());
        }

        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "clientInfo": { "name": CLIENT_NAME, "version": CLIENT_VERSION },
                "capabilities": {}
            }
        });

        let (_body, headers) = self.post_mcp(&payload, None).await?;

        // Header lookup is case-insensitive; the server answers with
        // "mcp-session-id".
        let session_id = headers
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(EphemerisProtocolError::MissingSessionId)?
            .to_string();

        *guard = Some(session_id.clone());
        Ok(session_id)
    }
}

//=========================================================================================
// `EphemerisService` Trait Implementation
//=========================================================================================

#[async_trait]
impl EphemerisService for SwissEphemerisMcpAdapter {
    /// Fetch the Moon position via the planetary-positions tool.
    async fn fetch_moon_info(
        &self,
        instant: DateTime<Utc>,
        latitude: f64,
        longitude: f64,
        zodiac: ZodiacSystem,
    ) -> PortResult<MoonInfo> {
        let session_id = self.current_session_id().await?;

        let datetime = instant.to_rfc3339_opts(SecondsFormat::Millis, true);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {
                "name": POSITIONS_TOOL,
                "arguments": {
                    "datetime": datetime,
                    "latitude": latitude,
                    "longitude": longitude,
                    "zodiac": zodiac.as_str()
                }
            }
        });

        let (body, _headers) = self.post_mcp(&payload, Some(&session_id)).await?;

        let envelope = first_sse_data_json(&body)?;
        let inner = inner_text_from_envelope(&envelope)?;
        Ok(moon_info_from_inner(&inner)?)
    }

    /// Discards the cached session id. Expired sessions surface as protocol
    /// errors; callers reset explicitly instead of relying on a hidden
    /// retry.
    async fn reset_session(&self) {
        *self.session_id.lock().await = None;
    }
}

//=========================================================================================
// Parsing (SSE + double-encoded JSON)
//=========================================================================================

/// Extracts and decodes the JSON object on the first `data:` line of an
/// event-stream body.
fn first_sse_data_json(sse_text: &str) -> Result<Value, EphemerisProtocolError> {
    for raw_line in sse_text.lines() {
        let line = raw_line.trim();
        let Some(rest) = line.strip_prefix("data:") else {
            continue;
        };
        return serde_json::from_str(rest.trim())
            .map_err(|_| EphemerisProtocolError::InvalidEnvelopeJson);
    }
    Err(EphemerisProtocolError::MissingDataLine)
}

/// Envelope JSON shape:
/// `{ "result": { "content": [ { "type": "text", "text": "{...inner json...}" } ] }, ... }`
fn inner_text_from_envelope(envelope: &Value) -> Result<String, EphemerisProtocolError> {
    envelope
        .get("result")
        .and_then(|result| result.get("content"))
        .and_then(Value::as_array)
        .and_then(|content| content.first())
        .and_then(|first| first.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(EphemerisProtocolError::UnexpectedEnvelopeShape)
}

/// Inner JSON shape:
/// `{ "planets": { "Moon": { "longitude": 306.0, "sign": "Aquarius", "degree": 6.0 }, ... }, ... }`
fn moon_info_from_inner(inner: &str) -> Result<MoonInfo, EphemerisProtocolError> {
    let value: Value =
        serde_json::from_str(inner).map_err(|_| EphemerisProtocolError::InvalidInnerJson)?;

    let moon = value
        .get("planets")
        .and_then(|planets| planets.get("Moon"))
        .ok_or(EphemerisProtocolError::MissingMoonFields)?;

    let longitude = moon
        .get("longitude")
        .and_then(Value::as_f64)
        .ok_or(EphemerisProtocolError::MissingMoonFields)?;
    let sign = moon
        .get("sign")
        .and_then(Value::as_str)
        .ok_or(EphemerisProtocolError::MissingMoonFields)?;
    let degree = moon
        .get("degree")
        .and_then(Value::as_f64)
        .ok_or(EphemerisProtocolError::MissingMoonFields)?;

    Ok(MoonInfo {
        longitude,
        sign: sign.to_string(),
        degree_in_sign: degree,
    })
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MOON_SSE_BODY: &str = "event: message\ndata: {\"result\":{\"content\":[{\"type\":\"text\",\"text\":\"{\\\"planets\\\":{\\\"Moon\\\":{\\\"longitude\\\":306.0,\\\"sign\\\":\\\"Aquarius\\\",\\\"degree\\\":6.0}}}\"}]}}\n\n";

    fn expected_moon() -> MoonInfo {
        MoonInfo {
            longitude: 306.0,
            sign: "Aquarius".to_string(),
            degree_in_sign: 6.0,
        }
    }

    //-------------------------------------------------------------------------------------
    // Pure parsing stages
    //-------------------------------------------------------------------------------------

    #[test]
    fn parses_the_documented_tool_response() {
        let envelope = first_sse_data_json(MOON_SSE_BODY).unwrap();
        let inner = inner_text_from_envelope(&envelope).unwrap();
        let moon = moon_info_from_inner(&inner).unwrap();
        assert_eq!(moon, expected_moon());
    }

    #[test]
    fn body_without_data_line_is_missing_data_line() {
        let err = first_sse_data_json("event: message\n\n").unwrap_err();
        assert_eq!(err, EphemerisProtocolError::MissingDataLine);
    }

    #[test]
    fn garbage_data_line_is_invalid_envelope_json() {
        let err = first_sse_data_json("data: {not json}\n").unwrap_err();
        assert_eq!(err, EphemerisProtocolError::InvalidEnvelopeJson);
    }

    #[test]
    fn envelope_without_content_is_unexpected_shape() {
        let envelope = serde_json::json!({ "result": { "content": [] } });
        let err = inner_text_from_envelope(&envelope).unwrap_err();
        assert_eq!(err, EphemerisProtocolError::UnexpectedEnvelopeShape);
    }

    #[test]
    fn unparsable_inner_payload_is_invalid_inner_json() {
        let err = moon_info_from_inner("{planets:").unwrap_err();
        assert_eq!(err, EphemerisProtocolError::InvalidInnerJson);
    }

    #[test]
    fn inner_payload_without_moon_is_missing_moon_fields() {
        let err = moon_info_from_inner(r#"{"planets":{"Sun":{}}}"#).unwrap_err();
        assert_eq!(err, EphemerisProtocolError::MissingMoonFields);

        let err =
            moon_info_from_inner(r#"{"planets":{"Moon":{"longitude":306.0}}}"#).unwrap_err();
        assert_eq!(err, EphemerisProtocolError::MissingMoonFields);
    }

    //-------------------------------------------------------------------------------------
    // Protocol flow against a mock server
    //-------------------------------------------------------------------------------------

    fn adapter(server: &MockServer) -> SwissEphemerisMcpAdapter {
        SwissEphemerisMcpAdapter::new(reqwest::Client::new(), server.uri())
    }

    fn some_instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(1990, 6, 15, 3, 15, 30).unwrap()
    }

    #[tokio::test]
    async fn initialize_without_session_header_fails_cleanly() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(200).set_body_string("event: message\n\n"))
            .mount(&server)
            .await;

        let err = adapter(&server)
            .fetch_moon_info(some_instant(), 38.72, -9.14, ZodiacSystem::SiderealLahiri)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PortError::Protocol(EphemerisProtocolError::MissingSessionId)
        ));
    }

    #[tokio::test]
    async fn session_is_established_once_and_reused() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(serde_json::json!({"method": "initialize"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("mcp-session-id", "session-123")
                    .set_body_string("event: message\ndata: {\"result\":{}}\n\n"),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(serde_json::json!({"method": "tools/call"})))
            .and(header(SESSION_HEADER, "session-123"))
            .and(header("Accept", "application/json, text/event-stream"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MOON_SSE_BODY))
            .expect(2)
            .mount(&server)
            .await;

        let adapter = adapter(&server);
        for _ in 0..2 {
            let moon = adapter
                .fetch_moon_info(some_instant(), 38.72, -9.14, ZodiacSystem::SiderealLahiri)
                .await
                .unwrap();
            assert_eq!(moon, expected_moon());
        }
    }

    #[tokio::test]
    async fn reset_session_forces_reinitialization() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(serde_json::json!({"method": "initialize"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("mcp-session-id", "session-456")
                    .set_body_string("event: message\ndata: {\"result\":{}}\n\n"),
            )
            .expect(2)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(serde_json::json!({"method": "tools/call"})))
            .respond_with(ResponseTemplate::new(200).set_body_string(MOON_SSE_BODY))
            .mount(&server)
            .await;

        let adapter = adapter(&server);
        adapter
            .fetch_moon_info(some_instant(), 0.0, 0.0, ZodiacSystem::Tropical)
            .await
            .unwrap();
        adapter.reset_session().await;
        adapter
            .fetch_moon_info(some_instant(), 0.0, 0.0, ZodiacSystem::Tropical)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn http_error_status_carries_the_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(406).set_body_string("Not Acceptable"))
            .mount(&server)
            .await;

        let err = adapter(&server)
            .fetch_moon_info(some_instant(), 0.0, 0.0, ZodiacSystem::SiderealLahiri)
            .await
            .unwrap_err();
        match err {
            PortError::Protocol(EphemerisProtocolError::HttpStatus { status, body }) => {
                assert_eq!(status, 406);
                assert_eq!(body, "Not Acceptable");
            }
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn datetime_is_sent_with_fractional_seconds() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(serde_json::json!({"method": "initialize"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("mcp-session-id", "session-789")
                    .set_body_string("event: message\ndata: {\"result\":{}}\n\n"),
            )
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(serde_json::json!({
                "params": { "arguments": { "datetime": "1990-06-15T03:15:30.000Z" } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(MOON_SSE_BODY))
            .expect(1)
            .mount(&server)
            .await;

        adapter(&server)
            .fetch_moon_info(some_instant(), 38.72, -9.14, ZodiacSystem::SiderealLahiri)
            .await
            .unwrap();
    }
}
