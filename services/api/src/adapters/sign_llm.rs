//! services/api/src/adapters/sign_llm.rs
//!
//! This module contains the adapter for the model-derived sign lookup.
//! It implements the `SignLookupService` port from the `core` crate.

use crate::prompts;
use astro_guide_core::{
    domain::AiSigns,
    ports::{PortError, PortResult, SignLookupService},
};
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `SignLookupService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiSignLookupAdapter {
    /// `None` when no API key was configured. The lookup then fails with a
    /// configuration error while deterministic features stay available.
    client: Option<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiSignLookupAdapter {
    /// Creates a new `OpenAiSignLookupAdapter`.
    pub fn new(client: Option<Client<OpenAIConfig>>, model: String) -> Self {
        Self { client, model }
    }
}

//=========================================================================================
// `SignLookupService` Trait Implementation
//=========================================================================================

#[async_trait]
impl SignLookupService for OpenAiSignLookupAdapter {
    /// Looks up the solar, Vedic moon, and Chinese signs for a profile.
    ///
    /// Temperature is fixed at 0 to minimize run-to-run variance; the
    /// lookup is deterministic in intent though not in guarantee.
    async fn lookup_signs(
        &self,
        profile_summary: &str,
        birth_instant_utc: Option<&str>,
    ) -> PortResult<AiSigns> {
        let client = self.client.as_ref().ok_or_else(|| {
            PortError::Configuration(
                "OPENAI_API_KEY is not set; the AI sign lookup is unavailable.".to_string(),
            )
        })?;

        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(prompts::SIGN_LOOKUP_SYSTEM)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompts::sign_lookup_user(profile_summary, birth_instant_utc))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.0)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error, which respects the orphan rule.
        let response = client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Transport(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::ModelOutput("Sign lookup returned no text content.".to_string())
            })?;

        parse_signs(&content)
    }
}

//=========================================================================================
// Response Parsing
//=========================================================================================

/// Decodes the model's reply into `AiSigns`.
///
/// First attempts a direct decode of the whole reply. If the model wrapped
/// the object in prose despite the instructions, falls back to scanning for
/// the first balanced top-level `{...}` object and decoding that substring.
fn parse_signs(content: &str) -> PortResult<AiSigns> {
    if let Ok(signs) = serde_json::from_str::<AiSigns>(content.trim()) {
        return Ok(signs);
    }

    extract_first_json_object(content)
        .and_then(|candidate| serde_json::from_str::<AiSigns>(candidate).ok())
        .ok_or_else(|| {
            PortError::ModelOutput(format!(
                "Could not parse sign lookup output: '{}'",
                content.trim()
            ))
        })
}

/// Returns the first balanced top-level `{...}` substring, tracking
/// string-literal and escape state while counting brace depth.
fn extract_first_json_object(text: &str) -> Option<&str> {
    let mut start = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, ch) in text.char_indices() {
        let Some(start_index) = start else {
            if ch == '{' {
                start = Some(index);
                depth = 1;
            }
            continue;
        };

        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start_index..index + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

//=========================================================================================
// Tests
//=========================================================================================
