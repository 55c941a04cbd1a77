//! services/api/src/adapters/chat_llm.rs
//!
//! This module contains the adapter for the conversational guidance LLM.
//! It implements the `GuidanceService` port from the `core` crate for both
//! the one-shot focus summaries and the streaming chat.

use astro_guide_core::{
    domain::{ChatMessage, ChatRole},
    ports::{GuidanceService, GuidanceStream, PortError, PortResult},
};
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `GuidanceService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiGuidanceAdapter {
    /// `None` when no API key was configured; every call then reports a
    /// configuration error instead of attempting the network.
    client: Option<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiGuidanceAdapter {
    /// Creates a new `OpenAiGuidanceAdapter`.
    pub fn new(client: Option<Client<OpenAIConfig>>, model: String) -> Self {
        Self { client, model }
    }

    fn client(&self) -> PortResult<&Client<OpenAIConfig>> {
        self.client.as_ref().ok_or_else(|| {
            PortError::Configuration(
                "OPENAI_API_KEY is not set; guidance generation is unavailable.".to_string(),
            )
        })
    }

    /// Builds the full message list: system first, then the transcript in
    /// order. The system context is re-sent on every call since the
    /// collaborator retains no conversation state.
    fn build_messages(
        system: &str,
        messages: &[ChatMessage],
    ) -> PortResult<Vec<ChatCompletionRequestMessage>> {
        let mut request_messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(
            messages.len() + 1,
        );
        request_messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        );

        for message in messages {
            let request_message = match message.role {
                ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(message.content.clone())
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?
                    .into(),
                ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(message.content.clone())
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?
                    .into(),
            };
            request_messages.push(request_message);
        }

        Ok(request_messages)
    }
}

//=========================================================================================
// `GuidanceService` Trait Implementation
//=========================================================================================

#[async_trait]
impl GuidanceService for OpenAiGuidanceAdapter {
    /// One-shot completion used where no incremental display exists.
    async fn complete(&self, system: &str, messages: &[ChatMessage]) -> PortResult<String> {
        let client = self.client()?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(Self::build_messages(system, messages)?)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Transport(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::ModelOutput("Guidance response contained no text content.".to_string())
            })
    }

    /// Streamed completion; yields token deltas in arrival order.
    async fn complete_streaming(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> PortResult<GuidanceStream> {
        let client = self.client()?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(Self::build_messages(system, messages)?)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let mut upstream = client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e: OpenAIError| PortError::Transport(e.to_string()))?;

        let stream = async_stream::stream! {
            while let Some(next) = upstream.next().await {
                match next {
                    Ok(chunk) => {
                        let delta = chunk
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|choice| choice.delta.content);
                        if let Some(delta) = delta {
                            if !delta.is_empty() {
                                yield Ok(delta);
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(PortError::Transport(e.to_string()));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_api_key_is_a_configuration_error() {
        let adapter = OpenAiGuidanceAdapter::new(None, "gpt-4o-mini".to_string());

        let err = adapter.complete("system", &[]).await.unwrap_err();
        assert!(matches!(err, PortError::Configuration(_)));

        let err = match adapter.complete_streaming("system", &[]).await {
            Ok(_) => panic!("expected a configuration error"),
            Err(e) => e,
        };
        assert!(matches!(err, PortError::Configuration(_)));
    }

    #[test]
    fn transcript_converts_with_system_prompt_first() {
        let messages = vec![
            ChatMessage::assistant("Hello."),
            ChatMessage::user("What about this week?"),
        ];
        let built = OpenAiGuidanceAdapter::build_messages("persona", &messages).unwrap();
        assert_eq!(built.len(), 3);
        assert!(matches!(
            built[0],
            ChatCompletionRequestMessage::System(_)
        ));
        assert!(matches!(
            built[1],
            ChatCompletionRequestMessage::Assistant(_)
        ));
        assert!(matches!(built[2], ChatCompletionRequestMessage::User(_)));
    }
}
