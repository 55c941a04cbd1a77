//! services/api/src/web/chat_task.rs
//!
//! This module contains the asynchronous "worker" function for one chat
//! turn: append the user message, stream the assistant's reply into a
//! placeholder message, and report progress events to the connection.

use crate::prompts;
use crate::web::{
    protocol::ServerMessage,
    state::{AppState, ChatSessionState},
};
use astro_guide_core::domain::{ChatMessage, ChatRole};
use astro_guide_core::ports::{PortError, PortResult};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

/// Runs one chat turn.
///
/// The system context (persona, profile summary, focus hint, resolved
/// signs) is rebuilt and re-sent in full on every call; the collaborator
/// retains no conversation state. Tokens are appended to the trailing
/// assistant placeholder in arrival order, and cancellation is re-checked
/// under the transcript lock before every append so nothing lands after it
/// was observed.
pub async fn chat_process(
    app_state: Arc<AppState>,
    session_lock: Arc<Mutex<ChatSessionState>>,
    events: mpsc::Sender<ServerMessage>,
    text: String,
) -> PortResult<()> {
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(PortError::Validation(
            "Message text must not be empty.".to_string(),
        ));
    }

    let (token, transcript) = {
        let mut session = session_lock.lock().await;
        session.error_text = None;
        session.is_sending = true;
        session.messages.push(ChatMessage::user(text));
        // The placeholder the stream writes into.
        session.messages.push(ChatMessage::assistant(""));
        // The request carries the transcript up to the user message; the
        // empty placeholder stays local.
        let transcript = session.messages[..session.messages.len() - 1].to_vec();
        (session.cancellation_token.clone(), transcript)
    };

    let system = {
        let state = app_state.profile.lock().await;
        let focus_hint = state
            .profile()
            .focus_area
            .map(|area| area.hint())
            .unwrap_or("");
        prompts::chat_system(
            &state.profile().summary(),
            focus_hint,
            state.moon_info(),
            state.ai_signs(),
        )
    };

    let mut stream = match app_state.guidance.complete_streaming(&system, &transcript).await {
        Ok(stream) => stream,
        Err(e) => {
            apologize(&session_lock, &e).await;
            return Err(e);
        }
    };

    info!("Chat stream started.");
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("Chat stream cancelled.");
                break;
            }
            next = stream.next() => match next {
                None => break,
                Some(Ok(delta)) => {
                    {
                        let mut session = session_lock.lock().await;
                        if token.is_cancelled() {
                            break;
                        }
                        if let Some(last) = session.messages.last_mut() {
                            last.content.push_str(&delta);
                        }
                    }
                    if events.send(ServerMessage::Token { text: delta }).await.is_err() {
                        warn!("Chat client went away mid-stream.");
                        break;
                    }
                }
                Some(Err(e)) => {
                    apologize(&session_lock, &e).await;
                    return Err(e);
                }
            }
        }
    }

    session_lock.lock().await.is_sending = false;
    let _ = events.send(ServerMessage::Complete).await;
    Ok(())
}

/// Replaces the assistant placeholder with the fixed apology and records
/// the error for display.
async fn apologize(session_lock: &Arc<Mutex<ChatSessionState>>, error: &PortError) {
    warn!("Chat stream failed: {error}");
    let mut session = session_lock.lock().await;
    if let Some(last) = session.messages.last_mut() {
        if last.role == ChatRole::Assistant {
            last.content = prompts::CHAT_APOLOGY.to_string();
        }
    }
    session.error_text = Some(error.to_string());
    session.is_sending = false;
}
