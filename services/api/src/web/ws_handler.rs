//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a chat WebSocket
//! connection. It owns the per-connection session state and delegates each
//! turn to the chat task.

use crate::prompts;
use crate::web::{
    chat_task::chat_process,
    protocol::{ClientMessage, ServerMessage},
    state::{AppState, ChatSessionState},
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The handler for upgrading HTTP requests to chat WebSocket connections.
pub async fn chat_ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    info!("New chat WebSocket connection established.");

    let (sender, mut receiver) = socket.split();
    let sender = Arc::new(Mutex::new(sender));

    let session_lock = Arc::new(Mutex::new(ChatSessionState::new()));
    session_lock
        .lock()
        .await
        .seed_if_needed(prompts::CHAT_GREETING);

    // Outbound events funnel through a channel so streaming tasks never
    // hold the socket sink.
    let (events_tx, mut events_rx) = mpsc::channel::<ServerMessage>(32);
    let forward_task: JoinHandle<()> = {
        let sender = sender.clone();
        tokio::spawn(async move {
            while let Some(message) = events_rx.recv().await {
                let json = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize server message: {e}");
                        continue;
                    }
                };
                if sender.lock().await.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        })
    };

    let greeting = ServerMessage::Greeting {
        text: prompts::CHAT_GREETING.to_string(),
    };
    if events_tx.send(greeting).await.is_err() {
        error!("Failed to queue greeting message.");
        return;
    }

    let mut send_task_handle: Option<JoinHandle<()>> = None;

    loop {
        if let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Send { text }) => {
                        // Cancel-and-await the previous turn before starting
                        // a new one, so no superseded writer remains when
                        // the new stream begins mutating the transcript.
                        {
                            let mut session = session_lock.lock().await;
                            session.cancellation_token.cancel();
                            session.cancellation_token = CancellationToken::new();
                        }
                        if let Some(handle) = send_task_handle.take() {
                            let _ = handle.await;
                        }

                        let task = {
                            let app_state = app_state.clone();
                            let session_lock = session_lock.clone();
                            let events_tx = events_tx.clone();
                            tokio::spawn(async move {
                                if let Err(e) =
                                    chat_process(app_state, session_lock, events_tx.clone(), text)
                                        .await
                                {
                                    error!("Chat process failed: {:?}", e);
                                    let _ = events_tx
                                        .send(ServerMessage::Error {
                                            message: e.to_string(),
                                        })
                                        .await;
                                }
                            })
                        };
                        send_task_handle = Some(task);
                    }
                    Ok(ClientMessage::Cancel) => {
                        info!("Cancel message received. Cancelling response stream.");
                        session_lock.lock().await.cancellation_token.cancel();
                    }
                    Err(e) => {
                        warn!("Failed to deserialize client message: {}", e);
                    }
                },
                Message::Close(_) => {
                    info!("Client sent close message.");
                    break;
                }
                _ => {}
            }
        } else {
            info!("Client disconnected.");
            break;
        }
    }

    // --- Cleanup ---
    session_lock.lock().await.cancellation_token.cancel();
    if let Some(handle) = send_task_handle.take() {
        let _ = handle.await;
    }
    forward_task.abort();
    info!("Chat WebSocket connection closed.");
}
