//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the client and the API
//! server for the guidance chat.

use serde::{Deserialize, Serialize};

//=========================================================================================
// Messages Sent FROM the Client TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Sends one chat message. Starting a new message supersedes any reply
    /// still streaming.
    Send { text: String },

    /// Cancels the in-flight assistant reply, keeping whatever tokens have
    /// already arrived.
    Cancel,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The greeting that opens every chat session.
    Greeting { text: String },

    /// One token of the assistant reply, in arrival order.
    Token { text: String },

    /// Signals that the current assistant reply is finished (completed,
    /// cancelled, or abandoned).
    Complete,

    /// Reports an error to the client, which should display an error message.
    Error { message: String },
}
