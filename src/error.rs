//! Error taxonomy for the chat session client.
//!
//! Transport and protocol failures are reported through the session event
//! stream and never crash the session; caller-misuse errors are returned
//! synchronously from the operation that triggered them.

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

/// Errors produced by chat transport, protocol handling, and session guards.
#[derive(Debug, Error)]
pub enum ChatClientError {
    /// Websocket transport error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed or contract-violating frame.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Operation requires the session to be connected.
    #[error("session is not connected")]
    NotConnected,

    /// Message content was empty or whitespace-only.
    #[error("message content is empty")]
    EmptyMessage,

    /// Session was constructed with invalid parameters.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Session worker has stopped and no longer accepts commands.
    #[error("session command queue is closed")]
    CommandQueueClosed,
}
