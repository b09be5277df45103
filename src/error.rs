//! Error types for the chat client

use std::time::Duration;

use crate::auth::FieldErrors;

/// Errors surfaced by the client library
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("WebSocket is not connected")]
    NotConnected,

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Chat banned: {0} seconds remaining")]
    ChatBanned(u64),

    #[error("Sending too fast, retry in {}ms", .0.as_millis())]
    Cooldown(Duration),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Session expired")]
    SessionExpired,

    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("Rejected by server: {0}")]
    Rejected(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;
