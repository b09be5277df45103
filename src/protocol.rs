//! Wire Protocol
//!
//! JSON frames exchanged with the chat backend over the WebSocket, plus the
//! HTTP payloads used by the API client.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ChatError, Result};

/// Chat line broadcast by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message: String,
    /// Sender's user id
    pub sender: String,
    pub username: String,
    /// Unix epoch milliseconds
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn sent_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// Decoded server frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    UserCount(u64),
    SessionExpired,
    ChatBanned { time_left: Duration },
    Ping,
    System(String),
    Chat(ChatMessage),
    /// Frame with a `type` this client does not understand
    Unknown(String),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TypedFrame {
    UserCount { count: u64 },
    SessionExpired,
    ChatBanned { time_left: i64 },
    Ping,
    System { message: String },
}

const KNOWN_TYPES: &[&str] = &["user_count", "session_expired", "chat_banned", "ping", "system"];

impl ServerEvent {
    /// Decode a text frame
    pub fn parse(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;

        let Some(kind) = value.get("type") else {
            let chat: ChatMessage = serde_json::from_value(value)
                .map_err(|e| ChatError::Protocol(format!("bad chat frame: {}", e)))?;
            return Ok(Self::Chat(chat));
        };

        let kind = kind
            .as_str()
            .ok_or_else(|| ChatError::Protocol("frame 'type' is not a string".to_string()))?
            .to_string();
        if !KNOWN_TYPES.contains(&kind.as_str()) {
            return Ok(Self::Unknown(kind));
        }

        let frame: TypedFrame = serde_json::from_value(value)
            .map_err(|e| ChatError::Protocol(format!("bad '{}' frame: {}", kind, e)))?;

        Ok(match frame {
            TypedFrame::UserCount { count } => Self::UserCount(count),
            TypedFrame::SessionExpired => Self::SessionExpired,
            TypedFrame::ChatBanned { time_left } => Self::ChatBanned {
                time_left: Duration::from_secs(time_left.max(0) as u64),
            },
            TypedFrame::Ping => Self::Ping,
            TypedFrame::System { message } => Self::System(message),
        })
    }
}

/// Frame sent by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub message: String,
}

impl OutgoingMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ── HTTP payloads ───────────────────────────────────────────────────

/// Successful login/register response
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub message: String,
    pub user_id: String,
    pub username: String,
}

/// Error body returned with 4xx responses
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub detail: serde_json::Value,
}

impl ErrorBody {
    /// Flatten `detail`, which may be a string or a validation list
    pub fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Stored message from `/recent_messages`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryMessage {
    pub id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Sender's username
    pub sender: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryResponse {
    pub messages: Vec<HistoryMessage>,
}

#[derive(Debug, Serialize)]
pub(crate) struct DuplicateCheckRequest<'a> {
    pub field: &'a str,
    pub value: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DuplicateCheckResponse {
    pub is_duplicate: bool,
}
