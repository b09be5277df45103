//! Configuration management

use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::backoff::ReconnectPolicy;

const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the HTTP API (login, register, history)
    pub api_base_url: String,

    /// WebSocket endpoint prefix; the user id is appended per session
    pub ws_url: String,

    /// Reconnect backoff for the live session
    pub reconnect: ReconnectPolicy,

    /// Maximum characters per chat message
    pub max_message_chars: usize,

    /// Minimum gap between two sends
    pub send_cooldown: Duration,

    /// Number of history messages fetched on login
    pub history_limit: u32,

    /// Scrollback kept in memory
    pub feed_capacity: usize,

    /// Timeout for HTTP requests
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            ws_url: derive_ws_url(DEFAULT_API_URL),
            reconnect: ReconnectPolicy::default(),
            max_message_chars: 30,
            send_cooldown: Duration::from_millis(500),
            history_limit: 50,
            feed_capacity: 500,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from a dotenv-style file, falling back to the process environment
    /// for keys the file does not set. The process environment is not modified.
    pub fn from_env_file(path: &Path) -> Result<Self> {
        let mut vars = HashMap::new();
        for item in dotenvy::from_path_iter(path)? {
            let (key, value) = item?;
            vars.insert(key, value);
        }
        Self::from_lookup(|key| vars.get(key).cloned().or_else(|| std::env::var(key).ok()))
    }

    /// Build from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_base_url = lookup("CHAT_API_URL")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.api_base_url);

        let ws_url = lookup("CHAT_WS_URL")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| derive_ws_url(&api_base_url));

        let parse_u64 = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let reconnect = ReconnectPolicy {
            base_delay: parse_u64("CHAT_RECONNECT_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect.base_delay),
            max_delay: parse_u64("CHAT_RECONNECT_CAP_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect.max_delay),
            max_jitter: parse_u64("CHAT_RECONNECT_JITTER_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect.max_jitter),
            max_attempts: parse_u64("CHAT_RECONNECT_MAX_ATTEMPTS").map(|n| n.min(u32::MAX as u64) as u32),
        };

        Ok(Self {
            api_base_url,
            ws_url,
            reconnect,
            max_message_chars: parse_u64("CHAT_MAX_MESSAGE_CHARS")
                .map(|n| n as usize)
                .unwrap_or(defaults.max_message_chars),
            send_cooldown: parse_u64("CHAT_SEND_COOLDOWN_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.send_cooldown),
            history_limit: parse_u64("CHAT_HISTORY_LIMIT")
                .map(|n| n.min(u32::MAX as u64) as u32)
                .unwrap_or(defaults.history_limit),
            feed_capacity: parse_u64("CHAT_FEED_CAPACITY")
                .map(|n| n as usize)
                .filter(|n| *n > 0)
                .unwrap_or(defaults.feed_capacity),
            request_timeout: parse_u64("CHAT_REQUEST_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        })
    }

    /// Point the client at another API; the WebSocket URL follows
    pub fn with_api_url(mut self, url: &str) -> Self {
        self.api_base_url = url.trim_end_matches('/').to_string();
        self.ws_url = derive_ws_url(&self.api_base_url);
        self
    }

    pub fn login_url(&self) -> String {
        format!("{}/login", self.api_base_url)
    }

    pub fn register_url(&self) -> String {
        format!("{}/register", self.api_base_url)
    }

    pub fn check_duplicate_url(&self) -> String {
        format!("{}/check_duplicate", self.api_base_url)
    }

    pub fn recent_messages_url(&self) -> String {
        format!("{}/recent_messages", self.api_base_url)
    }

    /// Per-user socket endpoint
    pub fn socket_url(&self, user_id: &str) -> String {
        format!("{}/{}", self.ws_url, user_id)
    }
}

/// `http://host` -> `ws://host/ws`, `https://host` -> `wss://host/ws`
pub fn derive_ws_url(api_base_url: &str) -> String {
    let base = api_base_url.trim_end_matches('/');
    match base.strip_prefix("http") {
        Some(rest) if rest.starts_with("://") || rest.starts_with("s://") => format!("ws{}/ws", rest),
        _ => format!("ws://{}/ws", base),
    }
}
