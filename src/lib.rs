//! Chatline
//!
//! Terminal chat client for a WebSocket chat backend.
//!
//! # Features
//!
//! - **Auth**: Login/registration with client-side form validation
//! - **Live Session**: One socket per user, reconnects with capped exponential backoff + jitter
//! - **Chat Bans**: Server-imposed bans tracked as a ticking countdown
//! - **Session Expiry**: Concurrent login elsewhere ends the session for good
//! - **Feed**: Bounded scrollback seeded from stored history
//!
//! # Architecture
//!
//! ```text
//! CLI ──► ChatApp ──► ApiClient ──► HTTP API (/login, /register, /recent_messages)
//!            │
//!            ├── Composer (length, ban, cooldown)
//!            ├── MessageFeed (scrollback)
//!            └── ChatSession ──► Supervisor task ──► ws://host/ws/{user_id}
//!                                   ├── Backoff (reconnect)
//!                                   └── BanCountdown (1s ticks)
//! ```

pub mod app;
pub mod auth;
pub mod backoff;
pub mod ban;
pub mod composer;
pub mod config;
pub mod error;
pub mod feed;
pub mod protocol;
pub mod session;

pub use app::ChatApp;
pub use auth::{ApiClient, DuplicateField, Field, FieldErrors, LoginForm, RegisterForm, User};
pub use backoff::{Backoff, ReconnectPolicy};
pub use ban::BanCountdown;
pub use composer::Composer;
pub use config::Config;
pub use error::{ChatError, Result};
pub use feed::{Author, FeedEntry, MessageFeed};
pub use protocol::{ChatMessage, HistoryMessage, OutgoingMessage, ServerEvent};
pub use session::{ChatSession, ConnectionStatus, SessionConfig, SessionEvent, SessionSnapshot};
