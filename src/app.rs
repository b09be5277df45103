//! Chat application state
//!
//! Ties the API client, the live session, the feed and the composer
//! together. Logging in (or registering) always replaces the previous
//! session, so there is never more than one socket per client.

use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::auth::{ApiClient, LoginForm, RegisterForm, User};
use crate::composer::Composer;
use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::feed::{FeedEntry, MessageFeed};
use crate::session::{ChatSession, SessionConfig, SessionEvent, SessionSnapshot};

pub struct ChatApp {
    config: Config,
    api: ApiClient,
    user: Option<User>,
    session: Option<ChatSession>,
    feed: MessageFeed,
    composer: Composer,
}

impl ChatApp {
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new(config.clone())?,
            feed: MessageFeed::new(config.feed_capacity),
            composer: Composer::from_config(&config),
            user: None,
            session: None,
            config,
        })
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }

    pub fn feed(&self) -> &MessageFeed {
        &self.feed
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    /// Log in and open the live session
    pub async fn login(&mut self, form: &LoginForm) -> Result<mpsc::Receiver<SessionEvent>> {
        let user = self.api.login(form).await?;
        self.attach(user).await
    }

    /// Register, which also logs in, and open the live session
    pub async fn register(&mut self, form: &RegisterForm) -> Result<mpsc::Receiver<SessionEvent>> {
        let user = self.api.register(form).await?;
        self.attach(user).await
    }

    /// Make `user` the active user: close any previous session, load
    /// history, start a fresh session
    pub async fn attach(&mut self, user: User) -> Result<mpsc::Receiver<SessionEvent>> {
        self.close_session().await;
        self.feed.clear();

        match self.api.recent_messages(self.config.history_limit).await {
            Ok(history) => {
                self.feed.seed_history(&history, Some(user.username.as_str()));
                info!("Loaded {} history messages", history.len());
            }
            Err(e) => warn!("History unavailable: {}", e),
        }

        let (session, events) = ChatSession::start(user.clone(), SessionConfig::from_config(&self.config));
        self.user = Some(user);
        self.session = Some(session);
        Ok(events)
    }

    pub async fn logout(&mut self) {
        if let Some(user) = self.user.take() {
            info!("Logging out {}", user.username);
        }
        self.close_session().await;
    }

    async fn close_session(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!("Session close failed: {}", e);
            }
        }
    }

    /// Validate and send a chat message
    pub fn submit(&mut self, text: &str) -> Result<()> {
        let now = Instant::now();
        self.composer
            .check(text, self.is_logged_in(), self.ban_remaining(), now)?;

        let session = self.session.as_ref().ok_or(ChatError::NotConnected)?;
        session.send_message(text)?;
        self.composer.mark_sent(now);
        Ok(())
    }

    /// Fold a session event into the feed; returns the new line, if any
    pub fn apply(&mut self, event: &SessionEvent) -> Option<&FeedEntry> {
        let own_id = self.user.as_ref().map(|u| u.user_id.as_str());
        match event {
            SessionEvent::Message(msg) => Some(self.feed.push_message(msg, own_id)),
            SessionEvent::System(text) => Some(self.feed.push_system(text)),
            SessionEvent::ChatBanned { remaining } => {
                Some(self.feed.push_system(&format!("You are banned from chatting for {}s", remaining)))
            }
            SessionEvent::BanLifted => Some(self.feed.push_system("Chat ban lifted")),
            SessionEvent::SessionExpired => {
                Some(self.feed.push_system("Session expired: this account logged in elsewhere"))
            }
            _ => None,
        }
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.session.as_ref().map(ChatSession::snapshot)
    }

    pub fn user_count(&self) -> u64 {
        self.session.as_ref().map(ChatSession::user_count).unwrap_or(0)
    }

    pub fn ban_remaining(&self) -> u64 {
        self.session.as_ref().map(ChatSession::ban_remaining).unwrap_or(0)
    }

    pub fn session_expired(&self) -> bool {
        self.session.as_ref().map(ChatSession::session_expired).unwrap_or(false)
    }

    pub fn dismiss_session_expired(&self) {
        if let Some(session) = &self.session {
            session.dismiss_session_expired();
        }
    }
}
