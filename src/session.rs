//! Live Chat Session
//!
//! One supervisor task per logged-in user owns at most one WebSocket at a
//! time. It:
//! - forwards decoded server frames as [`SessionEvent`]s
//! - reconnects after abnormal closure with capped exponential backoff + jitter
//! - stops for good on a normal close (1000), session expiry, an unknown-user
//!   close (4000), or when the reconnect budget is exhausted
//! - ticks the chat-ban countdown once per second, connected or not
//!
//! ```text
//!   ChatSession ──cmd──► Supervisor ──► connect ─► drive ──┐
//!        ▲                   │              ▲              │ dropped
//!        └──── events ◄──────┘              └── backoff ◄──┘
//! ```

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::auth::User;
use crate::backoff::{Backoff, ReconnectPolicy};
use crate::ban::BanCountdown;
use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::protocol::{ChatMessage, OutgoingMessage, ServerEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code for an intentional, clean shutdown
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code the server uses for an unknown user id
pub const CLOSE_UNKNOWN_USER: u16 = 4000;

const DEFAULT_EVENT_CAPACITY: usize = 256;
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);
const BAN_TICK: Duration = Duration::from_secs(1);

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Socket endpoint prefix; `/{user_id}` is appended
    pub ws_url: String,
    pub reconnect: ReconnectPolicy,
    /// Capacity of the bounded event channel; one extra slot is always
    /// held back for the terminal event
    pub event_capacity: usize,
    /// How long `close()` waits for the supervisor before aborting it
    pub shutdown_timeout: Duration,
}

impl SessionConfig {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            reconnect: ReconnectPolicy::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            reconnect: config.reconnect.clone(),
            ..Self::new(config.ws_url.clone())
        }
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

/// Connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    /// Waiting out the backoff before retry number `attempt`
    Reconnecting { attempt: u32 },
    Closed,
}

/// Events emitted by a running session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected,
    /// Socket dropped or a connect attempt failed
    Disconnected { code: Option<u16>, reason: String },
    Reconnecting { attempt: u32, delay: Duration },
    UserCount(u64),
    Message(ChatMessage),
    System(String),
    ChatBanned { remaining: u64 },
    BanTick(u64),
    BanLifted,
    SessionExpired,
    /// Reconnect budget exhausted
    GaveUp { attempts: u32 },
    Closed,
}

impl SessionEvent {
    /// No further events follow a terminal one
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::GaveUp { .. })
    }
}

/// Point-in-time view of the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub status: ConnectionStatus,
    pub user_count: u64,
    pub ban_remaining: u64,
    pub session_expired: bool,
    pub reconnect_attempt: u32,
}

#[derive(Debug)]
struct SessionState {
    status: ConnectionStatus,
    user_count: u64,
    ban: BanCountdown,
    session_expired: bool,
    reconnect_attempt: u32,
}

impl SessionState {
    fn new() -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            user_count: 0,
            ban: BanCountdown::new(),
            session_expired: false,
            reconnect_attempt: 0,
        }
    }
}

#[derive(Debug)]
enum Command {
    Send(OutgoingMessage),
    Shutdown,
}

/// Handle to a running session
pub struct ChatSession {
    user: User,
    commands: mpsc::UnboundedSender<Command>,
    state: Arc<RwLock<SessionState>>,
    task: Option<JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl ChatSession {
    /// Spawn the supervisor for `user`. Must be called within a Tokio runtime.
    pub fn start(user: User, config: SessionConfig) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1) + 1);
        let terminal = event_tx.clone().try_reserve_owned().ok();
        let state = Arc::new(RwLock::new(SessionState::new()));

        let mut ticker = tokio::time::interval(BAN_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let supervisor = Supervisor {
            url: format!("{}/{}", config.ws_url.trim_end_matches('/'), user.user_id),
            state: Arc::clone(&state),
            events: event_tx,
            terminal,
            commands: cmd_rx,
            ticker,
            backoff: Backoff::new(config.reconnect.clone()),
        };

        info!("Starting chat session for {}", user.username);
        let task = tokio::spawn(supervisor.run());

        let session = Self {
            user,
            commands: cmd_tx,
            state,
            task: Some(task),
            shutdown_timeout: config.shutdown_timeout,
        };
        (session, event_rx)
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    /// Queue a chat message; only allowed while the socket is open
    pub fn send_message(&self, text: &str) -> Result<()> {
        {
            let state = self.state.read();
            if state.session_expired {
                return Err(ChatError::SessionExpired);
            }
            if state.status != ConnectionStatus::Connected {
                error!("WebSocket is not connected");
                return Err(ChatError::NotConnected);
            }
        }

        self.commands
            .send(Command::Send(OutgoingMessage::new(text)))
            .map_err(|_| ChatError::NotConnected)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read();
        SessionSnapshot {
            status: state.status,
            user_count: state.user_count,
            ban_remaining: state.ban.remaining(Instant::now()),
            session_expired: state.session_expired,
            reconnect_attempt: state.reconnect_attempt,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.read().status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub fn user_count(&self) -> u64 {
        self.state.read().user_count
    }

    pub fn ban_remaining(&self) -> u64 {
        self.state.read().ban.remaining(Instant::now())
    }

    pub fn session_expired(&self) -> bool {
        self.state.read().session_expired
    }

    /// Acknowledge the expiry notice
    pub fn dismiss_session_expired(&self) {
        self.state.write().session_expired = false;
    }

    /// Close with code 1000, cancel any pending reconnect, and wait for the
    /// supervisor to finish
    pub async fn close(mut self) -> Result<()> {
        let _ = self.commands.send(Command::Shutdown);

        let Some(mut task) = self.task.take() else {
            return Ok(());
        };

        match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ChatError::Internal(format!("session task failed: {}", e))),
            Err(_) => {
                warn!("Session for {} did not stop in time, aborting", self.user.username);
                task.abort();
                Ok(())
            }
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.commands.send(Command::Shutdown);
        }
    }
}

/// Why a connection ended
#[derive(Debug)]
enum Outcome {
    /// Local shutdown requested
    Shutdown,
    /// Socket dropped or never opened
    Dropped { code: Option<u16>, reason: String },
}

/// Result of one `select!` round
enum Step<T> {
    Ready(T),
    Command(Option<Command>),
    Tick,
}

struct Supervisor {
    url: String,
    state: Arc<RwLock<SessionState>>,
    events: mpsc::Sender<SessionEvent>,
    /// Slot reserved at start so `Closed`/`GaveUp` never wait on the receiver
    terminal: Option<mpsc::OwnedPermit<SessionEvent>>,
    commands: mpsc::UnboundedReceiver<Command>,
    ticker: Interval,
    backoff: Backoff,
}

impl Supervisor {
    async fn run(mut self) {
        loop {
            let outcome = match self.connect().await {
                Some(Ok(stream)) => {
                    self.backoff.reset();
                    {
                        let mut state = self.state.write();
                        state.status = ConnectionStatus::Connected;
                        state.reconnect_attempt = 0;
                    }
                    info!("WebSocket connected: {}", self.url);
                    self.emit(SessionEvent::Connected);
                    self.drive(stream).await
                }
                Some(Err(reason)) => Outcome::Dropped { code: None, reason },
                None => Outcome::Shutdown,
            };

            let (code, reason) = match outcome {
                Outcome::Shutdown => {
                    info!("WebSocket closed intentionally");
                    return self.finish();
                }
                Outcome::Dropped { code, reason } => (code, reason),
            };

            warn!("WebSocket disconnected (code {:?}): {}", code, reason);
            self.emit(SessionEvent::Disconnected { code, reason });

            if code == Some(CLOSE_NORMAL) {
                return self.finish();
            }
            if self.state.read().session_expired {
                info!("Session expired, not reconnecting");
                return self.finish();
            }
            if code == Some(CLOSE_UNKNOWN_USER) {
                error!("Server rejected user id, not reconnecting");
                return self.finish();
            }
            if self.backoff.exhausted() {
                let attempts = self.backoff.attempt();
                error!("Giving up after {} reconnect attempts", attempts);
                self.state.write().status = ConnectionStatus::Closed;
                self.emit_terminal(SessionEvent::GaveUp { attempts });
                return;
            }

            let attempt = self.backoff.attempt() + 1;
            let delay = self.backoff.next_delay();
            {
                let mut state = self.state.write();
                state.status = ConnectionStatus::Reconnecting { attempt };
                state.reconnect_attempt = attempt;
            }
            info!("Attempting to reconnect in {}ms...", delay.as_millis());
            self.emit(SessionEvent::Reconnecting { attempt, delay });

            if !self.wait_reconnect(delay).await {
                return self.finish();
            }
        }
    }

    /// Open the socket. `None` means shutdown was requested meanwhile.
    async fn connect(&mut self) -> Option<std::result::Result<WsStream, String>> {
        self.state.write().status = ConnectionStatus::Connecting;
        debug!("Connecting to {}", self.url);

        let connecting = connect_async(self.url.clone());
        tokio::pin!(connecting);

        loop {
            let step = tokio::select! {
                res = &mut connecting => Step::Ready(res),
                cmd = self.commands.recv() => Step::Command(cmd),
                _ = self.ticker.tick() => Step::Tick,
            };

            match step {
                Step::Ready(Ok((stream, _))) => return Some(Ok(stream)),
                Step::Ready(Err(e)) => return Some(Err(e.to_string())),
                Step::Command(Some(Command::Send(_))) => warn!("Dropping message: socket not open"),
                Step::Command(Some(Command::Shutdown)) | Step::Command(None) => return None,
                Step::Tick => self.on_tick(),
            }
        }
    }

    /// Pump one open socket until it ends
    async fn drive(&mut self, stream: WsStream) -> Outcome {
        let (mut write, mut read) = stream.split();

        loop {
            let step = tokio::select! {
                frame = read.next() => Step::Ready(frame),
                cmd = self.commands.recv() => Step::Command(cmd),
                _ = self.ticker.tick() => Step::Tick,
            };

            match step {
                Step::Ready(Some(Ok(Message::Text(text)))) => self.handle_frame(&text),
                Step::Ready(Some(Ok(Message::Close(frame)))) => {
                    let (code, reason) = match frame {
                        Some(f) => (Some(u16::from(f.code)), f.reason.to_string()),
                        None => (None, "closed without status".to_string()),
                    };
                    return Outcome::Dropped { code, reason };
                }
                Step::Ready(Some(Ok(_))) => {}
                Step::Ready(Some(Err(e))) => {
                    error!("WebSocket error: {}", e);
                    return Outcome::Dropped { code: None, reason: e.to_string() };
                }
                Step::Ready(None) => {
                    return Outcome::Dropped {
                        code: None,
                        reason: "stream ended".to_string(),
                    };
                }
                Step::Command(Some(Command::Send(msg))) => {
                    let json = match msg.to_json() {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("Failed to encode message: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = write.send(Message::Text(json)).await {
                        error!("WebSocket send failed: {}", e);
                        return Outcome::Dropped { code: None, reason: e.to_string() };
                    }
                }
                Step::Command(Some(Command::Shutdown)) | Step::Command(None) => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "Intentional disconnect".into(),
                    };
                    if let Err(e) = write.send(Message::Close(Some(frame))).await {
                        debug!("Close frame not delivered: {}", e);
                    }
                    // Let the server echo the close handshake
                    let _ = tokio::time::timeout(Duration::from_secs(1), async {
                        while let Some(Ok(_)) = read.next().await {}
                    })
                    .await;
                    return Outcome::Shutdown;
                }
                Step::Tick => self.on_tick(),
            }
        }
    }

    /// Sleep out the backoff. Returns false when shutdown was requested.
    async fn wait_reconnect(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            let step = tokio::select! {
                _ = &mut sleep => Step::Ready(()),
                cmd = self.commands.recv() => Step::Command(cmd),
                _ = self.ticker.tick() => Step::Tick,
            };

            match step {
                Step::Ready(()) => return true,
                Step::Command(Some(Command::Send(_))) => warn!("Dropping message: socket not open"),
                Step::Command(Some(Command::Shutdown)) | Step::Command(None) => return false,
                Step::Tick => self.on_tick(),
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        let event = match ServerEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping malformed frame: {}", e);
                return;
            }
        };

        match event {
            ServerEvent::UserCount(count) => {
                self.state.write().user_count = count;
                self.emit(SessionEvent::UserCount(count));
            }
            ServerEvent::SessionExpired => {
                self.state.write().session_expired = true;
                warn!("Session expired: logged in elsewhere");
                self.emit(SessionEvent::SessionExpired);
            }
            ServerEvent::ChatBanned { time_left } => {
                let remaining = {
                    let now = Instant::now();
                    let mut state = self.state.write();
                    state.ban.impose(time_left, now);
                    state.ban.remaining(now)
                };
                warn!("Chat banned for {}s", remaining);
                self.emit(SessionEvent::ChatBanned { remaining });
            }
            ServerEvent::Ping => debug!("Server ping"),
            ServerEvent::System(text) => self.emit(SessionEvent::System(text)),
            ServerEvent::Chat(msg) => self.emit(SessionEvent::Message(msg)),
            ServerEvent::Unknown(kind) => debug!("Ignoring frame type '{}'", kind),
        }
    }

    fn on_tick(&self) {
        let now = Instant::now();
        let event = {
            let mut state = self.state.write();
            if !state.ban.is_pending() {
                return;
            }
            if state.ban.lift_if_elapsed(now) {
                SessionEvent::BanLifted
            } else {
                SessionEvent::BanTick(state.ban.remaining(now))
            }
        };

        if event == SessionEvent::BanLifted {
            info!("Chat ban lifted");
        }
        self.emit(event);
    }

    fn emit(&self, event: SessionEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("Event channel full, dropping {:?}", event);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Event receiver dropped");
            }
        }
    }

    fn emit_terminal(&mut self, event: SessionEvent) {
        match self.terminal.take() {
            Some(permit) => {
                permit.send(event);
            }
            None => self.emit(event),
        }
    }

    fn finish(&mut self) {
        self.state.write().status = ConnectionStatus::Closed;
        self.emit_terminal(SessionEvent::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_events() {
        assert!(SessionEvent::Closed.is_terminal());
        assert!(SessionEvent::GaveUp { attempts: 3 }.is_terminal());
        assert!(!SessionEvent::Connected.is_terminal());
        assert!(!SessionEvent::BanLifted.is_terminal());
    }

    #[test]
    fn test_session_config_from_config() {
        let config = Config::default();
        let session = SessionConfig::from_config(&config);
        assert_eq!(session.ws_url, "ws://localhost:8000/ws");
        assert_eq!(session.reconnect, config.reconnect);
        assert_eq!(session.event_capacity, DEFAULT_EVENT_CAPACITY);
    }

    #[tokio::test]
    async fn test_terminal_slot_survives_full_channel() {
        let user = User {
            user_id: "u-1".to_string(),
            username: "alice".to_string(),
        };
        let config = SessionConfig::new("ws://127.0.0.1:9/ws")
            .with_event_capacity(1)
            .with_reconnect(ReconnectPolicy {
                base_delay: Duration::from_secs(60),
                ..ReconnectPolicy::default()
            });
        let (session, mut events) = ChatSession::start(user, config);

        let started = Instant::now();
        tokio::time::sleep(Duration::from_millis(200)).await;
        session.close().await.unwrap();
        assert!(started.elapsed() < DEFAULT_SHUTDOWN_TIMEOUT);

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.len() <= 2);
        assert_eq!(seen.last(), Some(&SessionEvent::Closed));
    }

    #[tokio::test]
    async fn test_send_rejected_before_open() {
        let user = User {
            user_id: "u-1".to_string(),
            username: "alice".to_string(),
        };
        // Nothing listens on port 9 here; the session stays disconnected
        let config = SessionConfig::new("ws://127.0.0.1:9/ws").with_reconnect(ReconnectPolicy {
            base_delay: Duration::from_secs(60),
            ..ReconnectPolicy::default()
        });
        let (session, _events) = ChatSession::start(user, config);

        assert!(matches!(session.send_message("hi"), Err(ChatError::NotConnected)));
        assert_eq!(session.user_count(), 0);
        session.close().await.unwrap();
    }
}
