//! Chat App End-to-End Tests
//!
//! Logs in against an axum mock API, then drives the live session through a
//! local tokio-tungstenite server.

use axum::routing::{get, post};
use axum::{Json, Router};
use chatline::{ChatApp, ChatError, Config, LoginForm, ReconnectPolicy, SessionEvent};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::Receiver;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

const WAIT: Duration = Duration::from_secs(5);

async fn spawn_api() -> String {
    let app = Router::new()
        .route(
            "/login",
            post(|Json(body): Json<Value>| async move {
                Json(json!({"message": "Login successful", "user_id": "u-42", "username": body["username"]}))
            }),
        )
        .route(
            "/recent_messages",
            get(|| async {
                Json(json!({"messages": [
                    {"id": "m2", "content": "welcome back", "created_at": "2024-05-01T12:02:00Z", "sender": "bob"},
                    {"id": "m1", "content": "earlier me", "created_at": "2024-05-01T12:01:00Z", "sender": "alice"},
                ]}))
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn setup() -> (ChatApp, TcpListener) {
    let api = spawn_api().await;
    let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

    let mut config = Config::default().with_api_url(&api);
    config.ws_url = format!("ws://{}/ws", ws_listener.local_addr().unwrap());
    config.reconnect = ReconnectPolicy {
        base_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(100),
        max_jitter: Duration::ZERO,
        max_attempts: Some(3),
    };

    (ChatApp::new(config).unwrap(), ws_listener)
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (tcp, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    tokio_tungstenite::accept_async(tcp).await.unwrap()
}

async fn next_event(events: &mut Receiver<SessionEvent>) -> SessionEvent {
    timeout(WAIT, events.recv()).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_login_seeds_history_and_connects() {
    let (mut app, listener) = setup().await;

    let mut events = app.login(&LoginForm::new("alice", "password123")).await.unwrap();
    assert!(app.is_logged_in());
    assert_eq!(app.user().unwrap().user_id, "u-42");

    // History arrives newest first and is shown oldest first
    let texts: Vec<_> = app.feed().iter().map(|e| e.text.clone()).collect();
    assert_eq!(texts, vec!["earlier me", "welcome back"]);
    assert!(app.feed().iter().next().unwrap().is_own());

    let _ws = accept(&listener).await;
    assert_eq!(next_event(&mut events).await, SessionEvent::Connected);

    app.logout().await;
    assert!(!app.is_logged_in());
}

#[tokio::test]
async fn test_submit_round_trip_and_cooldown() {
    let (mut app, listener) = setup().await;
    let mut events = app.login(&LoginForm::new("alice", "password123")).await.unwrap();
    let mut ws = accept(&listener).await;
    assert_eq!(next_event(&mut events).await, SessionEvent::Connected);

    app.submit("hello room").unwrap();
    assert!(matches!(app.submit("again"), Err(ChatError::Cooldown(_))));

    let frame = timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();
    let sent: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
    assert_eq!(sent["message"], "hello room");

    // Server echoes it back as a broadcast
    let echo = json!({"message": "hello room", "sender": "u-42", "username": "alice", "timestamp": 1_714_564_800_000i64});
    ws.send(Message::Text(echo.to_string())).await.unwrap();

    let event = next_event(&mut events).await;
    let entry = app.apply(&event).expect("message adds a feed line");
    assert!(entry.is_own());
    assert_eq!(entry.text, "hello room");

    app.logout().await;
}

#[tokio::test]
async fn test_ban_blocks_submit() {
    let (mut app, listener) = setup().await;
    let mut events = app.login(&LoginForm::new("alice", "password123")).await.unwrap();
    let mut ws = accept(&listener).await;
    assert_eq!(next_event(&mut events).await, SessionEvent::Connected);

    ws.send(Message::Text(json!({"type": "chat_banned", "time_left": 30}).to_string()))
        .await
        .unwrap();
    let event = next_event(&mut events).await;
    assert!(matches!(event, SessionEvent::ChatBanned { .. }));
    app.apply(&event);

    assert!(app.ban_remaining() > 0);
    assert!(matches!(app.submit("let me talk"), Err(ChatError::ChatBanned(_))));

    let too_long = "x".repeat(31);
    assert!(matches!(app.submit(&too_long), Err(ChatError::InvalidMessage(_))));

    app.logout().await;
}

#[tokio::test]
async fn test_session_expired_flag() {
    let (mut app, listener) = setup().await;
    let mut events = app.login(&LoginForm::new("alice", "password123")).await.unwrap();
    let mut ws = accept(&listener).await;
    assert_eq!(next_event(&mut events).await, SessionEvent::Connected);

    ws.send(Message::Text(json!({"type": "session_expired"}).to_string()))
        .await
        .unwrap();
    let event = next_event(&mut events).await;
    assert_eq!(event, SessionEvent::SessionExpired);
    app.apply(&event);

    assert!(app.session_expired());
    assert!(matches!(app.submit("hi"), Err(ChatError::SessionExpired)));

    app.dismiss_session_expired();
    assert!(!app.session_expired());

    app.logout().await;
}
