//! HTTP API Client Integration Tests
//!
//! Exercises login, registration, duplicate checks and history against an
//! in-process axum mock of the chat backend.

use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chatline::{ApiClient, ChatError, Config, DuplicateField, Field, LoginForm, RegisterForm};
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio_test::{assert_err, assert_ok};

const GOOD_PASSWORD: &str = "correct-horse";

async fn login(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["password"] == GOOD_PASSWORD {
        (
            StatusCode::OK,
            Json(json!({"message": "Login successful", "user_id": "u-42", "username": body["username"]})),
        )
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "Invalid username or password"})),
        )
    }
}

async fn register(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["username"] == "taken" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "Username or email already exists"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "message": "Registration and login successful",
            "user_id": "u-new",
            "username": body["username"],
        })),
    )
}

async fn check_duplicate(Json(body): Json<Value>) -> Json<Value> {
    let taken = body["field"] == "username" && body["value"] == "alice";
    Json(json!({ "is_duplicate": taken }))
}

async fn recent_messages(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let limit: usize = params.get("limit").and_then(|l| l.parse().ok()).unwrap_or(50);
    let messages: Vec<Value> = (0..3)
        .rev()
        .take(limit)
        .map(|i| {
            json!({
                "id": format!("m{}", i),
                "content": format!("message {}", i),
                "created_at": format!("2024-05-01T12:0{}:00+00:00", i),
                "sender": "bob",
            })
        })
        .collect();
    Json(json!({ "messages": messages }))
}

async fn spawn_api() -> String {
    let app = Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/check_duplicate", post(check_duplicate))
        .route("/recent_messages", get(recent_messages));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client_for(base: &str) -> ApiClient {
    ApiClient::new(Config::default().with_api_url(base)).unwrap()
}

#[tokio::test]
async fn test_login_success() {
    let api = client_for(&spawn_api().await);
    let user = assert_ok!(api.login(&LoginForm::new("alice", GOOD_PASSWORD)).await);
    assert_eq!(user.user_id, "u-42");
    assert_eq!(user.username, "alice");
}

#[tokio::test]
async fn test_login_rejected_by_server() {
    let api = client_for(&spawn_api().await);
    match api.login(&LoginForm::new("alice", "wrong-password")).await {
        Err(ChatError::Rejected(detail)) => assert_eq!(detail, "Invalid username or password"),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_form_never_hits_server() {
    // Nothing listens here; a request would fail with an HTTP error instead
    let api = client_for("http://127.0.0.1:9");
    match api.login(&LoginForm::new("al", "short")).await {
        Err(ChatError::Validation(errors)) => {
            assert!(errors.get(Field::Username).is_some());
            assert!(errors.get(Field::Password).is_some());
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_register() {
    let api = client_for(&spawn_api().await);
    let mut form = RegisterForm {
        email: "carol@example.com".to_string(),
        username: "carol".to_string(),
        nickname: "Caz".to_string(),
        password: "longpassword".to_string(),
        confirm_password: "longpassword".to_string(),
    };

    let user = assert_ok!(api.register(&form).await);
    assert_eq!(user.user_id, "u-new");

    form.username = "taken".to_string();
    let err = assert_err!(api.register(&form).await);
    assert!(matches!(err, ChatError::Rejected(ref d) if d.contains("already exists")));
}

#[tokio::test]
async fn test_check_duplicate() {
    let api = client_for(&spawn_api().await);
    assert!(api.check_duplicate(DuplicateField::Username, "alice").await.unwrap());
    assert!(!api.check_duplicate(DuplicateField::Username, "zed").await.unwrap());
    assert!(!api.check_duplicate(DuplicateField::Email, "alice").await.unwrap());
}

#[tokio::test]
async fn test_recent_messages() {
    let api = client_for(&spawn_api().await);

    let all = api.recent_messages(50).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].id, "m2");

    let two = api.recent_messages(2).await.unwrap();
    assert_eq!(two.len(), 2);
}
