//! Authentication
//!
//! Login/registration form validation and the HTTP API client used for
//! login, registration, duplicate checks and message history.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::protocol::{
    AuthResponse, DuplicateCheckRequest, DuplicateCheckResponse, ErrorBody, HistoryMessage,
    HistoryResponse,
};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+@\S+\.\S+").expect("valid email regex"));

const MIN_USERNAME_CHARS: usize = 4;
const MIN_PASSWORD_CHARS: usize = 8;
const MIN_NICKNAME_CHARS: usize = 2;

/// Form field identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Email,
    Username,
    Nickname,
    Password,
    ConfirmPassword,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Username => "username",
            Self::Nickname => "nickname",
            Self::Password => "password",
            Self::ConfirmPassword => "confirm_password",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-field validation failures
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<Field, String>);

impl FieldErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.0.iter().map(|(f, m)| (*f, m.as_str()))
    }

    fn insert(&mut self, field: Field, message: &str) {
        self.0.insert(field, message.to_string());
    }

    fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ChatError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(field, msg)| format!("{}: {}", field, msg)).collect();
        f.write_str(&parts.join("; "))
    }
}

fn check_credentials(errors: &mut FieldErrors, username: &str, password: &str) {
    if username.chars().count() < MIN_USERNAME_CHARS {
        errors.insert(Field::Username, "username must be at least 4 characters");
    }
    if password.chars().count() < MIN_PASSWORD_CHARS {
        errors.insert(Field::Password, "password must be at least 8 characters");
    }
}

/// Login form
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

impl LoginForm {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = FieldErrors::default();
        check_credentials(&mut errors, &self.username, &self.password);
        errors.into_result()
    }
}

/// Registration form
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegisterForm {
    pub email: String,
    pub username: String,
    pub nickname: String,
    pub password: String,
    #[serde(skip)]
    pub confirm_password: String,
}

impl RegisterForm {
    pub fn validate(&self) -> Result<()> {
        let mut errors = FieldErrors::default();

        if !EMAIL_RE.is_match(&self.email) {
            errors.insert(Field::Email, "enter a valid email address");
        }
        if self.nickname.chars().count() < MIN_NICKNAME_CHARS {
            errors.insert(Field::Nickname, "nickname must be at least 2 characters");
        }
        if self.password != self.confirm_password {
            errors.insert(Field::ConfirmPassword, "passwords do not match");
        }
        check_credentials(&mut errors, &self.username, &self.password);

        errors.into_result()
    }
}

/// Fields the server can check for uniqueness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateField {
    Username,
    Email,
    Nickname,
}

impl DuplicateField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Username => "username",
            Self::Email => "email",
            Self::Nickname => "nickname",
        }
    }
}

impl std::str::FromStr for DuplicateField {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "username" => Ok(Self::Username),
            "email" => Ok(Self::Email),
            "nickname" => Ok(Self::Nickname),
            other => Err(ChatError::InvalidMessage(format!("unknown field '{}'", other))),
        }
    }
}

/// Authenticated user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub user_id: String,
    pub username: String,
}

impl From<AuthResponse> for User {
    fn from(resp: AuthResponse) -> Self {
        Self {
            user_id: resp.user_id,
            username: resp.username,
        }
    }
}

/// HTTP API client
#[derive(Clone)]
pub struct ApiClient {
    config: Config,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(config: Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { config, client })
    }

    /// Log in; the form is validated before any request is made
    pub async fn login(&self, form: &LoginForm) -> Result<User> {
        form.validate()?;

        let resp = self.client.post(self.config.login_url()).json(form).send().await?;
        let auth: AuthResponse = Self::decode(resp).await?;

        info!("Logged in as {} ({})", auth.username, auth.user_id);
        Ok(auth.into())
    }

    /// Register; the server logs the new account in and returns it
    pub async fn register(&self, form: &RegisterForm) -> Result<User> {
        form.validate()?;

        let resp = self.client.post(self.config.register_url()).json(form).send().await?;
        let auth: AuthResponse = Self::decode(resp).await?;

        info!("Registered and logged in as {} ({})", auth.username, auth.user_id);
        Ok(auth.into())
    }

    /// Ask the server whether a value is already taken
    pub async fn check_duplicate(&self, field: DuplicateField, value: &str) -> Result<bool> {
        let body = DuplicateCheckRequest {
            field: field.as_str(),
            value,
        };
        let resp = self
            .client
            .post(self.config.check_duplicate_url())
            .json(&body)
            .send()
            .await?;
        let parsed: DuplicateCheckResponse = Self::decode(resp).await?;

        debug!("Duplicate check {}={}: {}", field.as_str(), value, parsed.is_duplicate);
        Ok(parsed.is_duplicate)
    }

    /// Most recent stored messages, newest first
    pub async fn recent_messages(&self, limit: u32) -> Result<Vec<HistoryMessage>> {
        let resp = self
            .client
            .get(self.config.recent_messages_url())
            .query(&[("limit", limit)])
            .send()
            .await?;
        let parsed: HistoryResponse = Self::decode(resp).await?;
        Ok(parsed.messages)
    }

    async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if status.is_client_error() {
            let text = resp.text().await?;
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|b| b.message())
                .unwrap_or_else(|_| format!("HTTP {}", status));
            warn!("Request rejected ({}): {}", status, message);
            return Err(ChatError::Rejected(message));
        }

        let resp = resp.error_for_status()?;
        Ok(resp.json::<T>().await?)
    }
}
